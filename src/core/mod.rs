//! Extraction pipeline
//!
//! A single producer reads the archive in order and feeds a bounded queue;
//! a pool of workers drains it, copying each file's payload straight out of
//! the archive. A completion tracker records outstanding jobs and the first
//! failure.

mod extractor;
mod producer;
mod queue;
mod tracker;
mod worker;

pub use extractor::*;
pub use producer::*;
pub use queue::*;
pub use tracker::*;
pub use worker::*;
