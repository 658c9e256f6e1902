//! Archive entry model and decoder adapter
//!
//! The header decoder is an external collaborator: it hands the pipeline a
//! sequential stream of entries, each carrying the byte offset of its payload.

mod entry;
mod reader;

pub use entry::*;
pub use reader::*;
