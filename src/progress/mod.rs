//! Progress reporting
//!
//! An indicatif status line and byte bar, updated by the workers as files
//! finish.

mod reporter;

pub use reporter::*;
