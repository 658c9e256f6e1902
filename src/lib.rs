//! # partar - Parallel Extraction of Sequential Archives
//!
//! partar extracts uncompressed tar archives with a pool of worker threads.
//! The archive is read once, front to back, by a single producer. Every
//! regular file becomes a job carrying its payload offset; workers copy the
//! payload straight out of the archive with positioned reads (or
//! `copy_file_range` on Linux), so they never share a file cursor.
//!
//! ## Features
//!
//! - **Single sequential pass**: headers are decoded once, payloads are skipped by seeking
//! - **Parallel payload copy**: in-kernel transfer where available, positioned reads elsewhere
//! - **Bounded queue**: the reader never runs more than a queue's worth ahead of the workers
//! - **Fail fast**: the first error stops the run and removes the partial file
//! - **Update mode**: files whose size and mode already match are left alone
//!
//! ## Quick Start
//!
//! ```no_run
//! use partar::core::extract;
//! use std::path::Path;
//!
//! let summary = extract(Path::new("backup.tar"), Path::new("/restore")).unwrap();
//! println!("Extracted {} files ({} bytes)", summary.files_extracted, summary.bytes_copied);
//! ```
//!
//! ## Advanced Usage
//!
//! ```no_run
//! use partar::config::ExtractConfig;
//! use partar::core::Extractor;
//! use partar::progress::ProgressReporter;
//!
//! let config = ExtractConfig {
//!     workers: 16,
//!     update: true,
//!     ..ExtractConfig::new("backup.tar", "/restore")
//! };
//!
//! let summary = Extractor::new(config)
//!     .with_progress(ProgressReporter::new())
//!     .execute()
//!     .unwrap();
//! summary.print_summary();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod archive;
pub mod config;
pub mod core;
pub mod error;
pub mod fs;
pub mod progress;

// Re-export commonly used types
pub use config::ExtractConfig;
pub use core::{extract, ExtractSummary, Extractor};
pub use error::{ExtractError, Result};
pub use progress::ProgressReporter;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use partar::prelude::*;
    //! ```

    pub use crate::archive::{ArchiveEntry, EntryKind, TarArchive};
    pub use crate::config::{ExtractConfig, OutputFormat};
    pub use crate::core::{extract, ExtractSummary, Extractor};
    pub use crate::error::{ExtractError, Result};
    pub use crate::fs::{default_primitive, CopyPrimitive};
    pub use crate::progress::ProgressReporter;
}
