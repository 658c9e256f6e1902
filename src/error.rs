//! Error types for partar
//!
//! Every fatal condition in the extraction pipeline maps to one variant here.
//! The first fatal error observed anywhere wins and ends the run; there is no
//! aggregated multi-error report.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for extraction operations
#[derive(Error, Debug)]
pub enum ExtractError {
    /// The archive itself could not be opened
    #[error("Cannot open archive '{path}': {source}")]
    ArchiveOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed or truncated entry stream
    #[error("Corrupt archive stream{}: {source}", entry_suffix(.entry))]
    StreamDecode {
        entry: Option<PathBuf>,
        #[source]
        source: std::io::Error,
    },

    /// Entry path escapes the destination root
    #[error("Refusing unsafe entry path '{0}'")]
    UnsafePath(PathBuf),

    /// Directory entry could not be created
    #[error("Failed to create directory '{path}': {source}")]
    DirectoryCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Destination file could not be opened for writing
    #[error("Failed to open '{path}' for writing: {source}")]
    DestinationOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Space reservation failed. Never fatal; only used for diagnostics.
    #[error("Pre-allocation of {length} bytes for '{path}' failed: {source}")]
    Preallocation {
        path: PathBuf,
        length: u64,
        #[source]
        source: std::io::Error,
    },

    /// Bulk copy failed part way through
    #[error("Failed to extract '{path}' after {copied} bytes: {source}")]
    Copy {
        path: PathBuf,
        copied: u64,
        #[source]
        source: std::io::Error,
    },

    /// Bulk copy ended before the declared size was reached
    #[error("Short transfer for '{path}': expected {expected} bytes, copied {actual}")]
    ShortTransfer {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    /// Entry payload lies outside the archive
    #[error("Payload of '{path}' at offset {offset} (+{size} bytes) is beyond the end of the archive ({archive_len} bytes)")]
    Position {
        path: PathBuf,
        offset: u64,
        size: u64,
        archive_len: u64,
    },

    /// Entry mode could not be applied to the extracted file
    #[error("Failed to set mode {mode:o} on '{path}': {source}")]
    Permissions {
        path: PathBuf,
        mode: u32,
        #[source]
        source: std::io::Error,
    },

    /// A worker thread panicked
    #[error("Extraction worker {0} panicked")]
    WorkerPanicked(usize),

    /// A worker thread could not be started
    #[error("Failed to spawn extraction worker: {0}")]
    ThreadSpawn(#[source] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error during filesystem operations
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn entry_suffix(entry: &Option<PathBuf>) -> String {
    match entry {
        Some(path) => format!(" at '{}'", path.display()),
        None => String::new(),
    }
}

impl ExtractError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a stream decode error, optionally naming the entry being decoded
    pub fn decode(entry: Option<PathBuf>, source: std::io::Error) -> Self {
        Self::StreamDecode { entry, source }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether this error ends the run. Only pre-allocation failures are tolerated.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Preallocation { .. })
    }

    /// Get the entry or file path associated with this error, if any
    pub fn entry_path(&self) -> Option<&PathBuf> {
        match self {
            Self::ArchiveOpen { path, .. }
            | Self::UnsafePath(path)
            | Self::DirectoryCreate { path, .. }
            | Self::DestinationOpen { path, .. }
            | Self::Preallocation { path, .. }
            | Self::Copy { path, .. }
            | Self::ShortTransfer { path, .. }
            | Self::Position { path, .. }
            | Self::Permissions { path, .. }
            | Self::Io { path, .. } => Some(path),
            Self::StreamDecode { entry, .. } => entry.as_ref(),
            _ => None,
        }
    }
}

/// Result type alias for extraction operations
pub type Result<T> = std::result::Result<T, ExtractError>;

/// Extension trait for adding path context to std::io::Result
pub trait IoResultExt<T> {
    /// Add path context to an I/O error
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| ExtractError::io(path, e))
    }
}
