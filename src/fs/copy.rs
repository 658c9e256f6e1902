//! Bulk transfer and pre-allocation capability
//!
//! One implementation per target OS, picked at build time by
//! [`default_primitive`]. All reads from the archive are positioned reads, so
//! any number of workers may share one archive without coordinating cursors.

use std::fs::File;
use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Default user-space copy buffer (1MB)
pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

/// A bulk copy that stopped on a non-retryable error
#[derive(Error, Debug)]
#[error("transfer failed after {copied} bytes: {source}")]
pub struct PartialCopy {
    /// Bytes transferred before the failure
    pub copied: u64,
    /// Underlying error
    #[source]
    pub source: io::Error,
}

impl PartialCopy {
    /// Wrap an error with the progress made so far
    pub fn new(copied: u64, source: io::Error) -> Self {
        Self { copied, source }
    }
}

/// OS-specific bulk copy and space reservation
pub trait CopyPrimitive: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Ask the filesystem to reserve `len` bytes for `file`.
    ///
    /// Best effort: callers log and ignore the error.
    fn expand(&self, file: &File, len: u64) -> io::Result<()>;

    /// Copy exactly `len` bytes from `src` at `offset` into `dst` at its
    /// current write position.
    ///
    /// Returns the number of bytes transferred, which is less than `len` only
    /// when `src` ended early. `src`'s own cursor is never touched.
    fn bulk_copy(&self, dst: &File, src: &File, offset: u64, len: u64) -> Result<u64, PartialCopy>;
}

/// Primitive selected for the build target
pub fn default_primitive() -> Arc<dyn CopyPrimitive> {
    platform_primitive(DEFAULT_BUFFER_SIZE)
}

/// Primitive selected for the build target, with a custom fallback buffer
#[cfg(target_os = "linux")]
pub fn platform_primitive(buffer_size: usize) -> Arc<dyn CopyPrimitive> {
    Arc::new(super::KernelCopy::with_buffer_size(buffer_size))
}

/// Primitive selected for the build target, with a custom copy buffer
#[cfg(not(target_os = "linux"))]
pub fn platform_primitive(buffer_size: usize) -> Arc<dyn CopyPrimitive> {
    Arc::new(super::PositionedCopy::with_buffer_size(buffer_size))
}

/// Whether an error is a transient condition worth retrying in place
pub(crate) fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Seek, SeekFrom, Write};
    use tempfile::TempDir;

    #[test]
    fn test_default_primitive_copies_slice() {
        let dir = TempDir::new().unwrap();
        let src_path = dir.path().join("src.bin");
        let data: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&src_path, &data).unwrap();

        let src = File::open(&src_path).unwrap();
        let mut dst = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(dir.path().join("dst.bin"))
            .unwrap();

        let primitive = default_primitive();
        let _ = primitive.expand(&dst, 1000);
        let copied = primitive.bulk_copy(&dst, &src, 100, 1000).unwrap();
        assert_eq!(copied, 1000);

        dst.flush().unwrap();
        dst.seek(SeekFrom::Start(0)).unwrap();
        let mut out = Vec::new();
        dst.read_to_end(&mut out).unwrap();
        assert_eq!(out, &data[100..1100]);
    }

    #[test]
    fn test_transient_kinds() {
        assert!(is_transient(&io::Error::from(io::ErrorKind::Interrupted)));
        assert!(is_transient(&io::Error::from(io::ErrorKind::WouldBlock)));
        assert!(!is_transient(&io::Error::from(io::ErrorKind::PermissionDenied)));
    }

    #[test]
    fn test_partial_copy_message() {
        let err = PartialCopy::new(7, io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(err.to_string().contains("after 7 bytes"));
    }
}
