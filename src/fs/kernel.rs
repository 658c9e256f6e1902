//! Linux in-kernel transfer
//!
//! `copy_file_range` with an explicit source offset moves archive bytes into
//! the destination without a user-space buffer, and `fallocate` with
//! `FALLOC_FL_KEEP_SIZE` reserves extents without changing the logical size.

use super::copy::{is_transient, CopyPrimitive, PartialCopy};
use super::positioned::{OffsetReader, PositionedCopy};
use nix::fcntl::{fallocate, FallocateFlags};
use std::fs::File;
use std::io;
use std::os::unix::io::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};

/// Largest single request; matches the kernel's own per-call cap
const MAX_CHUNK: u64 = 0x7fff_f000;

/// Zero-copy transfer via `copy_file_range`
#[derive(Debug, Default)]
pub struct KernelCopy {
    fallback: PositionedCopy,
    fallback_reported: AtomicBool,
}

impl KernelCopy {
    /// Create a kernel copier with the default fallback buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with a specific buffer size for the user-space continuation
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            fallback: PositionedCopy::with_buffer_size(buffer_size),
            fallback_reported: AtomicBool::new(false),
        }
    }

    fn report_fallback(&self, err: &io::Error) {
        if !self.fallback_reported.swap(true, Ordering::Relaxed) {
            tracing::warn!("copy_file_range unavailable ({}), using positioned reads", err);
        } else {
            tracing::trace!("copy_file_range unavailable ({}), using positioned reads", err);
        }
    }

    /// Copy the rest of `offset..offset + len` with positioned reads once
    /// `copied` bytes have already gone through the kernel. Counts returned,
    /// including in errors, cover the whole range.
    fn finish_positioned(
        &self,
        dst: &File,
        src: &File,
        offset: u64,
        len: u64,
        copied: u64,
    ) -> Result<u64, PartialCopy> {
        let mut reader = OffsetReader::new(src, offset + copied, len - copied);
        self.fallback
            .drain(dst, &mut reader)
            .map(|rest| copied + rest)
            .map_err(|e| PartialCopy::new(copied + e.copied, e.source))
    }
}

/// Errors meaning the kernel cannot do this transfer, as opposed to a failed one
fn is_unsupported(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(libc::ENOSYS | libc::EXDEV | libc::EOPNOTSUPP | libc::EINVAL | libc::EPERM)
    )
}

fn to_off_t(value: u64) -> io::Result<libc::off_t> {
    libc::off_t::try_from(value).map_err(|_| io::Error::from_raw_os_error(libc::EFBIG))
}

impl CopyPrimitive for KernelCopy {
    fn name(&self) -> &'static str {
        "copy_file_range"
    }

    fn expand(&self, file: &File, len: u64) -> io::Result<()> {
        if len == 0 {
            return Ok(());
        }
        fallocate(
            file.as_raw_fd(),
            FallocateFlags::FALLOC_FL_KEEP_SIZE,
            0,
            to_off_t(len)?,
        )
        .map_err(io::Error::from)
    }

    fn bulk_copy(&self, dst: &File, src: &File, offset: u64, len: u64) -> Result<u64, PartialCopy> {
        let mut off_in = libc::loff_t::try_from(offset)
            .map_err(|_| PartialCopy::new(0, io::Error::from_raw_os_error(libc::EFBIG)))?;
        let src_fd = src.as_raw_fd();
        let dst_fd = dst.as_raw_fd();
        let mut copied: u64 = 0;

        while copied < len {
            let request = (len - copied).min(MAX_CHUNK) as usize;

            // Null output offset: the destination's own cursor advances.
            let n = unsafe {
                libc::copy_file_range(
                    src_fd,
                    &mut off_in,
                    dst_fd,
                    std::ptr::null_mut(),
                    request,
                    0,
                )
            };

            if n < 0 {
                let err = io::Error::last_os_error();
                if is_transient(&err) {
                    continue;
                }
                if is_unsupported(&err) {
                    self.report_fallback(&err);
                    return self.finish_positioned(dst, src, offset, len, copied);
                }
                return Err(PartialCopy::new(copied, err));
            }

            if n == 0 {
                break; // source ended early
            }

            copied += n as u64;
        }

        Ok(copied)
    }
}
