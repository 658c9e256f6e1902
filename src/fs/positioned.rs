//! Portable positioned-read copy
//!
//! Works on any Unix filesystem. Used directly where no in-kernel transfer is
//! available, and as the continuation path when the kernel declines one.

use super::copy::{is_transient, CopyPrimitive, PartialCopy, DEFAULT_BUFFER_SIZE};
use std::fs::File;
use std::io::{self, Write};
use std::os::unix::fs::FileExt;

/// A source that can be read at an explicit offset without a shared cursor
pub trait PositionedRead {
    /// Read into `buf` starting at `offset`; may return fewer bytes than asked
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;
}

impl PositionedRead for File {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        FileExt::read_at(self, buf, offset)
    }
}

/// Reader over a shared source that keeps its own cursor.
///
/// The cursor only advances on successful reads, so a caller retrying after a
/// transient failure resumes at the right byte.
pub struct OffsetReader<'a, R: PositionedRead + ?Sized = File> {
    file: &'a R,
    pos: u64,
    end: u64,
}

impl<'a, R: PositionedRead + ?Sized> OffsetReader<'a, R> {
    /// Read `len` bytes of `file` starting at `offset`
    pub fn new(file: &'a R, offset: u64, len: u64) -> Self {
        Self {
            file,
            pos: offset,
            end: offset.saturating_add(len),
        }
    }

    /// Current absolute position in the source
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Bytes left before the end of the range
    pub fn remaining(&self) -> u64 {
        self.end - self.pos
    }
}

impl<R: PositionedRead + ?Sized> io::Read for OffsetReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let want = (self.remaining()).min(buf.len() as u64) as usize;
        if want == 0 {
            return Ok(0);
        }
        let n = self.file.read_at(&mut buf[..want], self.pos)?;
        self.pos += n as u64;
        Ok(n)
    }
}

/// User-space copy loop over positioned reads
#[derive(Debug, Clone)]
pub struct PositionedCopy {
    buffer_size: usize,
}

impl PositionedCopy {
    /// Create with the default buffer size
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    /// Create with a custom buffer size
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            buffer_size: buffer_size.max(4096),
        }
    }

    /// Copy from `reader` into `dst` until the range is exhausted or the source ends
    pub(crate) fn drain<R: PositionedRead + ?Sized>(
        &self,
        dst: &File,
        reader: &mut OffsetReader<'_, R>,
    ) -> Result<u64, PartialCopy> {
        let mut writer = dst;
        let chunk = (self.buffer_size as u64).min(reader.remaining()) as usize;
        let mut buffer = vec![0u8; chunk];
        let mut copied = 0u64;

        while reader.remaining() > 0 {
            let n = match io::Read::read(reader, &mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if is_transient(&e) => continue,
                Err(e) => return Err(PartialCopy::new(copied, e)),
            };

            writer
                .write_all(&buffer[..n])
                .map_err(|e| PartialCopy::new(copied, e))?;
            copied += n as u64;
        }

        Ok(copied)
    }
}

impl Default for PositionedCopy {
    fn default() -> Self {
        Self::new()
    }
}

impl CopyPrimitive for PositionedCopy {
    fn name(&self) -> &'static str {
        "positioned"
    }

    fn expand(&self, file: &File, len: u64) -> io::Result<()> {
        if len == 0 {
            return Ok(());
        }
        file.set_len(len)?;
        // Force the last block to be allocated; the copy overwrites it.
        file.write_all_at(&[0u8], len - 1)
    }

    fn bulk_copy(&self, dst: &File, src: &File, offset: u64, len: u64) -> Result<u64, PartialCopy> {
        let mut reader = OffsetReader::new(src, offset, len);
        self.drain(dst, &mut reader)
    }
}
