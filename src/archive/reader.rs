//! Sequential entry stream over a tar archive
//!
//! Wraps the `tar` crate's header decoder. Payload bytes are never read here:
//! the stream seeks past them and only reports where they live, so workers can
//! fetch them later through their own positioned reads.

use super::{ArchiveEntry, EntryKind};
use crate::error::{ExtractError, Result};
use std::fs::File;
use std::path::{Path, PathBuf};

/// A sequential source of decoded entries.
///
/// Any iterator of decoded entries qualifies; the producer never needs more.
pub trait EntrySource: Iterator<Item = Result<ArchiveEntry>> {}

impl<T> EntrySource for T where T: Iterator<Item = Result<ArchiveEntry>> {}

/// An opened tar archive, read front to back
pub struct TarArchive {
    path: PathBuf,
    archive: tar::Archive<File>,
    size: u64,
}

impl TarArchive {
    /// Open the archive for sequential header decoding
    pub fn open(path: &Path) -> Result<Self> {
        let open_err = |source| ExtractError::ArchiveOpen {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(open_err)?;
        let size = file.metadata().map_err(open_err)?.len();

        Ok(Self {
            path: path.to_path_buf(),
            archive: tar::Archive::new(file),
            size,
        })
    }

    /// Path the archive was opened from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Total archive size in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Start the entry stream
    pub fn entries(&mut self) -> Result<TarEntries<'_>> {
        let entries = self
            .archive
            .entries_with_seek()
            .map_err(|e| ExtractError::decode(None, e))?;
        Ok(TarEntries { entries })
    }
}

/// Iterator adapter turning tar headers into [`ArchiveEntry`] values
pub struct TarEntries<'a> {
    entries: tar::Entries<'a, File>,
}

impl Iterator for TarEntries<'_> {
    type Item = Result<ArchiveEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = match self.entries.next()? {
            Ok(entry) => entry,
            Err(e) => return Some(Err(ExtractError::decode(None, e))),
        };
        Some(decode_entry(&entry))
    }
}

fn decode_entry(entry: &tar::Entry<'_, File>) -> Result<ArchiveEntry> {
    let path = entry
        .path()
        .map_err(|e| ExtractError::decode(None, e))?
        .into_owned();

    let header = entry.header();
    let mode = header
        .mode()
        .map_err(|e| ExtractError::decode(Some(path.clone()), e))?;
    let mtime = header
        .mtime()
        .map_err(|e| ExtractError::decode(Some(path.clone()), e))?;

    Ok(ArchiveEntry {
        size: entry.size(),
        mode,
        mtime,
        kind: classify(header.entry_type()),
        data_offset: entry.raw_file_position(),
        path,
    })
}

fn classify(kind: tar::EntryType) -> EntryKind {
    if kind.is_dir() {
        EntryKind::Directory
    } else if kind.is_file() || kind.is_contiguous() {
        EntryKind::Regular
    } else {
        let name = if kind.is_symlink() {
            "symlink"
        } else if kind.is_hard_link() {
            "hard link"
        } else if kind.is_character_special() {
            "character device"
        } else if kind.is_block_special() {
            "block device"
        } else if kind.is_fifo() {
            "fifo"
        } else if kind.is_gnu_sparse() {
            "sparse file"
        } else if kind.is_pax_global_extensions() {
            "pax global header"
        } else {
            "unknown"
        };
        EntryKind::Other(name.to_string())
    }
}
