//! Decoded archive entries

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Permission bits retained from an entry's mode
pub const MODE_MASK: u32 = 0o7777;

/// Classification of an archive entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    /// Directory, created inline by the producer
    Directory,
    /// Regular file, extracted by a worker
    Regular,
    /// Anything else (links, devices, fifos, ...); skipped
    Other(String),
}

impl EntryKind {
    /// Short human-readable name used in listings
    pub fn name(&self) -> &str {
        match self {
            Self::Directory => "directory",
            Self::Regular => "file",
            Self::Other(kind) => kind,
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One header from the entry stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    /// Path as recorded in the archive
    pub path: PathBuf,
    /// Declared payload size in bytes
    pub size: u64,
    /// Mode bits from the header
    pub mode: u32,
    /// Modification time, seconds since the epoch
    pub mtime: u64,
    /// Entry classification
    pub kind: EntryKind,
    /// Offset of the payload in the archive, captured as the header was consumed
    pub data_offset: u64,
}

impl ArchiveEntry {
    /// Build a regular-file entry
    pub fn file(path: impl Into<PathBuf>, size: u64, mode: u32, data_offset: u64) -> Self {
        Self {
            path: path.into(),
            size,
            mode,
            mtime: 0,
            kind: EntryKind::Regular,
            data_offset,
        }
    }

    /// Build a directory entry
    pub fn directory(path: impl Into<PathBuf>, mode: u32, data_offset: u64) -> Self {
        Self {
            path: path.into(),
            size: 0,
            mode,
            mtime: 0,
            kind: EntryKind::Directory,
            data_offset,
        }
    }

    /// Permission bits only
    pub fn permissions(&self) -> u32 {
        self.mode & MODE_MASK
    }

    /// Exclusive end of the payload byte range
    pub fn data_end(&self) -> Option<u64> {
        self.data_offset.checked_add(self.size)
    }
}
