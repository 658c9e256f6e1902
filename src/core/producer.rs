//! Sequential producer
//!
//! Walks the entry stream in archive order on the calling thread. Directories
//! are created inline, before the next entry is read, so any job for a path
//! beneath them is dispatched only after they exist. Regular files become jobs.

use crate::archive::{ArchiveEntry, EntryKind, EntrySource, MODE_MASK};
use crate::core::{CompletionTracker, ExtractStats, JobSender};
use crate::error::{ExtractError, Result};
use crate::fs::resolve_entry_path;
use std::fs::DirBuilder;
use std::io;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

/// Owner bits a directory needs while files are still being written into it
const OWNER_RWX: u32 = 0o700;

/// A directory whose final mode is applied after extraction completes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredMode {
    /// Directory on disk
    pub path: PathBuf,
    /// Mode from the archive
    pub mode: u32,
}

/// What the producer did, beyond what the shared counters record
#[derive(Debug, Default)]
pub struct ProduceReport {
    /// Jobs handed to the queue
    pub jobs_enqueued: u64,
    /// Directories created with temporary owner access
    pub deferred_modes: Vec<DeferredMode>,
}

/// Single-threaded reader of the entry stream
pub struct Producer<'a> {
    root: &'a Path,
    update: bool,
    list_entries: bool,
    tracker: &'a CompletionTracker,
    stats: &'a ExtractStats,
}

impl<'a> Producer<'a> {
    /// Create a producer extracting under `root`
    pub fn new(root: &'a Path, tracker: &'a CompletionTracker, stats: &'a ExtractStats) -> Self {
        Self {
            root,
            update: false,
            list_entries: false,
            tracker,
            stats,
        }
    }

    /// Tolerate directories that already exist
    pub fn update(mut self, update: bool) -> Self {
        self.update = update;
        self
    }

    /// Print each processed directory and skipped entry on stdout
    pub fn list_entries(mut self, list_entries: bool) -> Self {
        self.list_entries = list_entries;
        self
    }

    /// Consume the stream until it ends, fails, or a worker fails.
    ///
    /// The queue is closed when this returns, on every path, before the caller
    /// gets to see an error.
    pub fn run<S: EntrySource>(&self, source: S, mut queue: JobSender) -> Result<ProduceReport> {
        let mut report = ProduceReport::default();

        for item in source {
            if self.tracker.is_failed() {
                tracing::debug!("stopping producer after a worker failure");
                break;
            }

            let entry = item?;
            match entry.kind {
                EntryKind::Directory => self.create_directory(&entry, &mut report)?,
                EntryKind::Regular => {
                    let destination = resolve_entry_path(self.root, &entry.path)?;
                    self.tracker.add();
                    match queue.push(entry, destination) {
                        Ok(id) => {
                            report.jobs_enqueued += 1;
                            tracing::trace!("enqueued job {}", id);
                        }
                        Err(closed) => {
                            // Every worker is gone; one of them recorded why.
                            self.tracker.done();
                            tracing::debug!("{}: {}", closed, closed.0.entry.path.display());
                            break;
                        }
                    }
                }
                EntryKind::Other(ref kind) => {
                    self.stats.record_ignored();
                    tracing::debug!("skipping {} entry {}", kind, entry.path.display());
                    if self.list_entries {
                        println!("skipping {} {}", kind, entry.path.display());
                    }
                }
            }
        }

        queue.close();
        Ok(report)
    }

    fn create_directory(&self, entry: &ArchiveEntry, report: &mut ProduceReport) -> Result<()> {
        let path = resolve_entry_path(self.root, &entry.path)?;
        if path == self.root {
            return Ok(());
        }

        let mode = entry.mode & MODE_MASK;
        let needs_fixup = mode & OWNER_RWX != OWNER_RWX;

        match DirBuilder::new().mode(mode | OWNER_RWX).create(&path) {
            Ok(()) => {
                self.stats.record_directory();
                if needs_fixup {
                    report.deferred_modes.push(DeferredMode {
                        path: path.clone(),
                        mode,
                    });
                }
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && self.update && is_real_dir(&path) => {
                tracing::trace!("directory {} already exists", path.display());
            }
            Err(source) => return Err(ExtractError::DirectoryCreate { path, source }),
        }

        tracing::debug!("created directory {}", path.display());
        if self.list_entries {
            println!("{}", entry.path.display());
        }
        Ok(())
    }
}

/// A directory itself, not a file or a symlink to one
fn is_real_dir(path: &Path) -> bool {
    std::fs::symlink_metadata(path)
        .map(|meta| meta.is_dir())
        .unwrap_or(false)
}

/// Apply deferred directory modes, deepest paths first
pub fn apply_deferred_modes(deferred: &[DeferredMode]) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    for dir in deferred.iter().rev() {
        std::fs::set_permissions(&dir.path, std::fs::Permissions::from_mode(dir.mode)).map_err(
            |source| ExtractError::Permissions {
                path: dir.path.clone(),
                mode: dir.mode,
                source,
            },
        )?;
    }
    Ok(())
}
