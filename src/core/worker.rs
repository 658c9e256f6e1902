//! Extraction workers
//!
//! Each worker owns a private read handle on the archive and pulls jobs until
//! the queue is closed and drained. A job opens (or truncates) its destination,
//! reserves space, bulk-copies the payload from the job's offset, then applies
//! the entry's mode and mtime. Once any failure is recorded, workers keep
//! draining the queue without doing the work, so the producer never blocks on
//! a full queue nobody is reading.

use crate::archive::ArchiveEntry;
use crate::core::{CompletionTracker, ExtractJob, ExtractStats, JobReceiver};
use crate::error::{ExtractError, IoResultExt, Result};
use crate::fs::CopyPrimitive;
use crate::progress::ProgressReporter;
use filetime::FileTime;
use std::fs::{File, OpenOptions, Permissions};
use std::io;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

/// Everything a worker needs besides its jobs
pub struct WorkerContext {
    /// Archive to open a private handle on
    pub archive: PathBuf,
    /// Skip files whose size and mode already match
    pub update: bool,
    /// Reserve space before copying
    pub preallocate: bool,
    /// Set each file's mtime from its entry
    pub preserve_mtime: bool,
    /// Print each extracted path on stdout
    pub list_entries: bool,
    /// Platform transfer
    pub primitive: Arc<dyn CopyPrimitive>,
    /// Shared completion latch
    pub tracker: Arc<CompletionTracker>,
    /// Shared counters
    pub stats: Arc<ExtractStats>,
    /// Optional terminal progress
    pub progress: Option<Arc<ProgressReporter>>,
}

/// Outcome of one job that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Payload written; the byte count
    Extracted(u64),
    /// Existing file already matched
    Skipped,
}

/// Start `count` named worker threads pulling from `jobs`
pub fn spawn_workers(
    count: usize,
    jobs: JobReceiver,
    ctx: Arc<WorkerContext>,
) -> Result<Vec<thread::JoinHandle<()>>> {
    let mut handles = Vec::with_capacity(count);

    for worker_id in 0..count {
        let jobs = jobs.clone();
        let ctx = Arc::clone(&ctx);

        let handle = thread::Builder::new()
            .name(format!("partar-worker-{}", worker_id))
            .spawn(move || run_guarded(worker_id, &jobs, &ctx))
            .map_err(ExtractError::ThreadSpawn)?;
        handles.push(handle);
    }

    Ok(handles)
}

fn run_guarded(worker_id: usize, jobs: &JobReceiver, ctx: &WorkerContext) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| worker_loop(worker_id, jobs, ctx)));
    if outcome.is_err() {
        tracing::error!("worker {} panicked", worker_id);
        ctx.tracker.fail(ExtractError::WorkerPanicked(worker_id));
        // Keep the queue moving so the producer can finish.
        while jobs.pop().is_some() {}
    }
}

fn worker_loop(worker_id: usize, jobs: &JobReceiver, ctx: &WorkerContext) {
    let archive = match File::open(&ctx.archive) {
        Ok(file) => file,
        Err(source) => {
            ctx.tracker.fail(ExtractError::ArchiveOpen {
                path: ctx.archive.clone(),
                source,
            });
            while jobs.pop().is_some() {}
            return;
        }
    };
    let archive_len = match archive.metadata().with_path(&ctx.archive) {
        Ok(meta) => meta.len(),
        Err(e) => {
            ctx.tracker.fail(e);
            while jobs.pop().is_some() {}
            return;
        }
    };

    tracing::debug!("worker {} started", worker_id);

    while let Some(job) = jobs.pop() {
        if ctx.tracker.is_failed() {
            tracing::trace!("worker {} discarding job {}", worker_id, job.id);
            continue;
        }

        match extract_job(ctx, &archive, archive_len, &job) {
            Ok(outcome) => {
                match outcome {
                    JobOutcome::Extracted(bytes) => {
                        ctx.stats.record_extracted(bytes);
                        if let Some(progress) = &ctx.progress {
                            progress.increment_bytes(bytes);
                            progress.file_done(&job.entry.path);
                        }
                    }
                    JobOutcome::Skipped => {
                        ctx.stats.record_skipped();
                        tracing::debug!("up to date: {}", job.destination.display());
                    }
                }
                if ctx.list_entries {
                    println!("{}", job.entry.path.display());
                }
                ctx.tracker.done();
            }
            Err(e) => {
                tracing::debug!("worker {} failed job {}: {}", worker_id, job.id, e);
                ctx.tracker.fail(e);
            }
        }
    }

    tracing::debug!("worker {} shutting down", worker_id);
}

/// Whether `path` is already a regular file with this size and mode
fn is_up_to_date(path: &Path, entry: &ArchiveEntry) -> bool {
    match std::fs::symlink_metadata(path) {
        Ok(meta) => {
            meta.is_file()
                && meta.len() == entry.size
                && meta.permissions().mode() & crate::archive::MODE_MASK == entry.permissions()
        }
        Err(_) => false,
    }
}

/// Extract one job's payload into its destination
pub fn extract_job(
    ctx: &WorkerContext,
    archive: &File,
    archive_len: u64,
    job: &ExtractJob,
) -> Result<JobOutcome> {
    let entry = &job.entry;
    let path = &job.destination;

    if ctx.update && is_up_to_date(path, entry) {
        return Ok(JobOutcome::Skipped);
    }

    match entry.data_end() {
        Some(end) if end <= archive_len => {}
        _ => {
            return Err(ExtractError::Position {
                path: entry.path.clone(),
                offset: entry.data_offset,
                size: entry.size,
                archive_len,
            })
        }
    }

    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(entry.permissions())
        .open(path)
        .map_err(|source| ExtractError::DestinationOpen {
            path: path.clone(),
            source,
        })?;

    match write_payload(ctx, archive, &file, job) {
        Ok(bytes) => Ok(JobOutcome::Extracted(bytes)),
        Err(e) => {
            drop(file);
            if let Err(rm) = std::fs::remove_file(path) {
                if rm.kind() != io::ErrorKind::NotFound {
                    tracing::warn!("could not remove partial file {}: {}", path.display(), rm);
                }
            }
            Err(e)
        }
    }
}

/// Header mtime as a file time; values past `i64::MAX` clamp instead of wrapping
fn entry_mtime(entry: &ArchiveEntry) -> FileTime {
    FileTime::from_unix_time(i64::try_from(entry.mtime).unwrap_or(i64::MAX), 0)
}

fn write_payload(ctx: &WorkerContext, archive: &File, file: &File, job: &ExtractJob) -> Result<u64> {
    let entry = &job.entry;
    let path = &job.destination;

    if ctx.preallocate {
        if let Err(source) = ctx.primitive.expand(file, entry.size) {
            let err = ExtractError::Preallocation {
                path: path.clone(),
                length: entry.size,
                source,
            };
            if err.is_fatal() {
                return Err(err);
            }
            tracing::debug!("{}", err);
        }
    }

    let copied = ctx
        .primitive
        .bulk_copy(file, archive, job.offset(), job.size())
        .map_err(|e| ExtractError::Copy {
            path: path.clone(),
            copied: e.copied,
            source: e.source,
        })?;

    if copied != entry.size {
        return Err(ExtractError::ShortTransfer {
            path: path.clone(),
            expected: entry.size,
            actual: copied,
        });
    }

    // Exact bits, independent of the umask applied at open.
    let mode = entry.permissions();
    file.set_permissions(Permissions::from_mode(mode))
        .map_err(|source| ExtractError::Permissions {
            path: path.clone(),
            mode,
            source,
        })?;

    if ctx.preserve_mtime {
        filetime::set_file_handle_times(file, None, Some(entry_mtime(entry))).with_path(path)?;
    }

    Ok(copied)
}
