//! Completion tracking
//!
//! A countdown latch over outstanding jobs that also records the first fatal
//! failure. Waiters wake when the count reaches zero or when anything fails,
//! whichever comes first.

use crate::error::ExtractError;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct TrackerState {
    pending: u64,
    failure: Option<ExtractError>,
}

/// Outstanding-job latch with first-failure recording
#[derive(Default)]
pub struct CompletionTracker {
    state: Mutex<TrackerState>,
    changed: Condvar,
    failed: AtomicBool,
}

impl CompletionTracker {
    /// Create an idle tracker
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count one more job as outstanding
    pub fn add(&self) {
        self.lock().pending += 1;
    }

    /// Mark one job complete
    pub fn done(&self) {
        let mut state = self.lock();
        state.pending = state.pending.saturating_sub(1);
        if state.pending == 0 {
            self.changed.notify_all();
        }
    }

    /// Record a fatal failure. Only the first one is kept.
    ///
    /// Returns `true` if this call recorded the failure.
    pub fn fail(&self, error: ExtractError) -> bool {
        let mut state = self.lock();
        let first = state.failure.is_none() && !self.failed.load(Ordering::SeqCst);
        if first {
            tracing::debug!("first failure recorded: {}", error);
            state.failure = Some(error);
        } else {
            tracing::trace!("later failure ignored: {}", error);
        }
        self.failed.store(true, Ordering::SeqCst);
        self.changed.notify_all();
        first
    }

    /// Whether any failure has been recorded
    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    /// Jobs enqueued but not yet completed
    pub fn pending(&self) -> u64 {
        self.lock().pending
    }

    /// Block until every outstanding job completed or a failure was recorded.
    ///
    /// Returns `true` when the count drained without failure.
    pub fn wait(&self) -> bool {
        let mut state = self.lock();
        while state.pending > 0 && !self.is_failed() {
            state = self
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        !self.is_failed()
    }

    /// Take the recorded failure, if any
    pub fn take_failure(&self) -> Option<ExtractError> {
        self.lock().failure.take()
    }
}

/// Running counters shared by the producer and the workers
#[derive(Debug, Default)]
pub struct ExtractStats {
    /// Regular files written
    pub files_extracted: AtomicU64,
    /// Regular files left untouched in update mode
    pub files_skipped: AtomicU64,
    /// Directories created
    pub dirs_created: AtomicU64,
    /// Entries of other types that were skipped
    pub entries_ignored: AtomicU64,
    /// Payload bytes written
    pub bytes_copied: AtomicU64,
}

impl ExtractStats {
    /// Record one extracted file
    pub fn record_extracted(&self, bytes: u64) {
        self.files_extracted.fetch_add(1, Ordering::Relaxed);
        self.bytes_copied.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record one file skipped in update mode
    pub fn record_skipped(&self) {
        self.files_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one created directory
    pub fn record_directory(&self) {
        self.dirs_created.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one ignored entry
    pub fn record_ignored(&self) {
        self.entries_ignored.fetch_add(1, Ordering::Relaxed);
    }
}
