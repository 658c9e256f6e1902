//! Bounded job queue between the producer and the workers
//!
//! Insertion blocks while the queue is full, which is the pipeline's only
//! backpressure. Closing is dropping the sender: workers drain whatever is
//! left and then see the end of the stream.

use crate::archive::ArchiveEntry;
use crossbeam::channel::{bounded, Receiver, Sender};
use std::path::PathBuf;
use thiserror::Error;

/// A regular-file entry waiting for a worker
#[derive(Debug, Clone)]
pub struct ExtractJob {
    /// Enqueue ordinal, for logs only
    pub id: u64,
    /// The decoded entry; its `data_offset` is where the payload starts
    pub entry: ArchiveEntry,
    /// Resolved destination path
    pub destination: PathBuf,
}

impl ExtractJob {
    /// Payload offset in the archive
    pub fn offset(&self) -> u64 {
        self.entry.data_offset
    }

    /// Declared payload size
    pub fn size(&self) -> u64 {
        self.entry.size
    }
}

/// Every receiver is gone; nobody will ever take the job
#[derive(Error, Debug)]
#[error("job queue closed with no workers left")]
pub struct QueueClosed(pub ExtractJob);

/// Create a queue holding at most `capacity` jobs
pub fn job_queue(capacity: usize) -> (JobSender, JobReceiver) {
    let (tx, rx) = bounded(capacity.max(1));
    (JobSender { tx, next_id: 0 }, JobReceiver { rx })
}

/// Producer side of the queue
pub struct JobSender {
    tx: Sender<ExtractJob>,
    next_id: u64,
}

impl JobSender {
    /// Enqueue a job, blocking while the queue is full
    pub fn push(&mut self, entry: ArchiveEntry, destination: PathBuf) -> Result<u64, QueueClosed> {
        let id = self.next_id;
        let job = ExtractJob {
            id,
            entry,
            destination,
        };

        self.tx.send(job).map_err(|e| QueueClosed(e.into_inner()))?;
        self.next_id += 1;
        Ok(id)
    }

    /// Jobs enqueued so far
    pub fn pushed(&self) -> u64 {
        self.next_id
    }

    /// Signal that no further jobs will arrive
    pub fn close(self) {
        drop(self);
    }
}

/// Worker side of the queue
#[derive(Clone)]
pub struct JobReceiver {
    rx: Receiver<ExtractJob>,
}

impl JobReceiver {
    /// Take the next job, blocking while the queue is empty.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub fn pop(&self) -> Option<ExtractJob> {
        self.rx.recv().ok()
    }
}
