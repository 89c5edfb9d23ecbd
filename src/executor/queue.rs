//! Manually drained job queue
//!
//! [`QueueExecutor`] only records submissions. Jobs run when some thread
//! calls [`QueueExecutor::run_pending`] or [`QueueExecutor::run_until_idle`],
//! which makes it usable as a single-threaded run loop.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{Executor, Job};

/// An executor whose jobs wait until the owner drains them.
#[derive(Clone, Default)]
pub struct QueueExecutor {
    /// Pending jobs in submission order.
    jobs: Arc<Mutex<VecDeque<Job>>>,
    /// Total number of jobs ever submitted.
    submitted: Arc<AtomicUsize>,
}

impl QueueExecutor {
    /// Create an empty queue.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of jobs waiting to run.
    #[inline]
    pub fn pending(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Check if no job is waiting.
    #[inline]
    pub fn is_idle(&self) -> bool {
        self.jobs.lock().is_empty()
    }

    /// Total number of jobs submitted so far.
    #[inline]
    pub fn submitted(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }

    /// Run the oldest pending job, if any.
    pub fn run_one(&self) -> bool {
        // The lock is released before the job runs so it may submit more work.
        let job = self.jobs.lock().pop_front();
        match job {
            Some(job) => {
                job();
                true
            },
            None => false,
        }
    }

    /// Run the jobs that were pending when the call started.
    ///
    /// Jobs submitted while draining stay queued. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let batch: Vec<Job> = self.jobs.lock().drain(..).collect();
        let count = batch.len();
        for job in batch {
            job();
        }
        count
    }

    /// Run jobs until the queue is empty, including ones submitted meanwhile.
    pub fn run_until_idle(&self) -> usize {
        let mut count = 0;
        while self.run_one() {
            count += 1;
        }
        count
    }
}

impl Executor for QueueExecutor {
    fn submit(
        &self,
        job: Job,
    ) {
        self.submitted.fetch_add(1, Ordering::SeqCst);
        self.jobs.lock().push_back(job);
    }
}

impl fmt::Debug for QueueExecutor {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("QueueExecutor")
            .field("pending", &self.pending())
            .field("submitted", &self.submitted())
            .finish()
    }
}
