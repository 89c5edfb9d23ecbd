//! Fixed-size worker pool
//!
//! Jobs are pushed onto an unbounded crossbeam channel and picked up by
//! whichever worker is idle. A panicking job is caught and counted; the
//! worker that ran it keeps serving the queue.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace, warn};

use super::{Executor, Job};

/// Thread pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of worker threads.
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
    /// Prefix for worker thread names; workers are named `{prefix}-{id}`.
    #[serde(default = "default_thread_name")]
    pub thread_name: String,
    /// Worker stack size in bytes, `None` for the platform default.
    #[serde(default)]
    pub stack_size: Option<usize>,
}

fn default_num_workers() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_thread_name() -> String {
    "deferred-worker".to_string()
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            num_workers: default_num_workers(),
            thread_name: default_thread_name(),
            stack_size: None,
        }
    }
}

impl PoolConfig {
    /// Set the worker count.
    #[inline]
    pub fn with_workers(
        mut self,
        num_workers: usize,
    ) -> Self {
        self.num_workers = num_workers;
        self
    }

    /// Set the thread name prefix.
    #[inline]
    pub fn with_thread_name(
        mut self,
        name: impl Into<String>,
    ) -> Self {
        self.thread_name = name.into();
        self
    }
}

/// Pool construction errors.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("thread pool needs at least one worker")]
    NoWorkers,

    #[error("failed to spawn worker thread {name}: {source}")]
    Spawn {
        /// Name of the thread that failed to start
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Pool statistics.
#[derive(Debug, Default)]
pub struct PoolStats {
    /// Jobs accepted by `submit`.
    pub jobs_submitted: AtomicUsize,
    /// Jobs that ran to completion.
    pub jobs_completed: AtomicUsize,
    /// Jobs that panicked.
    pub jobs_panicked: AtomicUsize,
    /// Jobs dropped because the pool was shut down.
    pub jobs_rejected: AtomicUsize,
}

impl PoolStats {
    #[inline]
    fn record_submitted(&self) {
        self.jobs_submitted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn record_finished(
        &self,
        panicked: bool,
    ) {
        if panicked {
            self.jobs_panicked.fetch_add(1, Ordering::Relaxed);
        } else {
            self.jobs_completed.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    fn record_rejected(&self) {
        self.jobs_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Jobs submitted but not yet finished.
    pub fn in_flight(&self) -> usize {
        let submitted = self.jobs_submitted.load(Ordering::Relaxed);
        let finished = self.jobs_completed.load(Ordering::Relaxed)
            + self.jobs_panicked.load(Ordering::Relaxed);
        submitted.saturating_sub(finished)
    }
}

/// Background executor backed by a fixed set of worker threads.
#[derive(Debug)]
pub struct ThreadPool {
    /// Configuration.
    config: PoolConfig,
    /// Job channel; `None` after shutdown.
    sender: RwLock<Option<Sender<Job>>>,
    /// Worker threads.
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
    /// Statistics.
    stats: Arc<PoolStats>,
}

impl ThreadPool {
    /// Create a pool with the default configuration.
    #[inline]
    pub fn new() -> Self {
        Self::with_config(PoolConfig::default())
    }

    /// Create a pool, panicking if a worker thread cannot be spawned.
    ///
    /// Mirrors `std::thread::spawn`; use [`ThreadPool::try_with_config`] to
    /// handle the failure instead.
    pub fn with_config(config: PoolConfig) -> Self {
        match Self::try_with_config(config) {
            Ok(pool) => pool,
            Err(err) => panic!("{}", err),
        }
    }

    /// Create a pool with a custom configuration.
    pub fn try_with_config(config: PoolConfig) -> Result<Self, PoolError> {
        if config.num_workers == 0 {
            return Err(PoolError::NoWorkers);
        }

        let (sender, receiver) = channel::unbounded::<Job>();
        let stats = Arc::new(PoolStats::default());
        let workers = Self::spawn_workers(&config, &receiver, &stats)?;

        debug!(
            workers = workers.len(),
            name = %config.thread_name,
            "thread pool started"
        );

        Ok(Self {
            config,
            sender: RwLock::new(Some(sender)),
            workers: Mutex::new(workers),
            stats,
        })
    }

    /// Spawn worker threads.
    fn spawn_workers(
        config: &PoolConfig,
        receiver: &Receiver<Job>,
        stats: &Arc<PoolStats>,
    ) -> Result<Vec<thread::JoinHandle<()>>, PoolError> {
        let mut workers = Vec::with_capacity(config.num_workers);

        for worker_id in 0..config.num_workers {
            let receiver = receiver.clone();
            let stats = stats.clone();
            let name = format!("{}-{}", config.thread_name, worker_id);

            let mut builder = thread::Builder::new().name(name.clone());
            if let Some(stack_size) = config.stack_size {
                builder = builder.stack_size(stack_size);
            }

            let worker = builder
                .spawn(move || Self::worker_loop(worker_id, &receiver, &stats))
                .map_err(|source| PoolError::Spawn { name, source })?;

            workers.push(worker);
        }

        Ok(workers)
    }

    /// Worker thread main loop; exits when the channel is closed and drained.
    fn worker_loop(
        worker_id: usize,
        receiver: &Receiver<Job>,
        stats: &PoolStats,
    ) {
        trace!(worker_id, "worker started");

        for job in receiver.iter() {
            let panicked = panic::catch_unwind(AssertUnwindSafe(job)).is_err();
            if panicked {
                warn!(worker_id, "job panicked on worker thread");
            }
            stats.record_finished(panicked);
        }

        trace!(worker_id, "worker stopped");
    }

    /// Get statistics.
    #[inline]
    pub fn stats(&self) -> &Arc<PoolStats> {
        &self.stats
    }

    /// Get the number of workers.
    #[inline]
    pub fn num_workers(&self) -> usize {
        self.config.num_workers
    }

    /// Get the configuration.
    #[inline]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Check if the pool still accepts jobs.
    #[inline]
    pub fn is_running(&self) -> bool {
        self.sender.read().is_some()
    }

    /// Stop accepting jobs, let workers drain the queue, and join them.
    ///
    /// Jobs submitted afterwards are dropped. Calling this from a job running
    /// on the pool itself skips joining that worker.
    pub fn shutdown(&self) {
        // Dropping the last sender closes the channel.
        drop(self.sender.write().take());

        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        let current = thread::current().id();
        for worker in workers {
            if worker.thread().id() == current {
                continue;
            }
            if worker.join().is_err() {
                warn!("worker thread exited abnormally");
            }
        }

        debug!(name = %self.config.thread_name, "thread pool stopped");
    }
}

impl Executor for ThreadPool {
    fn submit(
        &self,
        job: Job,
    ) {
        let sender = self.sender.read();
        if let Some(sender) = sender.as_ref() {
            self.stats.record_submitted();
            if sender.send(job).is_ok() {
                return;
            }
            self.stats.jobs_submitted.fetch_sub(1, Ordering::Relaxed);
        }
        self.stats.record_rejected();
        warn!(name = %self.config.thread_name, "job submitted after shutdown was dropped");
    }
}

impl Default for ThreadPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        if self.is_running() {
            self.shutdown();
        }
    }
}
