//! Executors: "run this callback later, possibly on another thread"
//!
//! Every continuation in this crate reaches user code through an
//! [`Executor`]. Three implementations ship with the crate:
//!
//! - [`ImmediateExecutor`]: runs the job on the submitting thread. Reserved
//!   for internal glue whose bodies are known to be short and non-reentrant.
//!   Nested submissions are trampolined, so a chain of forwarding jobs runs
//!   in constant stack depth.
//! - [`ThreadPool`]: a fixed set of worker threads fed by a channel. The
//!   process-wide default executor returned by [`shared`] is one of these.
//! - [`QueueExecutor`]: a manually drained queue, handy as a run loop or as a
//!   deterministic executor in tests.
//!
//! `rayon::ThreadPool` also implements [`Executor`], so an existing rayon pool
//! can serve continuations directly.

pub mod pool;
pub mod queue;

pub use pool::{PoolConfig, PoolError, PoolStats, ThreadPool};
pub use queue::QueueExecutor;

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use once_cell::sync::{Lazy, OnceCell};
use tracing::{debug, warn};

use crate::util::config::{ConfigError, RuntimeConfig};

/// A unit of work handed to an executor.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Shared handle to an executor.
pub type ExecutorRef = Arc<dyn Executor>;

/// Capability to run a job eventually.
///
/// Implementations must run every submitted job exactly once unless the
/// executor has been shut down, in which case the job is dropped.
pub trait Executor: Send + Sync {
    /// Submit `job` for execution.
    fn submit(
        &self,
        job: Job,
    );
}

impl<E: Executor + ?Sized> Executor for Arc<E> {
    #[inline]
    fn submit(
        &self,
        job: Job,
    ) {
        (**self).submit(job)
    }
}

impl<E: Executor + ?Sized> Executor for Box<E> {
    #[inline]
    fn submit(
        &self,
        job: Job,
    ) {
        (**self).submit(job)
    }
}

impl Executor for rayon::ThreadPool {
    #[inline]
    fn submit(
        &self,
        job: Job,
    ) {
        self.spawn(job);
    }
}

impl fmt::Debug for dyn Executor {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str("Executor")
    }
}

/// Runs each job on the calling thread before `submit` returns.
///
/// A job submitted while another immediate job is running on the same thread
/// is queued and runs after the current one returns. A panicking job is
/// caught and logged; the jobs queued behind it still run.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateExecutor;

thread_local! {
    /// Jobs waiting behind the immediate job running on this thread; `None`
    /// when no immediate job is running.
    static TRAMPOLINE: RefCell<Option<VecDeque<Job>>> = const { RefCell::new(None) };
}

impl ImmediateExecutor {
    fn run_contained(job: Job) {
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            warn!("job panicked on immediate executor");
        }
    }

    fn next_queued() -> Option<Job> {
        TRAMPOLINE.with(|slot| slot.borrow_mut().as_mut().and_then(VecDeque::pop_front))
    }
}

impl Executor for ImmediateExecutor {
    fn submit(
        &self,
        job: Job,
    ) {
        let job = TRAMPOLINE.with(|slot| {
            let mut slot = slot.borrow_mut();
            match slot.as_mut() {
                Some(queue) => {
                    queue.push_back(job);
                    None
                },
                None => {
                    *slot = Some(VecDeque::new());
                    Some(job)
                },
            }
        });
        let Some(job) = job else {
            return;
        };

        Self::run_contained(job);
        while let Some(next) = Self::next_queued() {
            Self::run_contained(next);
        }
        TRAMPOLINE.with(|slot| *slot.borrow_mut() = None);
    }
}

static IMMEDIATE: Lazy<ExecutorRef> = Lazy::new(|| Arc::new(ImmediateExecutor));

static SHARED: OnceCell<ExecutorRef> = OnceCell::new();

/// The synchronous executor used by internal forwarding continuations.
#[inline]
pub(crate) fn immediate() -> &'static ExecutorRef {
    &IMMEDIATE
}

/// The process-wide background executor.
///
/// Created on first use from [`RuntimeConfig::from_env`] unless
/// [`install_shared`] ran earlier, then reused for the rest of the process.
pub fn shared() -> &'static ExecutorRef {
    SHARED.get_or_init(|| {
        let config = RuntimeConfig::from_env();
        debug!(
            workers = config.pool.num_workers,
            "initializing shared executor"
        );
        Arc::new(ThreadPool::with_config(config.pool))
    })
}

/// Configure the process-wide executor before anything uses it.
///
/// Fails with [`ConfigError::AlreadyInitialized`] once [`shared`] has been
/// called, or if another `install_shared` won.
pub fn install_shared(config: PoolConfig) -> Result<(), ConfigError> {
    if SHARED.get().is_some() {
        return Err(ConfigError::AlreadyInitialized);
    }
    let pool = ThreadPool::try_with_config(config)?;
    SHARED
        .set(Arc::new(pool))
        .map_err(|_| ConfigError::AlreadyInitialized)
}

/// Install an arbitrary executor as the process-wide default.
pub fn install_shared_executor(executor: ExecutorRef) -> Result<(), ConfigError> {
    SHARED
        .set(executor)
        .map_err(|_| ConfigError::AlreadyInitialized)
}
