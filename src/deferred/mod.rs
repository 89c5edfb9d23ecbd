//! Deferred values
//!
//! A [`Deferred`] is filled exactly once, from any thread, and notifies every
//! continuation registered against it. It combines three pieces:
//!
//! ```text
//! ┌──────────────── Inner<T> ────────────────┐
//! │ cell:    OnceCell<T>     (lock-free read) │
//! │ pending: Mutex<[Continuation<T>]>         │
//! │ filled:  Condvar         (blocking wait)  │
//! └───────────────────────────────────────────┘
//! ```
//!
//! The "register or dispatch" decision in `upon` and the "drain" step in
//! `fill` both run under `pending`'s lock, so a continuation registered
//! concurrently with a fill is either seen by the drain or sees the filled
//! cell. User callbacks and executor submissions always happen after the lock
//! is released.

pub mod collection;
pub mod future;

pub use collection::{all_filled, first_filled};
pub use future::{Every, Future, Observable};

use std::fmt;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use smallvec::SmallVec;
use tracing::{trace, warn};

use crate::cell::OnceCell;
use crate::executor::{self, ExecutorRef};

/// How long a blocking wait may last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Wait until the value arrives.
    Forever,
    /// Give up after the duration elapses. A zero duration only checks once.
    After(Duration),
}

impl Timeout {
    /// A timeout that performs a single non-blocking check.
    pub const NOW: Timeout = Timeout::After(Duration::ZERO);

    /// The absolute deadline, or `None` for an unbounded wait.
    pub fn deadline(self) -> Option<Instant> {
        match self {
            Timeout::Forever => None,
            // Durations too large to represent as an instant are unbounded.
            Timeout::After(duration) => Instant::now().checked_add(duration),
        }
    }
}

impl From<Duration> for Timeout {
    fn from(duration: Duration) -> Self {
        Timeout::After(duration)
    }
}

impl From<Option<Duration>> for Timeout {
    fn from(duration: Option<Duration>) -> Self {
        duration.map_or(Timeout::Forever, Timeout::After)
    }
}

/// Boxed continuation body.
pub(crate) type Body<T> = Box<dyn FnOnce(T) + Send + 'static>;

/// A continuation waiting for the value, paired with where it must run.
struct Continuation<T> {
    executor: ExecutorRef,
    body: Body<T>,
}

impl<T: Send + 'static> Continuation<T> {
    /// Hand the body to its executor. A panicking `submit` is logged and
    /// does not reach the caller, so the remaining continuations still run.
    fn dispatch(
        self,
        value: T,
    ) {
        let Continuation { executor, body } = self;
        let submitted = panic::catch_unwind(AssertUnwindSafe(|| {
            executor.submit(Box::new(move || body(value)));
        }));
        if submitted.is_err() {
            warn!("executor panicked while accepting a continuation");
        }
    }
}

/// Pending continuations; most values have very few observers.
type Registry<T> = SmallVec<[Continuation<T>; 2]>;

/// Shared state behind a [`Deferred`] and every view derived from it.
pub(crate) struct Inner<T> {
    cell: OnceCell<T>,
    pending: Mutex<Registry<T>>,
    filled: Condvar,
}

impl<T> Inner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn new() -> Self {
        Self {
            cell: OnceCell::new(),
            pending: Mutex::new(SmallVec::new()),
            filled: Condvar::new(),
        }
    }

    fn with_value(value: T) -> Self {
        Self {
            cell: OnceCell::filled(value),
            pending: Mutex::new(SmallVec::new()),
            filled: Condvar::new(),
        }
    }

    fn fill(
        &self,
        value: T,
    ) -> bool {
        if !self.cell.try_fill(value) {
            trace!("deferred fill lost the race");
            return false;
        }

        let drained = {
            let mut pending = self.pending.lock();
            self.filled.notify_all();
            mem::take(&mut *pending)
        };

        if let Some(value) = self.cell.peek() {
            trace!(continuations = drained.len(), "deferred filled");
            for continuation in drained {
                continuation.dispatch(value.clone());
            }
        }
        true
    }

    fn upon_on(
        &self,
        executor: &ExecutorRef,
        body: Body<T>,
    ) {
        let continuation = Continuation {
            executor: executor.clone(),
            body,
        };

        // Once filled the cell never empties, so no lock is needed here.
        if let Some(value) = self.cell.peek() {
            continuation.dispatch(value.clone());
            return;
        }

        let mut pending = self.pending.lock();
        match self.cell.peek() {
            Some(value) => {
                let value = value.clone();
                drop(pending);
                continuation.dispatch(value);
            },
            None => pending.push(continuation),
        }
    }

    fn wait_deadline(
        &self,
        deadline: Option<Instant>,
    ) -> Option<T> {
        if let Some(value) = self.cell.peek() {
            return Some(value.clone());
        }

        let mut pending = self.pending.lock();
        loop {
            if let Some(value) = self.cell.peek() {
                return Some(value.clone());
            }
            match deadline {
                None => self.filled.wait(&mut pending),
                Some(deadline) => {
                    if self.filled.wait_until(&mut pending, deadline).timed_out() {
                        return self.cell.peek().cloned();
                    }
                },
            }
        }
    }

    fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }
}

impl<T> Observable<T> for Inner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn upon_boxed(
        &self,
        executor: &ExecutorRef,
        body: Body<T>,
    ) {
        self.upon_on(executor, body);
    }

    fn peek(&self) -> Option<T> {
        self.cell.peek().cloned()
    }

    fn is_filled(&self) -> bool {
        self.cell.is_filled()
    }

    fn wait_deadline(
        &self,
        deadline: Option<Instant>,
    ) -> Option<T> {
        Inner::wait_deadline(self, deadline)
    }
}

/// A value that becomes available exactly once.
///
/// Cloning a `Deferred` yields another handle to the same value; any handle
/// may fill it. Hand out [`Deferred::future`] to consumers that should only
/// observe.
///
/// ```
/// use deferred::{Deferred, Timeout};
///
/// let d = Deferred::new();
/// assert!(d.fill(1));
/// assert!(!d.fill(2));
/// assert_eq!(d.wait(Timeout::NOW), Some(1));
/// ```
pub struct Deferred<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Deferred<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create an unfilled value.
    #[inline]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner::new()),
        }
    }

    /// Create a value that is already filled.
    #[inline]
    pub fn filled(value: T) -> Self {
        Self {
            inner: Arc::new(Inner::with_value(value)),
        }
    }

    /// Fill the value, returning `true` iff this call won.
    ///
    /// On success every registered continuation is submitted to its executor
    /// and blocked waiters are woken. A losing call changes nothing.
    #[inline]
    pub fn fill(
        &self,
        value: T,
    ) -> bool {
        self.inner.fill(value)
    }

    /// Check whether the value is available.
    #[inline]
    pub fn is_filled(&self) -> bool {
        self.inner.cell.is_filled()
    }

    /// Get a copy of the value if it is available.
    #[inline]
    pub fn peek(&self) -> Option<T> {
        self.inner.cell.peek().cloned()
    }

    /// Call `body` with the value on the shared background executor.
    #[inline]
    pub fn upon<F>(
        &self,
        body: F,
    ) where
        F: FnOnce(T) + Send + 'static,
    {
        self.upon_on(executor::shared(), body);
    }

    /// Call `body` with the value on `executor`.
    ///
    /// The body goes through `executor` even when the value is already known.
    #[inline]
    pub fn upon_on<F>(
        &self,
        executor: &ExecutorRef,
        body: F,
    ) where
        F: FnOnce(T) + Send + 'static,
    {
        self.inner.upon_on(executor, Box::new(body));
    }

    /// Block until the value is available or the timeout elapses.
    #[inline]
    pub fn wait(
        &self,
        timeout: impl Into<Timeout>,
    ) -> Option<T> {
        self.inner.wait_deadline(timeout.into().deadline())
    }

    /// Block until the value is available or `deadline` passes.
    #[inline]
    pub fn wait_until(
        &self,
        deadline: Instant,
    ) -> Option<T> {
        self.inner.wait_deadline(Some(deadline))
    }

    /// Read-only view of this value.
    #[inline]
    pub fn future(&self) -> Future<T> {
        Future::from_source(self.inner.clone())
    }

    /// Number of continuations still waiting for the value.
    #[inline]
    pub fn pending_continuations(&self) -> usize {
        self.inner.pending_len()
    }
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for Deferred<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for Deferred<T> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("value", &self.inner.cell.peek())
            .finish()
    }
}

impl<T> From<Deferred<T>> for Future<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn from(deferred: Deferred<T>) -> Self {
        deferred.future()
    }
}

#[cfg(test)]
mod tests;
