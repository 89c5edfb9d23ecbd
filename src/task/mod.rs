//! Cancellable tasks
//!
//! A [`Task`] is a [`Future`] of a [`TaskResult`] plus a best-effort
//! cancellation callback. It is pending while the future is unfilled and
//! determined once it is; cancelling does not force it to become determined.
//!
//! # Composition
//!
//! ```text
//! source ──map──────► Task<W>   cancel → source
//!        ──recover──► Task<V>   cancel → source
//!        ──flat_map─► Task<W>   cancel → source, then the inner task
//! [t1, t2, ..] ─joined_tasks─► Task<()>  cancel → every member, in order
//! ```
//!
//! Failures flow through `map` and `flat_map` untouched; `recover` and
//! `fallback` are the only combinators that consume them.

pub mod cancel;
pub mod combinators;
pub mod join;
pub mod result;

pub use cancel::Cancellation;
pub use join::{collected, joined_tasks};
pub use result::{TaskError, TaskErrorKind, TaskResult};

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::deferred::{Deferred, Future, Timeout};
use crate::executor::{self, ExecutorRef};

/// An eventual [`TaskResult`] with a cancellation request.
pub struct Task<V> {
    future: Future<TaskResult<V>>,
    cancellation: Cancellation,
}

impl<V> Clone for Task<V> {
    fn clone(&self) -> Self {
        Self {
            future: self.future.clone(),
            cancellation: self.cancellation.clone(),
        }
    }
}

impl<V> fmt::Debug for Task<V> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Task")
            .field("future", &self.future)
            .finish_non_exhaustive()
    }
}

impl<V> Task<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Pair an upstream future with a cancellation callback.
    pub fn new<F>(
        future: impl Into<Future<TaskResult<V>>>,
        cancellation: F,
    ) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::with_cancellation(future.into(), Arc::new(cancellation))
    }

    /// Wrap a future that cannot be cancelled.
    #[inline]
    pub fn from_future(future: impl Into<Future<TaskResult<V>>>) -> Self {
        Self::with_cancellation(future.into(), cancel::noop())
    }

    #[inline]
    pub(crate) fn with_cancellation(
        future: Future<TaskResult<V>>,
        cancellation: Cancellation,
    ) -> Self {
        Self {
            future,
            cancellation,
        }
    }

    /// A task that has already succeeded.
    #[inline]
    pub fn succeeded(value: V) -> Self {
        Self::from_future(Future::filled(TaskResult::Success(value)))
    }

    /// A task that has already failed.
    #[inline]
    pub fn failed(error: impl Into<TaskError>) -> Self {
        Self::from_future(Future::filled(TaskResult::Failure(error.into())))
    }

    /// A task that has already been determined with `result`.
    #[inline]
    pub fn determined(result: TaskResult<V>) -> Self {
        Self::from_future(Future::filled(result))
    }

    /// A task that never becomes determined and ignores cancellation.
    #[inline]
    pub fn pending() -> Self {
        Self::from_future(Future::never())
    }

    /// Run `body` on the shared background executor.
    #[inline]
    pub fn spawn<E, F>(body: F) -> Self
    where
        F: FnOnce() -> Result<V, E> + Send + 'static,
        E: Into<TaskError>,
    {
        Self::spawn_on(executor::shared(), body)
    }

    /// Run `body` on `executor` and report its outcome.
    ///
    /// A panic inside `body` becomes a failure.
    pub fn spawn_on<E, F>(
        executor: &ExecutorRef,
        body: F,
    ) -> Self
    where
        F: FnOnce() -> Result<V, E> + Send + 'static,
        E: Into<TaskError>,
    {
        let deferred = Deferred::new();
        let target = deferred.clone();
        executor.submit(Box::new(move || {
            target.fill(TaskResult::catching(body));
        }));
        Self::from_future(deferred.future())
    }

    /// The underlying future.
    #[inline]
    pub fn future(&self) -> &Future<TaskResult<V>> {
        &self.future
    }

    /// The cancellation callback.
    #[inline]
    pub fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }

    /// Ask the task to stop.
    ///
    /// Best effort: the task may still succeed or fail normally. Never blocks
    /// on the task and never panics.
    #[inline]
    pub fn cancel(&self) {
        cancel::invoke(&self.cancellation);
    }

    /// Check whether the task is determined.
    #[inline]
    pub fn is_determined(&self) -> bool {
        self.future.is_filled()
    }

    /// Get the result if the task is determined.
    #[inline]
    pub fn peek(&self) -> Option<TaskResult<V>> {
        self.future.peek()
    }

    /// Block until the task is determined or the timeout elapses.
    #[inline]
    pub fn wait(
        &self,
        timeout: impl Into<Timeout>,
    ) -> Option<TaskResult<V>> {
        self.future.wait(timeout)
    }

    /// Block until the task is determined or `deadline` passes.
    #[inline]
    pub fn wait_until(
        &self,
        deadline: Instant,
    ) -> Option<TaskResult<V>> {
        self.future.wait_until(deadline)
    }

    /// Call `body` with the result on the shared background executor.
    #[inline]
    pub fn upon<F>(
        &self,
        body: F,
    ) where
        F: FnOnce(TaskResult<V>) + Send + 'static,
    {
        self.future.upon(body);
    }

    /// Call `body` with the result on `executor`.
    #[inline]
    pub fn upon_on<F>(
        &self,
        executor: &ExecutorRef,
        body: F,
    ) where
        F: FnOnce(TaskResult<V>) + Send + 'static,
    {
        self.future.upon_on(executor, body);
    }

    /// Call `body` with the value if the task succeeds.
    #[inline]
    pub fn upon_success<F>(
        &self,
        body: F,
    ) where
        F: FnOnce(V) + Send + 'static,
    {
        self.upon_success_on(executor::shared(), body);
    }

    /// Call `body` on `executor` with the value if the task succeeds.
    pub fn upon_success_on<F>(
        &self,
        executor: &ExecutorRef,
        body: F,
    ) where
        F: FnOnce(V) + Send + 'static,
    {
        self.future.upon_on(executor, move |result| {
            if let TaskResult::Success(value) = result {
                body(value);
            }
        });
    }

    /// Call `body` with the error if the task fails.
    #[inline]
    pub fn upon_failure<F>(
        &self,
        body: F,
    ) where
        F: FnOnce(TaskError) + Send + 'static,
    {
        self.upon_failure_on(executor::shared(), body);
    }

    /// Call `body` on `executor` with the error if the task fails.
    pub fn upon_failure_on<F>(
        &self,
        executor: &ExecutorRef,
        body: F,
    ) where
        F: FnOnce(TaskError) + Send + 'static,
    {
        self.future.upon_on(executor, move |result| {
            if let TaskResult::Failure(error) = result {
                body(error);
            }
        });
    }

    /// Discard the success value, keeping the outcome and cancellation.
    pub fn ignored(&self) -> Task<()> {
        Task::with_cancellation(
            self.future.every(|result| result.map(|_| ())),
            self.cancellation.clone(),
        )
    }
}

impl<V> From<Task<V>> for Future<TaskResult<V>> {
    fn from(task: Task<V>) -> Self {
        task.future
    }
}
