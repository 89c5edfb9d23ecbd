//! Task combinators
//!
//! Every combinator allocates one new [`Deferred`] for its result and wires
//! it to the upstream with a single `upon`. Transforms run on the executor
//! passed to the `*_on` form, or on the shared background executor. A
//! transform that returns `Err` or panics produces a failed task; the derived
//! task is always determined once its upstream is.

use std::convert::Infallible;
use std::sync::Arc;

use tracing::{debug, trace};

use super::cancel::CancellationSlot;
use super::{Task, TaskError, TaskResult};
use crate::deferred::Deferred;
use crate::executor::{self, ExecutorRef};

impl<V> Task<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Transform the success value on the shared background executor.
    #[inline]
    pub fn map<W, F>(
        &self,
        transform: F,
    ) -> Task<W>
    where
        W: Clone + Send + Sync + 'static,
        F: FnOnce(V) -> W + Send + 'static,
    {
        self.map_on(executor::shared(), transform)
    }

    /// Transform the success value on `executor`.
    ///
    /// A failure passes through without calling `transform`. Cancelling the
    /// result cancels `self`.
    #[inline]
    pub fn map_on<W, F>(
        &self,
        executor: &ExecutorRef,
        transform: F,
    ) -> Task<W>
    where
        W: Clone + Send + Sync + 'static,
        F: FnOnce(V) -> W + Send + 'static,
    {
        self.try_map_on(executor, move |value| Ok::<W, Infallible>(transform(value)))
    }

    /// Fallible [`Task::map`].
    #[inline]
    pub fn try_map<W, E, F>(
        &self,
        transform: F,
    ) -> Task<W>
    where
        W: Clone + Send + Sync + 'static,
        E: Into<TaskError>,
        F: FnOnce(V) -> Result<W, E> + Send + 'static,
    {
        self.try_map_on(executor::shared(), transform)
    }

    /// Fallible [`Task::map_on`]; an `Err` becomes the result's failure.
    pub fn try_map_on<W, E, F>(
        &self,
        executor: &ExecutorRef,
        transform: F,
    ) -> Task<W>
    where
        W: Clone + Send + Sync + 'static,
        E: Into<TaskError>,
        F: FnOnce(V) -> Result<W, E> + Send + 'static,
    {
        let deferred = Deferred::new();
        let target = deferred.clone();

        self.future.upon_on(executor, move |result| {
            let next = match result {
                TaskResult::Success(value) => TaskResult::catching(move || transform(value)),
                TaskResult::Failure(error) => TaskResult::Failure(error),
            };
            target.fill(next);
        });

        Task::with_cancellation(deferred.future(), self.cancellation.clone())
    }

    /// Start a follow-up task on the shared background executor.
    #[inline]
    pub fn flat_map<W, F>(
        &self,
        transform: F,
    ) -> Task<W>
    where
        W: Clone + Send + Sync + 'static,
        F: FnOnce(V) -> Task<W> + Send + 'static,
    {
        self.flat_map_on(executor::shared(), transform)
    }

    /// Start a follow-up task from the success value on `executor` and
    /// resolve to its outcome.
    ///
    /// Cancelling the result cancels `self` until the follow-up task exists,
    /// and the follow-up task afterwards.
    #[inline]
    pub fn flat_map_on<W, F>(
        &self,
        executor: &ExecutorRef,
        transform: F,
    ) -> Task<W>
    where
        W: Clone + Send + Sync + 'static,
        F: FnOnce(V) -> Task<W> + Send + 'static,
    {
        self.try_flat_map_on(executor, move |value| Ok::<Task<W>, Infallible>(transform(value)))
    }

    /// Fallible [`Task::flat_map`].
    #[inline]
    pub fn try_flat_map<W, E, F>(
        &self,
        transform: F,
    ) -> Task<W>
    where
        W: Clone + Send + Sync + 'static,
        E: Into<TaskError>,
        F: FnOnce(V) -> Result<Task<W>, E> + Send + 'static,
    {
        self.try_flat_map_on(executor::shared(), transform)
    }

    /// Fallible [`Task::flat_map_on`]; an `Err` short-circuits to a failure
    /// without any follow-up task.
    pub fn try_flat_map_on<W, E, F>(
        &self,
        executor: &ExecutorRef,
        transform: F,
    ) -> Task<W>
    where
        W: Clone + Send + Sync + 'static,
        E: Into<TaskError>,
        F: FnOnce(V) -> Result<Task<W>, E> + Send + 'static,
    {
        let deferred = Deferred::new();
        let target = deferred.clone();
        let slot = CancellationSlot::new(self.cancellation.clone());
        let stage = slot.clone();

        self.future.upon_on(executor, move |result| {
            let value = match result {
                TaskResult::Success(value) => value,
                TaskResult::Failure(error) => {
                    target.fill(TaskResult::Failure(error));
                    return;
                },
            };
            let inner = match TaskResult::catching(move || transform(value)) {
                TaskResult::Success(inner) => inner,
                TaskResult::Failure(error) => {
                    trace!(error = %error, "flat_map transform failed");
                    target.fill(TaskResult::Failure(error));
                    return;
                },
            };
            stage.replace(inner.cancellation.clone());
            inner.future.upon_on(executor::immediate(), move |outcome| {
                stage.release();
                target.fill(outcome);
            });
        });

        Task::with_cancellation(deferred.future(), slot.handle())
    }

    /// Replace a failure with a value on the shared background executor.
    #[inline]
    pub fn recover<F>(
        &self,
        transform: F,
    ) -> Task<V>
    where
        F: FnOnce(TaskError) -> V + Send + 'static,
    {
        self.recover_on(executor::shared(), transform)
    }

    /// Replace a failure with `transform(error)` on `executor`.
    ///
    /// A success passes through without calling `transform`. Cancelling the
    /// result cancels `self`.
    #[inline]
    pub fn recover_on<F>(
        &self,
        executor: &ExecutorRef,
        transform: F,
    ) -> Task<V>
    where
        F: FnOnce(TaskError) -> V + Send + 'static,
    {
        self.try_recover_on(executor, move |error| Ok::<V, Infallible>(transform(error)))
    }

    /// Fallible [`Task::recover`].
    #[inline]
    pub fn try_recover<E, F>(
        &self,
        transform: F,
    ) -> Task<V>
    where
        E: Into<TaskError>,
        F: FnOnce(TaskError) -> Result<V, E> + Send + 'static,
    {
        self.try_recover_on(executor::shared(), transform)
    }

    /// Fallible [`Task::recover_on`]; an `Err` becomes the new failure.
    pub fn try_recover_on<E, F>(
        &self,
        executor: &ExecutorRef,
        transform: F,
    ) -> Task<V>
    where
        E: Into<TaskError>,
        F: FnOnce(TaskError) -> Result<V, E> + Send + 'static,
    {
        let deferred = Deferred::new();
        let target = deferred.clone();

        self.future.upon_on(executor, move |result| {
            let next = match result {
                TaskResult::Success(value) => TaskResult::Success(value),
                TaskResult::Failure(error) => TaskResult::catching(move || transform(error)),
            };
            target.fill(next);
        });

        Task::with_cancellation(deferred.future(), self.cancellation.clone())
    }

    /// Start a replacement task on failure, on the shared background executor.
    #[inline]
    pub fn fallback<F>(
        &self,
        transform: F,
    ) -> Task<V>
    where
        F: FnOnce(TaskError) -> Task<V> + Send + 'static,
    {
        self.fallback_on(executor::shared(), transform)
    }

    /// Start a replacement task from the failure on `executor`.
    ///
    /// Cancellation composes like [`Task::flat_map_on`].
    pub fn fallback_on<F>(
        &self,
        executor: &ExecutorRef,
        transform: F,
    ) -> Task<V>
    where
        F: FnOnce(TaskError) -> Task<V> + Send + 'static,
    {
        let deferred = Deferred::new();
        let target = deferred.clone();
        let slot = CancellationSlot::new(self.cancellation.clone());
        let stage = slot.clone();

        self.future.upon_on(executor, move |result| {
            let error = match result {
                TaskResult::Success(value) => {
                    target.fill(TaskResult::Success(value));
                    return;
                },
                TaskResult::Failure(error) => error,
            };
            let replacement = match TaskResult::catching(move || Ok::<_, Infallible>(transform(error))) {
                TaskResult::Success(replacement) => replacement,
                TaskResult::Failure(error) => {
                    target.fill(TaskResult::Failure(error));
                    return;
                },
            };
            stage.replace(replacement.cancellation.clone());
            replacement.future.upon_on(executor::immediate(), move |outcome| {
                stage.release();
                target.fill(outcome);
            });
        });

        Task::with_cancellation(deferred.future(), slot.handle())
    }

    /// Retry on the shared background executor; see [`Task::repeat_on`].
    #[inline]
    pub fn repeat<M, P>(
        max_retries: usize,
        make: M,
        should_retry: P,
    ) -> Task<V>
    where
        M: Fn() -> Task<V> + Send + Sync + 'static,
        P: Fn(&TaskError) -> bool + Send + Sync + 'static,
    {
        Self::repeat_on(executor::shared(), max_retries, make, should_retry)
    }

    /// Start a task with `make`, starting a fresh one after each failure for
    /// which `should_retry` holds, at most `max_retries` extra times.
    ///
    /// Each attempt is started on `executor`. Cancelling the result cancels
    /// the attempt in flight and stops further retries.
    pub fn repeat_on<M, P>(
        executor: &ExecutorRef,
        max_retries: usize,
        make: M,
        should_retry: P,
    ) -> Task<V>
    where
        M: Fn() -> Task<V> + Send + Sync + 'static,
        P: Fn(&TaskError) -> bool + Send + Sync + 'static,
    {
        let deferred = Deferred::new();
        let slot = CancellationSlot::new(super::cancel::noop());
        let state = Arc::new(Repeat {
            executor: executor.clone(),
            target: deferred.clone(),
            slot: slot.clone(),
            make: Box::new(make),
            should_retry: Box::new(should_retry),
        });

        Repeat::schedule(state, max_retries, 0);
        Task::with_cancellation(deferred.future(), slot.handle())
    }
}

/// Shared state of a [`Task::repeat_on`] chain.
struct Repeat<V> {
    executor: ExecutorRef,
    target: Deferred<TaskResult<V>>,
    slot: Arc<CancellationSlot>,
    make: Box<dyn Fn() -> Task<V> + Send + Sync>,
    should_retry: Box<dyn Fn(&TaskError) -> bool + Send + Sync>,
}

impl<V> Repeat<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn schedule(
        state: Arc<Self>,
        remaining: usize,
        attempt: usize,
    ) {
        let executor = state.executor.clone();
        executor.submit(Box::new(move || Self::start(state, remaining, attempt)));
    }

    fn start(
        state: Arc<Self>,
        remaining: usize,
        attempt: usize,
    ) {
        let task = match TaskResult::catching(|| Ok::<_, Infallible>((state.make)())) {
            TaskResult::Success(task) => task,
            TaskResult::Failure(error) => {
                state.target.fill(TaskResult::Failure(error));
                return;
            },
        };
        state.slot.replace(task.cancellation.clone());

        let next = state.clone();
        task.future.upon_on(executor::immediate(), move |result| {
            let error = match result {
                TaskResult::Failure(error) if remaining > 0 => error,
                other => {
                    next.slot.release();
                    next.target.fill(other);
                    return;
                },
            };
            if next.slot.is_requested() || !(next.should_retry)(&error) {
                next.slot.release();
                next.target.fill(TaskResult::Failure(error));
                return;
            }
            debug!(attempt = attempt + 1, error = %error, "retrying failed task");
            Self::schedule(next, remaining - 1, attempt + 1);
        });
    }
}
