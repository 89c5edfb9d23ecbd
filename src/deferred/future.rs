//! Read-only views over deferred values
//!
//! [`Observable`] is the capability set shared by everything that can be
//! waited on: register a continuation, peek, block. [`Future`] is the
//! type-erased handle consumers hold. Derived views such as [`Every`] wrap an
//! upstream future without allocating a new [`Deferred`].

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use super::{Body, Deferred, Timeout};
use crate::executor::{self, ExecutorRef};

/// Something that eventually produces a `T`.
pub trait Observable<T>: Send + Sync {
    /// Register `body` to run on `executor` once the value is available.
    fn upon_boxed(
        &self,
        executor: &ExecutorRef,
        body: Body<T>,
    );

    /// Get the value if it is available.
    fn peek(&self) -> Option<T>;

    /// Check whether the value is available.
    fn is_filled(&self) -> bool;

    /// Block until the value is available or `deadline` passes.
    /// `None` waits without a limit.
    fn wait_deadline(
        &self,
        deadline: Option<Instant>,
    ) -> Option<T>;
}

/// Read-only handle to an eventual value.
///
/// Cheap to clone; all clones observe the same value.
pub struct Future<T> {
    source: Arc<dyn Observable<T>>,
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
        }
    }
}

impl<T> fmt::Debug for Future<T> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Future")
            .field("filled", &self.source.is_filled())
            .finish()
    }
}

impl<T> Future<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Wrap any observable source.
    #[inline]
    pub fn from_source(source: Arc<dyn Observable<T>>) -> Self {
        Self { source }
    }

    /// A future that is already determined.
    #[inline]
    pub fn filled(value: T) -> Self {
        Deferred::filled(value).future()
    }

    /// A future that is never determined.
    #[inline]
    pub fn never() -> Self {
        Deferred::new().future()
    }

    /// Get the value if it is available.
    #[inline]
    pub fn peek(&self) -> Option<T> {
        self.source.peek()
    }

    /// Check whether the value is available.
    #[inline]
    pub fn is_filled(&self) -> bool {
        self.source.is_filled()
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
    #[inline]
    pub fn upon_on<F>(
        &self,
        executor: &ExecutorRef,
        body: F,
    ) where
        F: FnOnce(T) + Send + 'static,
    {
        self.source.upon_boxed(executor, Box::new(body));
    }

    /// Block until the value is available or the timeout elapses.
    #[inline]
    pub fn wait(
        &self,
        timeout: impl Into<Timeout>,
    ) -> Option<T> {
        self.source.wait_deadline(timeout.into().deadline())
    }

    /// Block until the value is available or `deadline` passes.
    #[inline]
    pub fn wait_until(
        &self,
        deadline: Instant,
    ) -> Option<T> {
        self.source.wait_deadline(Some(deadline))
    }

    /// Lazily re-shape the value.
    ///
    /// No storage is allocated: `transform` runs once per registered
    /// continuation, per `peek` and per `wait`, so it must be pure and cheap.
    pub fn every<U, F>(
        &self,
        transform: F,
    ) -> Future<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        Future::from_source(Arc::new(Every {
            upstream: self.clone(),
            transform: Arc::new(transform),
        }))
    }

    /// Discard the value, keeping only the moment it arrives.
    #[inline]
    pub fn ignored(&self) -> Future<()> {
        self.every(|_| ())
    }

    /// Transform the value on the shared background executor.
    #[inline]
    pub fn map<U, F>(
        &self,
        transform: F,
    ) -> Future<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.map_on(executor::shared(), transform)
    }

    /// Transform the value on `executor` into a new, stored future.
    ///
    /// A panicking `transform` leaves the result unfilled; use a task when
    /// failures must propagate.
    pub fn map_on<U, F>(
        &self,
        executor: &ExecutorRef,
        transform: F,
    ) -> Future<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let deferred = Deferred::new();
        let target = deferred.clone();
        self.upon_on(executor, move |value| {
            target.fill(transform(value));
        });
        deferred.future()
    }

    /// Chain another future on the shared background executor.
    #[inline]
    pub fn and_then<U, F>(
        &self,
        transform: F,
    ) -> Future<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> Future<U> + Send + 'static,
    {
        self.and_then_on(executor::shared(), transform)
    }

    /// Start another future from the value on `executor` and resolve to its
    /// value.
    pub fn and_then_on<U, F>(
        &self,
        executor: &ExecutorRef,
        transform: F,
    ) -> Future<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> Future<U> + Send + 'static,
    {
        let deferred = Deferred::new();
        let target = deferred.clone();
        self.upon_on(executor, move |value| {
            transform(value).upon_on(executor::immediate(), move |next| {
                target.fill(next);
            });
        });
        deferred.future()
    }

    /// Combine with another future; determined once both are.
    pub fn and<U>(
        &self,
        other: &Future<U>,
    ) -> Future<(T, U)>
    where
        U: Clone + Send + Sync + 'static,
    {
        let deferred = Deferred::new();
        let target = deferred.clone();
        let other = other.clone();
        self.upon_on(executor::immediate(), move |left| {
            other.upon_on(executor::immediate(), move |right| {
                target.fill((left, right));
            });
        });
        deferred.future()
    }
}

/// Lazy transform view produced by [`Future::every`].
pub struct Every<U, T> {
    upstream: Future<U>,
    transform: Arc<dyn Fn(U) -> T + Send + Sync>,
}

impl<U, T> Observable<T> for Every<U, T>
where
    U: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn upon_boxed(
        &self,
        executor: &ExecutorRef,
        body: Body<T>,
    ) {
        let transform = self.transform.clone();
        self.upstream
            .upon_on(executor, move |value| body(transform(value)));
    }

    fn peek(&self) -> Option<T> {
        self.upstream.peek().map(|value| (self.transform)(value))
    }

    fn is_filled(&self) -> bool {
        self.upstream.is_filled()
    }

    fn wait_deadline(
        &self,
        deadline: Option<Instant>,
    ) -> Option<T> {
        self.upstream
            .source
            .wait_deadline(deadline)
            .map(|value| (self.transform)(value))
    }
}
