//! Task outcomes
//!
//! A task ends in exactly one of two ways: [`TaskResult::Success`] or
//! [`TaskResult::Failure`]. There is no separate "cancelled" outcome; a
//! cancelled operation reports whatever it ends up producing.

use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// What kind of failure a [`TaskError`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskErrorKind {
    /// An error value produced by user code.
    Error,
    /// User code panicked; the panic was caught.
    Panicked,
    /// A free-form message.
    Message,
}

enum Repr {
    Error(Box<dyn StdError + Send + Sync + 'static>),
    Panicked(String),
    Message(String),
}

/// The error half of a [`TaskResult`].
///
/// Cheap to clone so a single failure can reach any number of observers.
/// Any `std::error::Error + Send + Sync + 'static` converts into it with `?`
/// or `.into()`.
#[derive(Clone)]
pub struct TaskError {
    repr: Arc<Repr>,
}

impl TaskError {
    /// Wrap an error value.
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::from_boxed(Box::new(error))
    }

    /// Wrap an already boxed error.
    pub fn from_boxed(error: Box<dyn StdError + Send + Sync + 'static>) -> Self {
        Self {
            repr: Arc::new(Repr::Error(error)),
        }
    }

    /// Wrap an `anyhow::Error`.
    pub fn from_anyhow(error: anyhow::Error) -> Self {
        Self::from_boxed(error.into())
    }

    /// An error with only a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self {
            repr: Arc::new(Repr::Message(message.into())),
        }
    }

    /// Convert a caught panic payload.
    pub fn from_panic(payload: Box<dyn Any + Send + 'static>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self {
            repr: Arc::new(Repr::Panicked(message)),
        }
    }

    /// The failure kind.
    pub fn kind(&self) -> TaskErrorKind {
        match &*self.repr {
            Repr::Error(_) => TaskErrorKind::Error,
            Repr::Panicked(_) => TaskErrorKind::Panicked,
            Repr::Message(_) => TaskErrorKind::Message,
        }
    }

    /// Whether this error came from a caught panic.
    #[inline]
    pub fn is_panic(&self) -> bool {
        self.kind() == TaskErrorKind::Panicked
    }

    /// Borrow the wrapped error as a concrete type.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        match &*self.repr {
            Repr::Error(error) => error.downcast_ref::<E>(),
            _ => None,
        }
    }

    /// Check whether the wrapped error is an `E`.
    #[inline]
    pub fn is<E>(&self) -> bool
    where
        E: StdError + 'static,
    {
        self.downcast_ref::<E>().is_some()
    }

    /// The underlying error's own source, if any.
    pub fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match &*self.repr {
            Repr::Error(error) => error.source(),
            _ => None,
        }
    }

    /// Whether two handles refer to the same failure.
    #[inline]
    pub fn ptr_eq(
        &self,
        other: &TaskError,
    ) -> bool {
        Arc::ptr_eq(&self.repr, &other.repr)
    }
}

impl<E> From<E> for TaskError
where
    E: StdError + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self::new(error)
    }
}

impl fmt::Display for TaskError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match &*self.repr {
            Repr::Error(error) => fmt::Display::fmt(error, f),
            Repr::Panicked(message) => write!(f, "task panicked: {}", message),
            Repr::Message(message) => f.write_str(message),
        }
    }
}

impl fmt::Debug for TaskError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match &*self.repr {
            Repr::Error(error) => f.debug_tuple("TaskError").field(error).finish(),
            Repr::Panicked(message) => f.debug_tuple("Panicked").field(message).finish(),
            Repr::Message(message) => f.debug_tuple("TaskError").field(message).finish(),
        }
    }
}

impl From<TaskError> for Box<dyn StdError + Send + Sync + 'static> {
    fn from(error: TaskError) -> Self {
        Box::new(SharedError(error))
    }
}

/// Adapter so a [`TaskError`] can sit in a `std::error::Error` chain.
#[derive(Debug)]
struct SharedError(TaskError);

impl fmt::Display for SharedError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl StdError for SharedError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.0.source()
    }
}

/// Outcome of a task.
#[derive(Debug, Clone)]
pub enum TaskResult<V> {
    /// The task produced a value.
    Success(V),
    /// The task failed.
    Failure(TaskError),
}

impl<V> TaskResult<V> {
    /// Run `body`, converting an `Err` or a panic into `Failure`.
    pub fn catching<E, F>(body: F) -> Self
    where
        F: FnOnce() -> Result<V, E>,
        E: Into<TaskError>,
    {
        match panic::catch_unwind(AssertUnwindSafe(body)) {
            Ok(Ok(value)) => TaskResult::Success(value),
            Ok(Err(error)) => TaskResult::Failure(error.into()),
            Err(payload) => TaskResult::Failure(TaskError::from_panic(payload)),
        }
    }

    /// Check for `Success`.
    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, TaskResult::Success(_))
    }

    /// Check for `Failure`.
    #[inline]
    pub fn is_failure(&self) -> bool {
        matches!(self, TaskResult::Failure(_))
    }

    /// Borrow the success value.
    #[inline]
    pub fn value(&self) -> Option<&V> {
        match self {
            TaskResult::Success(value) => Some(value),
            TaskResult::Failure(_) => None,
        }
    }

    /// Borrow the failure.
    #[inline]
    pub fn error(&self) -> Option<&TaskError> {
        match self {
            TaskResult::Success(_) => None,
            TaskResult::Failure(error) => Some(error),
        }
    }

    /// Convert into a standard `Result`.
    #[inline]
    pub fn into_result(self) -> Result<V, TaskError> {
        match self {
            TaskResult::Success(value) => Ok(value),
            TaskResult::Failure(error) => Err(error),
        }
    }

    /// Transform the success value.
    pub fn map<W, F>(
        self,
        transform: F,
    ) -> TaskResult<W>
    where
        F: FnOnce(V) -> W,
    {
        match self {
            TaskResult::Success(value) => TaskResult::Success(transform(value)),
            TaskResult::Failure(error) => TaskResult::Failure(error),
        }
    }

    /// Chain another fallible step on success.
    pub fn and_then<W, F>(
        self,
        transform: F,
    ) -> TaskResult<W>
    where
        F: FnOnce(V) -> TaskResult<W>,
    {
        match self {
            TaskResult::Success(value) => transform(value),
            TaskResult::Failure(error) => TaskResult::Failure(error),
        }
    }
}

impl<V, E> From<Result<V, E>> for TaskResult<V>
where
    E: Into<TaskError>,
{
    fn from(result: Result<V, E>) -> Self {
        match result {
            Ok(value) => TaskResult::Success(value),
            Err(error) => TaskResult::Failure(error.into()),
        }
    }
}

impl<V> From<TaskResult<V>> for Result<V, TaskError> {
    fn from(result: TaskResult<V>) -> Self {
        result.into_result()
    }
}
