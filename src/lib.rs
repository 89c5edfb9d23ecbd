//! Deferred values, futures and cancellable tasks
//!
//! Write-once values that arrive later, continuations that run on a chosen
//! executor, and tasks that compose with `map`, `flat_map`, `recover` and
//! `joined_tasks`.
//!
//! # Example
//!
//! ```
//! use deferred::{Task, TaskResult};
//! use std::time::Duration;
//!
//! let task = Task::spawn(|| Ok::<_, std::io::Error>(20))
//!     .map(|v| v + 1)
//!     .recover(|_| 0);
//!
//! let result = task.wait(Duration::from_secs(5));
//! assert!(matches!(result, Some(TaskResult::Success(21))));
//! ```
//!
//! # Layers
//!
//! - [`cell`]: lock-free write-once storage
//! - [`executor`]: where continuations run
//! - [`deferred`]: the writable [`Deferred`] and its read-only [`Future`]
//! - [`task`]: [`Task`], its combinators and [`joined_tasks`]

#![warn(rust_2018_idioms)]

pub mod cell;
pub mod deferred;
pub mod executor;
pub mod task;

// Utility modules
pub mod util;

// Re-exports
pub use cell::OnceCell;
pub use deferred::{all_filled, first_filled, Deferred, Every, Future, Observable, Timeout};
pub use executor::{
    install_shared, install_shared_executor, shared, Executor, ExecutorRef, ImmediateExecutor,
    PoolConfig, QueueExecutor, ThreadPool,
};
pub use task::{collected, joined_tasks, Cancellation, Task, TaskError, TaskErrorKind, TaskResult};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
