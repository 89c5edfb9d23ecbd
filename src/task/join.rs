//! Joining many tasks into one

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::cancel::{self, Cancellation};
use super::{Task, TaskResult};
use crate::deferred::Deferred;
use crate::executor;

/// Cancel every member, in input order.
fn cancel_all(cancellations: Vec<Cancellation>) -> Cancellation {
    Arc::new(move || {
        for cancellation in &cancellations {
            cancel::invoke(cancellation);
        }
    })
}

/// A task that succeeds once every input has succeeded.
///
/// The first failure to be observed wins and fails the joined task
/// immediately, without waiting for the rest. An empty input has already
/// succeeded. Cancelling the joined task cancels each input in order.
pub fn joined_tasks<V, I>(tasks: I) -> Task<()>
where
    V: Clone + Send + Sync + 'static,
    I: IntoIterator<Item = Task<V>>,
{
    let tasks: Vec<Task<V>> = tasks.into_iter().collect();
    if tasks.is_empty() {
        return Task::succeeded(());
    }

    debug!(count = tasks.len(), "joining tasks");
    let deferred = Deferred::new();
    let remaining = Arc::new(AtomicUsize::new(tasks.len()));

    for task in &tasks {
        let target = deferred.clone();
        let remaining = remaining.clone();
        task.future.upon_on(executor::immediate(), move |result| match result {
            TaskResult::Success(_) => {
                if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    target.fill(TaskResult::Success(()));
                }
            },
            // A failure fills the joined cell, so its share of the counter
            // can never complete the join and is left in place.
            TaskResult::Failure(error) => {
                target.fill(TaskResult::Failure(error));
            },
        });
    }

    let cancellations = tasks.iter().map(|task| task.cancellation.clone()).collect();
    Task::with_cancellation(deferred.future(), cancel_all(cancellations))
}

/// A task of every input's value, in input order.
///
/// Fails like [`joined_tasks`]; an empty input succeeds with an empty vector.
pub fn collected<V, I>(tasks: I) -> Task<Vec<V>>
where
    V: Clone + Send + Sync + 'static,
    I: IntoIterator<Item = Task<V>>,
{
    let tasks: Vec<Task<V>> = tasks.into_iter().collect();
    if tasks.is_empty() {
        return Task::succeeded(Vec::new());
    }

    let deferred = Deferred::new();
    let slots: Arc<Mutex<Vec<Option<V>>>> = Arc::new(Mutex::new(vec![None; tasks.len()]));
    let remaining = Arc::new(AtomicUsize::new(tasks.len()));

    for (index, task) in tasks.iter().enumerate() {
        let target = deferred.clone();
        let slots = slots.clone();
        let remaining = remaining.clone();
        task.future.upon_on(executor::immediate(), move |result| match result {
            TaskResult::Success(value) => {
                slots.lock()[index] = Some(value);
                if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    let values: Option<Vec<V>> = slots.lock().iter_mut().map(Option::take).collect();
                    if let Some(values) = values {
                        target.fill(TaskResult::Success(values));
                    }
                }
            },
            // A failure fills the joined cell, so its share of the counter
            // can never complete the join and is left in place.
            TaskResult::Failure(error) => {
                target.fill(TaskResult::Failure(error));
            },
        });
    }

    let cancellations = tasks.iter().map(|task| task.cancellation.clone()).collect();
    Task::with_cancellation(deferred.future(), cancel_all(cancellations))
}
