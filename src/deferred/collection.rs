//! Combining many futures into one

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{Deferred, Future};
use crate::executor;

/// A future of every input's value, in input order.
///
/// Determined once all inputs are; an empty input is determined immediately
/// with an empty vector.
pub fn all_filled<T, I>(futures: I) -> Future<Vec<T>>
where
    T: Clone + Send + Sync + 'static,
    I: IntoIterator<Item = Future<T>>,
{
    let futures: Vec<Future<T>> = futures.into_iter().collect();
    if futures.is_empty() {
        return Future::filled(Vec::new());
    }

    let deferred = Deferred::new();
    let slots: Arc<Mutex<Vec<Option<T>>>> = Arc::new(Mutex::new(vec![None; futures.len()]));
    let remaining = Arc::new(AtomicUsize::new(futures.len()));

    for (index, future) in futures.iter().enumerate() {
        let target = deferred.clone();
        let slots = slots.clone();
        let remaining = remaining.clone();
        future.upon_on(executor::immediate(), move |value| {
            slots.lock()[index] = Some(value);
            if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                let values: Option<Vec<T>> = slots.lock().iter_mut().map(Option::take).collect();
                if let Some(values) = values {
                    target.fill(values);
                }
            }
        });
    }

    deferred.future()
}

/// A future of whichever input is determined first.
///
/// An empty input is never determined.
pub fn first_filled<T, I>(futures: I) -> Future<T>
where
    T: Clone + Send + Sync + 'static,
    I: IntoIterator<Item = Future<T>>,
{
    let deferred = Deferred::new();
    for future in futures {
        let target = deferred.clone();
        future.upon_on(executor::immediate(), move |value| {
            target.fill(value);
        });
    }
    deferred.future()
}
