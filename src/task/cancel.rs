//! Cancellation handles
//!
//! Cancellation is a best-effort request. Invoking it never blocks the
//! caller on the task, never unwinds into the caller, and may happen any
//! number of times.

use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{trace, warn};

/// A shared cancellation callback.
pub type Cancellation = Arc<dyn Fn() + Send + Sync + 'static>;

/// A cancellation that does nothing.
pub fn noop() -> Cancellation {
    Arc::new(|| {})
}

/// Invoke `cancellation`, swallowing any panic it raises.
pub(crate) fn invoke(cancellation: &Cancellation) {
    if panic::catch_unwind(AssertUnwindSafe(|| cancellation())).is_err() {
        warn!("cancellation callback panicked");
    }
}

struct SlotState {
    current: Cancellation,
    requested: bool,
}

/// The "currently active" cancellation of a chained task.
///
/// A chain starts out cancelling its source; once a follow-up task exists,
/// [`CancellationSlot::replace`] points the slot at it. A request that
/// arrived earlier is forwarded to the new occupant as well, so the active
/// stage of the chain always hears about it.
pub(crate) struct CancellationSlot {
    state: Mutex<SlotState>,
}

impl CancellationSlot {
    pub(crate) fn new(initial: Cancellation) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SlotState {
                current: initial,
                requested: false,
            }),
        })
    }

    /// Record the request and invoke the current occupant.
    pub(crate) fn cancel(&self) {
        let current = {
            let mut state = self.state.lock();
            state.requested = true;
            state.current.clone()
        };
        trace!("forwarding cancellation to active stage");
        invoke(&current);
    }

    /// Install `next` as the occupant.
    pub(crate) fn replace(
        &self,
        next: Cancellation,
    ) {
        let requested = {
            let mut state = self.state.lock();
            state.current = next.clone();
            state.requested
        };
        if requested {
            trace!("cancellation requested before stage started");
            invoke(&next);
        }
    }

    /// Drop the occupant once the chain is determined.
    ///
    /// Nested chains link their slots through these handles; releasing them
    /// as each stage completes keeps a long chain from being torn down
    /// recursively.
    pub(crate) fn release(&self) {
        let previous = mem::replace(&mut self.state.lock().current, noop());
        drop(previous);
    }

    /// Whether cancel has been called.
    pub(crate) fn is_requested(&self) -> bool {
        self.state.lock().requested
    }

    /// A cancellation handle that routes through this slot.
    pub(crate) fn handle(self: &Arc<Self>) -> Cancellation {
        let slot = self.clone();
        Arc::new(move || slot.cancel())
    }
}
