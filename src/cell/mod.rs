//! Atomic write-once storage
//!
//! [`OnceCell`] is the slot behind every deferred value. It holds a single
//! pointer-sized word that starts out null and is swapped, exactly once, for
//! a pointer to a heap-allocated value.
//!
//! # Memory ordering
//!
//! ```text
//! writer:  Box::into_raw(value) ── CAS(null → ptr, AcqRel) ──┐
//!                                                            │ happens-before
//! reader:  load(Acquire) ── &*ptr ◄──────────────────────────┘
//! ```
//!
//! Readers never take a lock and never observe a partially constructed value:
//! the value is fully built before it is published by the release half of
//! the CAS, and a reader only dereferences after an acquire load.

use std::fmt;
use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

/// A lock-free cell that can be written at most once.
pub struct OnceCell<T> {
    /// Null while empty, otherwise a pointer obtained from `Box::into_raw`.
    slot: AtomicPtr<T>,
    /// The cell owns a `T` once filled.
    _owns: PhantomData<Box<T>>,
}

// SAFETY: the cell hands out `&T` to any thread that can reach it, and the
// stored value is dropped on whichever thread drops the cell.
unsafe impl<T: Send + Sync> Sync for OnceCell<T> {}
unsafe impl<T: Send> Send for OnceCell<T> {}

impl<T> OnceCell<T> {
    /// Create an empty cell.
    #[inline]
    pub const fn new() -> Self {
        Self {
            slot: AtomicPtr::new(ptr::null_mut()),
            _owns: PhantomData,
        }
    }

    /// Create a cell that already holds `value`.
    #[inline]
    pub fn filled(value: T) -> Self {
        Self {
            slot: AtomicPtr::new(Box::into_raw(Box::new(value))),
            _owns: PhantomData,
        }
    }

    /// Attempt to store `value`.
    ///
    /// Returns `true` iff this call won the race and the cell now holds
    /// `value`. A losing value is dropped before returning.
    pub fn try_fill(
        &self,
        value: T,
    ) -> bool {
        // Cheap pre-check so the common "already filled" path does not allocate.
        if self.is_filled() {
            return false;
        }

        let candidate = Box::into_raw(Box::new(value));
        match self.slot.compare_exchange(
            ptr::null_mut(),
            candidate,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => true,
            Err(_) => {
                // SAFETY: `candidate` came from `Box::into_raw` above and was
                // never published, so this thread still owns it.
                drop(unsafe { Box::from_raw(candidate) });
                false
            },
        }
    }

    /// Read the value if one has been stored.
    #[inline]
    pub fn peek(&self) -> Option<&T> {
        let current = self.slot.load(Ordering::Acquire);
        // SAFETY: a non-null pointer was published by a winning `try_fill`
        // (or `filled`) and is never replaced or freed while `self` lives.
        unsafe { current.as_ref() }
    }

    /// Whether a value has been stored.
    #[inline]
    pub fn is_filled(&self) -> bool {
        !self.slot.load(Ordering::Acquire).is_null()
    }

    /// Consume the cell and return its value, if any.
    pub fn into_inner(self) -> Option<T> {
        let current = self.slot.swap(ptr::null_mut(), Ordering::Acquire);
        // `self` is dropped below with a null slot, so nothing is freed twice.
        if current.is_null() {
            None
        } else {
            // SAFETY: we hold the cell by value and took the pointer out of it.
            Some(*unsafe { Box::from_raw(current) })
        }
    }
}

impl<T> Default for OnceCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for OnceCell<T> {
    fn drop(&mut self) {
        let current = *self.slot.get_mut();
        if !current.is_null() {
            // SAFETY: exclusive access through `&mut self`; the pointer came
            // from `Box::into_raw` and is released exactly once here.
            drop(unsafe { Box::from_raw(current) });
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for OnceCell<T> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self.peek() {
            Some(value) => f.debug_tuple("OnceCell").field(value).finish(),
            None => f.write_str("OnceCell(<empty>)"),
        }
    }
}

impl<T> From<T> for OnceCell<T> {
    fn from(value: T) -> Self {
        Self::filled(value)
    }
}
