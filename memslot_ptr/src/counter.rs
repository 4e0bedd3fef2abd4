//! Owner counters for [`SharedPtr`](crate::SharedPtr).
//!
//! The counting strategy is picked once per pointer type through the `C`
//! parameter, never at runtime:
//!
//! - [`PlainCounter`] – `Cell` backed, single context only (`!Sync`).
//! - [`AtomicCounter`] – `AtomicUsize` backed, safe to share across threads
//!   and interrupt contexts.
//!
//! Counters only count. Freeing the counter or the payload is decided by the
//! caller from the value returned by [`Counter::decrement`].

use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering, fence};

/// Counting strategy used by a shared pointer group.
pub trait Counter {
    /// Create a counter holding a single owner slot.
    fn new() -> Self;

    /// Register one more owner slot.
    fn increment(&self);

    /// Remove one owner slot and return the count left behind.
    ///
    /// A return value of `0` means the caller removed the last slot and is
    /// the only context allowed to free what the counter guards.
    fn decrement(&self) -> usize;

    /// Current number of owner slots.
    fn value(&self) -> usize;
}

/// Unsynchronized counter for single-context use.
#[derive(Debug)]
pub struct PlainCounter {
    count: Cell<usize>,
}

impl Counter for PlainCounter {
    #[inline]
    fn new() -> Self {
        Self {
            count: Cell::new(1),
        }
    }

    #[inline]
    fn increment(&self) {
        self.count.set(self.count.get() + 1);
    }

    #[inline]
    fn decrement(&self) -> usize {
        let next = self.count.get() - 1;
        self.count.set(next);
        next
    }

    #[inline]
    fn value(&self) -> usize {
        self.count.get()
    }
}

/// Synchronized counter.
///
/// Increments are `Relaxed`: a new slot can only be created from an existing
/// one, so no ordering is needed. Decrements are `Release`, and the context
/// that takes the count to zero issues an `Acquire` fence so every prior use
/// of the payload happens-before it is freed.
#[derive(Debug)]
pub struct AtomicCounter {
    count: AtomicUsize,
}

impl Counter for AtomicCounter {
    #[inline]
    fn new() -> Self {
        Self {
            count: AtomicUsize::new(1),
        }
    }

    #[inline]
    fn increment(&self) {
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn decrement(&self) -> usize {
        let previous = self.count.fetch_sub(1, Ordering::Release);
        debug_assert!(previous > 0, "owner counter underflow");
        if previous == 1 {
            fence(Ordering::Acquire);
        }
        previous - 1
    }

    #[inline]
    fn value(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }
}
