//! RAII handle on a heap-allocated [`Counter`].

use crate::counter::Counter;
use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;

/// Reference to a shared owner counter.
///
/// Cloning shares the counter and adds an owner slot; moving hands the slot
/// over unchanged. Dropping removes the slot and frees the counter once the
/// last slot is gone. The holder never touches the payload the counter guards.
#[repr(transparent)]
pub struct CounterHolder<C: Counter> {
    counter: Option<NonNull<C>>,
    _owns: PhantomData<Box<C>>,
}

// SAFETY: a holder only reaches its counter through `&C`, so it may move or be
// shared across threads exactly when the counter itself is `Send + Sync`.
unsafe impl<C: Counter + Send + Sync> Send for CounterHolder<C> {}
unsafe impl<C: Counter + Send + Sync> Sync for CounterHolder<C> {}

impl<C: Counter> CounterHolder<C> {
    /// Allocate a fresh counter with a single owner slot.
    pub fn new() -> Self {
        let counter = NonNull::from(Box::leak(Box::new(C::new())));
        Self {
            counter: Some(counter),
            _owns: PhantomData,
        }
    }

    /// A holder that references no counter.
    pub const fn empty() -> Self {
        Self {
            counter: None,
            _owns: PhantomData,
        }
    }

    /// True when no counter is referenced.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.counter.is_none()
    }

    /// Owner slots on the referenced counter, `0` when empty.
    #[inline]
    pub fn count(&self) -> usize {
        self.get().map_or(0, |counter| counter.value())
    }

    /// True when both holders reference the same counter (or both are empty).
    #[inline]
    pub fn same_counter(&self, other: &Self) -> bool {
        self.counter == other.counter
    }

    /// Move the counter reference out, leaving this holder empty.
    #[inline]
    pub fn take(&mut self) -> Self {
        Self {
            counter: self.counter.take(),
            _owns: PhantomData,
        }
    }

    /// Drop this holder's owner slot now.
    ///
    /// Returns `true` when the slot was the last one; the counter has then
    /// been freed and the caller is responsible for whatever it guarded.
    pub fn release(&mut self) -> bool {
        let Some(counter) = self.counter.take() else {
            return false;
        };

        // SAFETY: the slot being released keeps the counter alive until here.
        let remaining = unsafe { counter.as_ref() }.decrement();
        if remaining == 0 {
            // SAFETY: zero slots remain, nobody else can reach the counter.
            drop(unsafe { Box::from_raw(counter.as_ptr()) });
            true
        } else {
            false
        }
    }

    /// Add an owner slot that is not represented by a holder instance.
    pub(crate) fn acquire_detached(&self) {
        if let Some(counter) = self.get() {
            counter.increment();
        }
    }

    /// Undo [`acquire_detached`](Self::acquire_detached).
    ///
    /// Must only be called while this holder still owns its own slot, so the
    /// count cannot reach zero here.
    pub(crate) fn release_detached(&self) {
        if let Some(counter) = self.get() {
            let remaining = counter.decrement();
            debug_assert!(remaining > 0, "detached release freed a live counter");
        }
    }

    #[inline]
    fn get(&self) -> Option<&C> {
        // SAFETY: a non-empty holder owns a slot, so the counter is live.
        self.counter.map(|counter| unsafe { &*counter.as_ptr() })
    }
}

impl<C: Counter> Default for CounterHolder<C> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<C: Counter> Clone for CounterHolder<C> {
    fn clone(&self) -> Self {
        self.acquire_detached();
        Self {
            counter: self.counter,
            _owns: PhantomData,
        }
    }

    fn clone_from(&mut self, source: &Self) {
        if self.same_counter(source) {
            return;
        }
        self.release();
        *self = source.clone();
    }
}

impl<C: Counter> Drop for CounterHolder<C> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<C: Counter> fmt::Debug for CounterHolder<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CounterHolder")
            .field("counter", &self.counter)
            .field("count", &self.count())
            .finish()
    }
}
