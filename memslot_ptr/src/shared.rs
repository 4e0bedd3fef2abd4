//! Reference-counted pointer with bitwise hand-off.
//!
//! A [`SharedPtr`] is a payload address plus a [`CounterHolder`]. The counter
//! tracks *owner slots*: live `SharedPtr` instances and byte images that were
//! sent but not yet received (or discarded).
//!
//! ```text
//!  SharedPtr ──┐                    ┌── SharedPtr (clone)
//!              ├──► payload (T)  ◄──┤
//!              └──► counter = 3  ◄──┴── image in a queue slot
//! ```
//!
//! ## Sending
//!
//! [`SharedPtr::send`] treats the outgoing image as a new, independent owner:
//! the count goes up and the sender keeps its own claim. This is the opposite
//! of [`ExclusivePtr::send`](crate::ExclusivePtr::send), which empties the
//! sender.
//!
//! ## Releasing
//!
//! Every release is one fetch-and-decrement. The context that takes the count
//! to zero frees the counter and the payload; every other context leaves both
//! alone. Concurrent final releases on an [`AtomicCounter`] are therefore safe.

use crate::counter::{AtomicCounter, Counter};
use crate::holder::CounterHolder;
use crate::image::{self, SHARED_IMAGE_LEN, SharedImage, Transferable};
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::ptr::{self, NonNull};
use tracing::{debug, trace};

/// Shared owner of a heap value.
///
/// `C` selects the counting strategy at compile time: [`AtomicCounter`]
/// (default) for use across threads, [`PlainCounter`](crate::PlainCounter)
/// for a single context.
#[repr(C)]
pub struct SharedPtr<T, C: Counter = AtomicCounter> {
    ptr: Option<NonNull<T>>,
    holder: CounterHolder<C>,
    _owns: PhantomData<T>,
}

// SAFETY: clones on other threads hand out `&T` and may drop `T`, the same
// requirements `Arc<T>` places on `T`; the counter must be shareable too.
unsafe impl<T: Send + Sync, C: Counter + Send + Sync> Send for SharedPtr<T, C> {}
unsafe impl<T: Send + Sync, C: Counter + Send + Sync> Sync for SharedPtr<T, C> {}

// SAFETY: two address-sized fields (`#[repr(C)]`), no padding.
unsafe impl<T, C: Counter> Transferable for SharedPtr<T, C> {
    type Image = SharedImage;
    const BLANK: SharedImage = [0; SHARED_IMAGE_LEN];
}

impl<T, C: Counter> SharedPtr<T, C> {
    /// Allocate `value` on the heap with a fresh counter of one.
    pub fn new(value: T) -> Self {
        Self::from_box(Box::new(value))
    }

    /// An empty pointer; no counter is allocated.
    pub const fn null() -> Self {
        Self {
            ptr: None,
            holder: CounterHolder::empty(),
            _owns: PhantomData,
        }
    }

    /// Adopt an existing allocation with a fresh counter of one.
    pub fn from_box(boxed: Box<T>) -> Self {
        Self {
            ptr: Some(NonNull::from(Box::leak(boxed))),
            holder: CounterHolder::new(),
            _owns: PhantomData,
        }
    }

    /// Adopt a raw pointer; null yields an empty instance without a counter.
    ///
    /// # Safety
    ///
    /// A non-null `raw` must come from [`Box::into_raw`] and must not be owned
    /// by anything else.
    pub unsafe fn from_raw(raw: *mut T) -> Self {
        match NonNull::new(raw) {
            Some(ptr) => Self {
                ptr: Some(ptr),
                holder: CounterHolder::new(),
                _owns: PhantomData,
            },
            None => Self::null(),
        }
    }

    /// Number of owner slots, `0` for an empty instance.
    #[inline]
    pub fn get_count(&self) -> usize {
        self.holder.count()
    }

    /// True when no payload is referenced.
    #[inline]
    pub fn is_null(&self) -> bool {
        self.ptr.is_none()
    }

    /// Borrow the payload.
    #[inline]
    pub fn get(&self) -> Option<&T> {
        // SAFETY: our owner slot keeps the payload alive while `self` is borrowed.
        self.ptr.map(|p| unsafe { &*p.as_ptr() })
    }

    /// Raw payload address, null when empty.
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        self.ptr.map_or(ptr::null(), |p| p.as_ptr().cast_const())
    }

    /// True when both pointers belong to the same owner group.
    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr && self.holder.same_counter(&other.holder)
    }

    /// Move into a new instance, leaving this one empty. The count is unchanged.
    #[inline]
    pub fn take(&mut self) -> Self {
        Self {
            ptr: self.ptr.take(),
            holder: self.holder.take(),
            _owns: PhantomData,
        }
    }

    /// Byte image of this pointer, for inspection only.
    ///
    /// No owner slot is created; use [`send`](Self::send) for that.
    pub fn image(&self) -> SharedImage {
        image::encode(self)
    }

    /// Publish a new owner slot into a transport slot.
    ///
    /// `copy` receives `dest` and this pointer's byte image and must write the
    /// image verbatim. On `true` the count has grown by one for the written
    /// image, and this instance remains an owner as well. On `false` the count
    /// is back where it was.
    ///
    /// The slot is reserved before `copy` runs, so a receiver that adopts and
    /// drops the image right away can never observe the sender's slot as the
    /// last one.
    pub fn send<D, F>(&self, dest: D, copy: F) -> bool
    where
        F: FnOnce(D, &[u8]) -> bool,
    {
        let image = image::encode(self);
        self.holder.acquire_detached();

        if !copy(dest, &image[..]) {
            self.holder.release_detached();
            trace!(payload = ?self.as_ptr(), "shared send refused by transport");
            return false;
        }

        trace!(image = ?image, count = self.get_count(), "shared send");
        true
    }

    /// Adopt an owner slot from a transport slot.
    ///
    /// `copy` receives a staging buffer of [`SHARED_IMAGE_LEN`] bytes and
    /// `source`, and must fill the buffer with one image. On `true` this
    /// instance releases its previous claim (freeing the old payload if that
    /// claim was the last) and takes over the staged payload and counter as
    /// they are; the count already includes the slot the sender reserved. On
    /// `false` nothing changes.
    ///
    /// # Safety
    ///
    /// When `copy` succeeds, the staged bytes must be an image written by a
    /// successful [`send`](Self::send) of a `SharedPtr<T, C>` in this
    /// process, and that image must not be received or discarded again.
    /// Adopting it on a thread other than the sender's requires
    /// `T: Send + Sync` and `C: Send + Sync`, the bounds under which
    /// `SharedPtr<T, C>` is itself `Send`. Images of a
    /// [`PlainCounter`](crate::PlainCounter) pointer must be adopted in the
    /// sending context.
    ///
    /// ```rust
    /// use memslot_ptr::{SHARED_IMAGE_LEN, SharedPtr, copy_from_slot, copy_to_slot};
    /// use std::thread;
    ///
    /// // Default counter is `AtomicCounter`.
    /// let origin: SharedPtr<String> = SharedPtr::new(String::from("fan-out"));
    /// let mut slot = [0u8; SHARED_IMAGE_LEN];
    /// assert!(origin.send(&mut slot[..], copy_to_slot));
    ///
    /// thread::spawn(move || {
    ///     let mut adopted: SharedPtr<String> = SharedPtr::null();
    ///     // SAFETY: one image sent above; `String` and `AtomicCounter` are
    ///     // both `Send + Sync`.
    ///     assert!(unsafe { adopted.receive(&slot[..], copy_from_slot) });
    ///     assert_eq!(adopted.as_str(), "fan-out");
    /// })
    /// .join()
    /// .unwrap();
    /// assert_eq!(origin.get_count(), 1);
    /// ```
    pub unsafe fn receive<S, F>(&mut self, source: S, copy: F) -> bool
    where
        F: FnOnce(&mut [u8], S) -> bool,
    {
        let mut staging = Self::BLANK;
        if !copy(&mut staging[..], source) {
            trace!("shared receive found nothing to adopt");
            return false;
        }

        // SAFETY: forwarded to the caller.
        let adopted = unsafe { Self::from_image(&staging) };
        self.cleanup();
        *self = adopted;
        trace!(payload = ?self.as_ptr(), count = self.get_count(), "shared receive");
        true
    }

    /// Rebuild the owner carried by an image.
    ///
    /// # Safety
    ///
    /// Same contract as [`receive`](Self::receive): `image` was produced by a
    /// successful `send` of a `SharedPtr<T, C>` in this process and is adopted
    /// at most once. Off the sender's thread, `T` and `C` must be
    /// `Send + Sync`.
    pub unsafe fn from_image(image: &SharedImage) -> Self {
        // SAFETY: forwarded to the caller.
        unsafe { image::decode(image) }
    }

    /// Release the owner slot carried by an image that will never be received.
    ///
    /// This is the rollback for a `send` whose image was lost or abandoned in
    /// the transport; without it the count never returns to zero and the
    /// payload leaks.
    ///
    /// # Safety
    ///
    /// Same contract as [`from_image`](Self::from_image), thread bounds
    /// included: releasing the slot may free `T` and the counter here.
    pub unsafe fn discard_image(image: &SharedImage) {
        // SAFETY: forwarded to the caller.
        let orphan = unsafe { Self::from_image(image) };
        debug!(
            payload = ?orphan.as_ptr(),
            count = orphan.get_count(),
            "discarding unreceived shared image"
        );
    }

    /// Drop this instance's claim, freeing payload and counter when it was the
    /// last one. Leaves `self` empty.
    fn cleanup(&mut self) {
        let payload = self.ptr.take();

        let last = if self.holder.is_empty() {
            // Every constructor pairs a payload with a counter. A bare payload
            // only arrives through an image that breaks the `receive`
            // contract; freeing it here is a fallback, not a supported state.
            debug_assert!(payload.is_none(), "SharedPtr payload without a counter");
            payload.is_some()
        } else {
            self.holder.release()
        };

        if let (true, Some(payload)) = (last, payload) {
            // SAFETY: the allocation came from a `Box` and no owner slot is left.
            drop(unsafe { Box::from_raw(payload.as_ptr()) });
        }
    }
}

impl<T, C: Counter> Default for SharedPtr<T, C> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T, C: Counter> From<Box<T>> for SharedPtr<T, C> {
    fn from(boxed: Box<T>) -> Self {
        Self::from_box(boxed)
    }
}

impl<T, C: Counter> Clone for SharedPtr<T, C> {
    fn clone(&self) -> Self {
        Self {
            ptr: self.ptr,
            holder: self.holder.clone(),
            _owns: PhantomData,
        }
    }

    /// Assigning from a pointer of the same group is a no-op; otherwise the old
    /// claim is released before the new one is taken.
    fn clone_from(&mut self, source: &Self) {
        if self.holder.same_counter(&source.holder) {
            return;
        }
        self.cleanup();
        self.ptr = source.ptr;
        self.holder = source.holder.clone();
    }
}

impl<T, C: Counter> Deref for SharedPtr<T, C> {
    type Target = T;

    fn deref(&self) -> &T {
        self.get().expect("dereferenced an empty SharedPtr")
    }
}

impl<T, C: Counter> Drop for SharedPtr<T, C> {
    fn drop(&mut self) {
        self.cleanup();
    }
}

impl<T: fmt::Debug, C: Counter> fmt::Debug for SharedPtr<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedPtr")
            .field("value", &self.get())
            .field("count", &self.get_count())
            .finish()
    }
}
