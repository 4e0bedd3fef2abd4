//! Single-owner pointer with bitwise hand-off.

use crate::image::{self, EXCLUSIVE_IMAGE_LEN, ExclusiveImage, Transferable};
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::ptr::{self, NonNull};
use tracing::{debug, trace};

/// Sole owner of a heap value.
///
/// Move-only: there is no `Clone`. Besides ordinary moves, ownership can leave
/// through [`send`](Self::send), which writes the pointer's byte image into a
/// transport slot and empties the sender, and come back through
/// [`receive`](Self::receive) on any instance, possibly in another context.
///
/// An `ExclusivePtr` is exactly one address wide.
#[repr(transparent)]
pub struct ExclusivePtr<T> {
    ptr: Option<NonNull<T>>,
    _owns: PhantomData<T>,
}

// SAFETY: the pointer owns its payload like a `Box<T>`.
unsafe impl<T: Send> Send for ExclusivePtr<T> {}
unsafe impl<T: Sync> Sync for ExclusivePtr<T> {}

// SAFETY: a single `Option<NonNull<T>>`, no padding.
unsafe impl<T> Transferable for ExclusivePtr<T> {
    type Image = ExclusiveImage;
    const BLANK: ExclusiveImage = [0; EXCLUSIVE_IMAGE_LEN];
}

impl<T> ExclusivePtr<T> {
    /// Allocate `value` on the heap and own it.
    pub fn new(value: T) -> Self {
        Self::from_box(Box::new(value))
    }

    /// An empty pointer.
    pub const fn null() -> Self {
        Self {
            ptr: None,
            _owns: PhantomData,
        }
    }

    /// Adopt an existing allocation.
    pub fn from_box(boxed: Box<T>) -> Self {
        Self {
            ptr: Some(NonNull::from(Box::leak(boxed))),
            _owns: PhantomData,
        }
    }

    /// Adopt a raw pointer; null yields an empty instance.
    ///
    /// # Safety
    ///
    /// A non-null `raw` must come from [`Box::into_raw`] (or
    /// [`into_raw`](Self::into_raw)) and must not be owned by anything else.
    pub unsafe fn from_raw(raw: *mut T) -> Self {
        Self {
            ptr: NonNull::new(raw),
            _owns: PhantomData,
        }
    }

    /// True when a payload is owned.
    #[inline]
    pub fn is_some(&self) -> bool {
        self.ptr.is_some()
    }

    /// True when no payload is owned.
    #[inline]
    pub fn is_null(&self) -> bool {
        self.ptr.is_none()
    }

    /// Borrow the payload.
    #[inline]
    pub fn get(&self) -> Option<&T> {
        // SAFETY: an owned payload stays valid for as long as `self` is borrowed.
        self.ptr.map(|p| unsafe { &*p.as_ptr() })
    }

    /// Mutably borrow the payload.
    #[inline]
    pub fn get_mut(&mut self) -> Option<&mut T> {
        // SAFETY: `&mut self` guarantees exclusive access to the payload.
        self.ptr.map(|p| unsafe { &mut *p.as_ptr() })
    }

    /// Raw payload address, null when empty. Ownership is not affected.
    #[inline]
    pub fn as_ptr(&self) -> *mut T {
        self.ptr.map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    /// Give up ownership without destroying the payload.
    pub fn release(&mut self) -> Option<Box<T>> {
        // SAFETY: the allocation came from a `Box` and is owned by `self` only.
        self.ptr.take().map(|p| unsafe { Box::from_raw(p.as_ptr()) })
    }

    /// Give up ownership as a raw pointer (null when empty).
    pub fn into_raw(mut self) -> *mut T {
        self.release().map_or(ptr::null_mut(), Box::into_raw)
    }

    /// Destroy the current payload, if any, and adopt `boxed`.
    pub fn reset(&mut self, boxed: Option<Box<T>>) {
        drop(self.release());
        self.ptr = boxed.map(|b| NonNull::from(Box::leak(b)));
    }

    /// Move the payload out into a new instance, leaving this one empty.
    #[inline]
    pub fn take(&mut self) -> Self {
        Self {
            ptr: self.ptr.take(),
            _owns: PhantomData,
        }
    }

    /// Byte image of this pointer, for inspection only.
    ///
    /// Ownership does not move; use [`send`](Self::send) to hand it off.
    pub fn image(&self) -> ExclusiveImage {
        image::encode(self)
    }

    /// Hand ownership to a transport slot.
    ///
    /// `copy` receives `dest` and this pointer's byte image and must write the
    /// image verbatim. On `true` the payload now belongs to the written image
    /// and this instance is empty; the payload is not dropped. On `false`
    /// nothing changes.
    pub fn send<D, F>(&mut self, dest: D, copy: F) -> bool
    where
        F: FnOnce(D, &[u8]) -> bool,
    {
        let image = image::encode(&*self);
        if !copy(dest, &image[..]) {
            trace!(payload = ?self.as_ptr(), "exclusive send refused by transport");
            return false;
        }

        // The image owns the payload now; forget it without dropping.
        self.ptr = None;
        trace!(image = ?image, "exclusive send");
        true
    }

    /// Adopt ownership from a transport slot.
    ///
    /// `copy` receives a staging buffer of [`EXCLUSIVE_IMAGE_LEN`] bytes and
    /// `source`, and must fill the buffer with one image. On `true` the payload
    /// previously owned here is dropped and this instance takes over the
    /// staged image. On `false` nothing changes.
    ///
    /// # Safety
    ///
    /// When `copy` succeeds, the staged bytes must be an image written by a
    /// successful [`send`](Self::send) of an `ExclusivePtr<T>` in this
    /// process, and that image must not be received or discarded again.
    /// When the image was sent from another thread, `T` must be `Send`.
    ///
    /// ```rust
    /// use memslot_ptr::{EXCLUSIVE_IMAGE_LEN, ExclusivePtr, copy_from_slot, copy_to_slot};
    /// use std::thread;
    ///
    /// let mut sender = ExclusivePtr::new(String::from("hand-off"));
    /// let mut slot = [0u8; EXCLUSIVE_IMAGE_LEN];
    /// assert!(sender.send(&mut slot[..], copy_to_slot));
    ///
    /// let adopted = thread::spawn(move || {
    ///     let mut receiver: ExclusivePtr<String> = ExclusivePtr::null();
    ///     // SAFETY: `slot` holds the one image sent above and `String: Send`.
    ///     assert!(unsafe { receiver.receive(&slot[..], copy_from_slot) });
    ///     receiver.release()
    /// })
    /// .join()
    /// .unwrap();
    /// assert_eq!(adopted.map(|boxed| *boxed), Some(String::from("hand-off")));
    /// ```
    pub unsafe fn receive<S, F>(&mut self, source: S, copy: F) -> bool
    where
        F: FnOnce(&mut [u8], S) -> bool,
    {
        let mut staging = Self::BLANK;
        if !copy(&mut staging[..], source) {
            trace!("exclusive receive found nothing to adopt");
            return false;
        }

        // SAFETY: forwarded to the caller.
        *self = unsafe { Self::from_image(&staging) };
        trace!(payload = ?self.as_ptr(), "exclusive receive");
        true
    }

    /// Rebuild the owner carried by an image.
    ///
    /// # Safety
    ///
    /// Same contract as [`receive`](Self::receive): `image` was produced by a
    /// successful `send` of an `ExclusivePtr<T>` in this process and is
    /// adopted at most once, and `T: Send` if this runs on a thread other than
    /// the sender's.
    pub unsafe fn from_image(image: &ExclusiveImage) -> Self {
        // SAFETY: forwarded to the caller.
        unsafe { image::decode(image) }
    }

    /// Destroy the payload carried by an image that will never be received.
    ///
    /// # Safety
    ///
    /// Same contract as [`from_image`](Self::from_image), including
    /// `T: Send` when the payload is dropped on a thread other than the
    /// sender's.
    pub unsafe fn discard_image(image: &ExclusiveImage) {
        // SAFETY: forwarded to the caller.
        let orphan = unsafe { Self::from_image(image) };
        debug!(payload = ?orphan.as_ptr(), "discarding unreceived exclusive image");
    }
}

impl<T> Default for ExclusivePtr<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> From<Box<T>> for ExclusivePtr<T> {
    fn from(boxed: Box<T>) -> Self {
        Self::from_box(boxed)
    }
}

impl<T> Deref for ExclusivePtr<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.get().expect("dereferenced an empty ExclusivePtr")
    }
}

impl<T> DerefMut for ExclusivePtr<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.get_mut().expect("dereferenced an empty ExclusivePtr")
    }
}

impl<T> Drop for ExclusivePtr<T> {
    fn drop(&mut self) {
        drop(self.release());
    }
}

impl<T: fmt::Debug> fmt::Debug for ExclusivePtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ExclusivePtr").field(&self.get()).finish()
    }
}
