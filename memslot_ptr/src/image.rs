//! Byte images of pointer instances.
//!
//! This is the only place where a pointer's memory is reinterpreted as bytes
//! or rebuilt from bytes. An image is the complete in-memory representation of
//! one pointer: the payload address and, for shared pointers, the counter
//! address. Images carry ownership. Writing one into a slot transfers an owner
//! slot into the slot, and rebuilding a pointer from it takes that owner slot
//! back out.
//!
//! ## Validity
//!
//! An image is only meaningful inside the address space (and allocator) that
//! produced it. Rebuilding a pointer from an image is therefore `unsafe`: the
//! caller vouches that the bytes came from a successful `send` of the same
//! pointer type, in the same process, and that they are adopted at most once.
//!
//! The bytes themselves are `Send`, but what they own is not always. Adopting
//! an image on a thread other than the sender's moves the owner across
//! threads, so the caller must also uphold the pointer's own thread bounds:
//!
//! - `ExclusivePtr<T>` requires `T: Send`.
//! - `SharedPtr<T, C>` requires `T: Send + Sync` and `C: Send + Sync`, which
//!   rules out `PlainCounter`. Its images must be adopted in the sending
//!   context.
//!
//! ## Copy helpers
//!
//! [`copy_to_slot`] and [`copy_from_slot`] are `memcpy`-style transport
//! callbacks over plain byte slots. They return `false` instead of panicking
//! when the slot is too small.

use std::mem;
use std::ptr;

use static_assertions::const_assert_eq;

use crate::counter::{AtomicCounter, PlainCounter};
use crate::{ExclusivePtr, SharedPtr};

/// Byte length of an [`ExclusivePtr`] image: one payload address.
pub const EXCLUSIVE_IMAGE_LEN: usize = mem::size_of::<usize>();

/// Byte length of a [`SharedPtr`] image: payload address plus counter address.
pub const SHARED_IMAGE_LEN: usize = 2 * mem::size_of::<usize>();

/// Byte image of an [`ExclusivePtr`].
pub type ExclusiveImage = [u8; EXCLUSIVE_IMAGE_LEN];

/// Byte image of a [`SharedPtr`].
pub type SharedImage = [u8; SHARED_IMAGE_LEN];

const_assert_eq!(mem::size_of::<ExclusivePtr<u8>>(), EXCLUSIVE_IMAGE_LEN);
const_assert_eq!(mem::size_of::<ExclusivePtr<[u64; 64]>>(), EXCLUSIVE_IMAGE_LEN);
const_assert_eq!(mem::size_of::<SharedPtr<u8, AtomicCounter>>(), SHARED_IMAGE_LEN);
const_assert_eq!(mem::size_of::<SharedPtr<u8, PlainCounter>>(), SHARED_IMAGE_LEN);
const_assert_eq!(mem::size_of::<SharedPtr<String>>(), SHARED_IMAGE_LEN);

/// A pointer type whose whole representation can be carried as a byte image.
///
/// # Safety
///
/// Implementors must consist of address fields only: no padding bytes, no
/// interior references, and `Image` exactly `size_of::<Self>()` bytes long.
pub(crate) unsafe trait Transferable: Sized {
    /// Fixed-size byte array holding one image.
    type Image: Copy + AsRef<[u8]> + AsMut<[u8]>;

    /// A zeroed image, used as staging storage.
    const BLANK: Self::Image;
}

/// Copy the bytes of `value` into a fresh image.
///
/// The image does not own anything until the caller decides it does; `value`
/// stays untouched.
pub(crate) fn encode<P: Transferable>(value: &P) -> P::Image {
    let mut image = P::BLANK;
    let bytes = image.as_mut();
    debug_assert_eq!(bytes.len(), mem::size_of::<P>());

    // SAFETY: `P` has no padding (trait contract) and `bytes` is exactly
    // `size_of::<P>()` long, so every byte read is initialised.
    unsafe {
        ptr::copy_nonoverlapping(
            (value as *const P).cast::<u8>(),
            bytes.as_mut_ptr(),
            mem::size_of::<P>(),
        );
    }
    image
}

/// Rebuild a pointer from its image.
///
/// # Safety
///
/// `image` must hold the bytes of a live `P` whose ownership has been handed
/// to the image (see the module docs) and that has not been decoded before.
pub(crate) unsafe fn decode<P: Transferable>(image: &P::Image) -> P {
    let bytes = image.as_ref();
    debug_assert_eq!(bytes.len(), mem::size_of::<P>());

    // SAFETY: the length matches and the caller guarantees the bytes form a
    // valid `P`. Slots carry no alignment, hence the unaligned read.
    unsafe { ptr::read_unaligned(bytes.as_ptr().cast::<P>()) }
}

/// Send callback copying an image into the front of a byte slot.
pub fn copy_to_slot(slot: &mut [u8], image: &[u8]) -> bool {
    match slot.get_mut(..image.len()) {
        Some(dst) => {
            dst.copy_from_slice(image);
            true
        }
        None => false,
    }
}

/// Receive callback filling `staging` from the front of a byte slot.
pub fn copy_from_slot(staging: &mut [u8], slot: &[u8]) -> bool {
    match slot.get(..staging.len()) {
        Some(src) => {
            staging.copy_from_slice(src);
            true
        }
        None => false,
    }
}
