//! # memslot pointers
//!
//! Ownership-tracking pointers that can be pushed through a boundary which
//! only copies bytes, such as a fixed-size message slot in an inter-task
//! queue. A plain bitwise copy of a `Box` or `Arc` would create a second owner
//! that nobody accounts for. These pointers instead bracket the copy with one
//! explicit ownership adjustment on each side.
//!
//! ## Pointer families
//!
//! - [`ExclusivePtr`] – single owner, move-only. `send` empties the sender,
//!   `receive` adopts the payload.
//! - [`SharedPtr`] – counted owners. `send` adds an owner slot for the
//!   outgoing image and keeps the sender's own, `receive` swaps the receiver's
//!   previous claim for the image's slot.
//!
//! Shared pointers count with a [`Counter`] picked at compile time:
//! [`AtomicCounter`] (default) or [`PlainCounter`].
//!
//! ## Transfer protocol
//!
//! ```text
//!  context A                        slot                        context B
//! ┌──────────────┐  send(copy)   ┌─────────┐  receive(copy)  ┌──────────────┐
//! │ SharedPtr<T> ├──────────────►│ image   ├────────────────►│ SharedPtr<T> │
//! │ count += 1   │               │ (bytes) │                 │ old claim    │
//! └──────────────┘               └─────────┘                 │ released     │
//!                                                            └──────────────┘
//! ```
//!
//! The transport is any callback that copies bytes and reports success.
//! [`copy_to_slot`] and [`copy_from_slot`] cover plain byte buffers.
//!
//! ```rust
//! use memslot_ptr::{SharedPtr, copy_from_slot, copy_to_slot, SHARED_IMAGE_LEN};
//!
//! let origin: SharedPtr<u32> = SharedPtr::new(70);
//! let mut slot = [0u8; SHARED_IMAGE_LEN];
//!
//! assert!(origin.send(&mut slot[..], copy_to_slot));
//! assert_eq!(origin.get_count(), 2);
//!
//! let mut adopted: SharedPtr<u32> = SharedPtr::null();
//! // SAFETY: `slot` holds an image sent above, received exactly once.
//! assert!(unsafe { adopted.receive(&slot[..], copy_from_slot) });
//! assert_eq!(*adopted, 70);
//! assert_eq!(adopted.get_count(), 2);
//! ```
//!
//! ## Safety
//!
//! `receive`, `from_image` and `discard_image` are `unsafe`: an image is only
//! valid in the address space that produced it, and only once. Everything
//! else is safe. A sent image that is never received is a leak, not undefined
//! behaviour; `discard_image` reclaims it.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod counter;
pub mod exclusive;
pub mod holder;
pub mod image;
pub mod shared;

pub use counter::{AtomicCounter, Counter, PlainCounter};
pub use exclusive::ExclusivePtr;
pub use holder::CounterHolder;
pub use image::{
    EXCLUSIVE_IMAGE_LEN, ExclusiveImage, SHARED_IMAGE_LEN, SharedImage, copy_from_slot,
    copy_to_slot,
};
pub use shared::SharedPtr;
