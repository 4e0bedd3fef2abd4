//! Slot geometry and relay limits.
//!
//! Single source of truth for the byte size of a message slot and the queue
//! depth used by the relay. Pointer images must fit a slot; that is checked
//! where the pointer crate is linked in.

use static_assertions::const_assert;

/// Bytes per message slot. Large enough for a shared pointer image on any
/// target up to 128-bit addresses.
pub const SLOT_SIZE: usize = 32;

/// Slots per relay queue.
pub const SLOT_CAPACITY: usize = 64;

/// Upper bound on consumer workers in one relay run.
pub const MAX_CONSUMERS: u8 = 16;

/// Messages per mode when the config does not say otherwise.
pub const DEFAULT_MESSAGES: u32 = 1000;

/// Service name used when the config file does not set one.
pub const DEFAULT_SERVICE_NAME: &str = "memslot-relay";

const_assert!(SLOT_SIZE >= 2 * core::mem::size_of::<usize>());
const_assert!(SLOT_SIZE % core::mem::align_of::<usize>() == 0);
const_assert!(SLOT_CAPACITY.is_power_of_two());
const_assert!(MAX_CONSUMERS > 0);
