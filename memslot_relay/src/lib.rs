//! # memslot relay
//!
//! Drives `memslot_ptr` pointers between threads through fixed-size byte
//! slots, the way an RTOS task would hand them through a message queue, and
//! checks that every payload arrives intact and is freed exactly once.
//!
//! # Module Structure
//!
//! - [`config`] - `[relay]` table and command-line overrides
//! - [`error`] - Run errors
//! - [`relay`] - Producer/consumer pairs over `heapless` SPSC queues

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod relay;

pub use config::{RelayConfig, RelayMode, RelayOverrides, RelaySettings};
pub use error::{RelayError, RelayResult};
pub use relay::{Message, ModeStats, RelayReport, run, run_exclusive, run_shared};
