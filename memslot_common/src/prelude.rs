//! Common re-exports.
//!
//! ```rust
//! use memslot_common::prelude::*;
//! ```

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;
pub use crate::init_tracing;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, SharedConfig, Validate};

// ─── Slot geometry ──────────────────────────────────────────────────
pub use crate::consts::{DEFAULT_MESSAGES, MAX_CONSUMERS, SLOT_CAPACITY, SLOT_SIZE};
