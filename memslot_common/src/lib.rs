//! memslot common library
//!
//! Shared constants, configuration loading and logging setup for the crates
//! that drive `memslot_ptr` pointers through message slots.
//!
//! # Module Structure
//!
//! - [`consts`] - Slot geometry and relay limits
//! - [`config`] - Configuration loading traits and types
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! Add to your `Cargo.toml` with alias for shorter imports:
//! ```toml
//! [dependencies]
//! memslot = { package = "memslot_common", path = "../memslot_common" }
//! ```
//!
//! Then import:
//! ```rust
//! use memslot_common::consts::*;
//! use memslot_common::config::{ConfigLoader, SharedConfig};
//! ```

pub mod config;
pub mod consts;
pub mod prelude;

use config::LogLevel;
use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` directives still apply; `level` is added on top of them as the
/// default directive. A second call is ignored, so tests and binaries can
/// both call it.
pub fn init_tracing(level: LogLevel, json: bool) {
    let filter = EnvFilter::from_default_env().add_directive(level.as_tracing().into());

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_ids(true)
        .with_line_number(true);

    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
