//! Error types for relay runs

use memslot::config::ConfigError;
use thiserror::Error;

/// Errors that end a relay run
#[derive(Error, Debug)]
pub enum RelayError {
    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A producer made no progress because every slot stayed occupied
    #[error("All {capacity} slots stayed full for {waited_ms} ms")]
    SlotsFull {
        /// Slots in the stalled queue
        capacity: usize,
        /// Time spent waiting
        waited_ms: u128,
    },

    /// A consumer found its queue empty after the producer had finished
    #[error("Producer finished after {received} of {expected} messages")]
    Disconnected {
        /// Messages the consumer was waiting for
        expected: u32,
        /// Messages it actually received
        received: u32,
    },

    /// A received payload is not the one that was sent
    #[error("Payload mismatch: expected message {expected}, got {actual:?}")]
    PayloadMismatch {
        /// Sequence number the consumer expected
        expected: u32,
        /// Sequence number it found, `None` for an empty pointer
        actual: Option<u32>,
    },

    /// Owner count differs from the expected value after a run
    #[error("Owner count mismatch: expected {expected}, found {actual}")]
    CountMismatch {
        /// Expected owner count
        expected: usize,
        /// Observed owner count
        actual: usize,
    },

    /// A worker thread panicked
    #[error("{0} worker panicked")]
    WorkerPanicked(&'static str),

    /// The run report could not be serialized
    #[error("Report serialization failed: {0}")]
    Report(#[from] serde_json::Error),
}

/// Result type for relay operations
pub type RelayResult<T> = Result<T, RelayError>;
