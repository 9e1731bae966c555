//! Error types for cdtesim-core.

use thiserror::Error;

/// Result type alias for cdtesim operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for cdtesim operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Channel id outside the sensitive range.
    #[error("invalid channel index: {0} (expected 0..{max})", max = crate::NUM_CHANNELS)]
    InvalidChannel(i32),

    /// `begin_run` called while a run is still open.
    #[error("a run is already open; end it before starting another")]
    RunAlreadyOpen,

    /// Run-scoped operation without an open run.
    #[error("no run is open")]
    NoOpenRun,

    /// Step or end-of-event without a preceding `begin_event`.
    #[error("no event is open")]
    NoOpenEvent,

    /// `begin_event` called before the previous event was finalized.
    #[error("event {0} is still open")]
    EventAlreadyOpen(i64),

    /// Two histograms with different binning were combined.
    #[error("histogram axis mismatch for '{name}': {reason}")]
    AxisMismatch { name: String, reason: String },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Output sink failure.
    #[error("output sink error: {0}")]
    Sink(String),

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
