//! I/O error types.

use thiserror::Error;

/// Result type for I/O operations.
pub type Result<T> = std::result::Result<T, Error>;

/// I/O error types.
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid file format.
    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    /// Step-trace decoding error.
    #[error("trace error: {0}")]
    TraceError(#[from] cdtesim_trace::Error),

    /// Core library error.
    #[error("core error: {0}")]
    CoreError(#[from] cdtesim_core::Error),

    /// JSON encoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HDF5 library error.
    #[cfg(feature = "hdf5")]
    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),
}

impl From<Error> for cdtesim_core::Error {
    fn from(value: Error) -> Self {
        match value {
            Error::CoreError(inner) => inner,
            Error::Io(inner) => cdtesim_core::Error::Io(inner),
            other => cdtesim_core::Error::Sink(other.to_string()),
        }
    }
}
