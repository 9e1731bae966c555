//! Step-trace error types.

use thiserror::Error;

/// Result type for trace operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Step-trace error types.
#[derive(Error, Debug)]
pub enum Error {
    /// Header magic did not match.
    #[error("not a step trace: bad magic {0:02x?}")]
    BadMagic([u8; 8]),

    /// Header version is not supported by this reader.
    #[error("unsupported trace version: {0}")]
    UnsupportedVersion(u32),

    /// Unknown record tag.
    #[error("unknown record tag {tag:#04x} at record {index}")]
    UnknownTag { tag: u8, index: usize },

    /// Unknown volume kind inside a step record.
    #[error("unknown volume kind {0}")]
    UnknownVolume(u8),

    /// Input ended inside a header or record.
    #[error("truncated trace: {0}")]
    Truncated(String),

    /// JSON-lines parse error.
    #[error("JSON error at line {line}: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Core library error.
    #[error("core error: {0}")]
    CoreError(#[from] cdtesim_core::Error),
}
