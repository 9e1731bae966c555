//! cdtesim-trace: step-trace record codec.
//!
//! A step trace is the recorded output of a particle-transport run: for every
//! event an event-begin record with the source kinematics, the transport
//! steps, and an event-end record. Replaying a trace through the response
//! pipeline reproduces the run without the transport engine.
//!
//! # Formats
//!
//! - **Binary**: a 16-byte header followed by fixed-size records, see
//!   [`record`] for the layout.
//! - **JSON lines**: one serde-tagged [`TraceRecord`] per line.
//!
//! # Key Components
//!
//! - [`TraceHeader`] - magic/version header of binary traces
//! - [`TraceRecord`] - event-begin, step, and event-end records
//! - [`TraceParser`] - iterator over the records of an in-memory trace

mod error;
mod parser;
pub mod record;

pub use error::{Error, Result};
pub use parser::{parse_json_line, TraceParser};
pub use record::{TraceRecord, RECORD_SIZE};

/// Magic bytes at the start of a binary trace.
pub const MAGIC: &[u8; 8] = b"CDTESTEP";
/// Current binary format version.
pub const VERSION: u32 = 1;
/// Size of the binary header in bytes.
pub const HEADER_SIZE: usize = 16;

/// Header of a binary trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceHeader {
    /// Format version.
    pub version: u32,
}

impl Default for TraceHeader {
    fn default() -> Self {
        Self { version: VERSION }
    }
}

impl TraceHeader {
    /// Parses and validates a header.
    ///
    /// # Errors
    /// Returns an error if the buffer is short, the magic does not match or
    /// the version is unsupported.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        if raw.len() < HEADER_SIZE {
            return Err(Error::Truncated(format!(
                "header has {} of {HEADER_SIZE} bytes",
                raw.len()
            )));
        }
        let mut magic = [0u8; 8];
        magic.copy_from_slice(&raw[..8]);
        if &magic != MAGIC {
            return Err(Error::BadMagic(magic));
        }
        let mut version = [0u8; 4];
        version.copy_from_slice(&raw[8..12]);
        let version = u32::from_le_bytes(version);
        if version != VERSION {
            return Err(Error::UnsupportedVersion(version));
        }
        Ok(Self { version })
    }

    /// Encodes the header. The trailing four bytes are reserved and zero.
    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[..8].copy_from_slice(MAGIC);
        buf[8..12].copy_from_slice(&self.version.to_le_bytes());
        buf
    }
}

/// Returns true if `raw` starts with the binary trace magic.
#[must_use]
pub fn is_binary_trace(raw: &[u8]) -> bool {
    raw.len() >= MAGIC.len() && &raw[..MAGIC.len()] == MAGIC
}
