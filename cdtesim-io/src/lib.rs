//! cdtesim-io: Step-trace I/O and run output sinks for cdtesim.
//!
//! This crate provides memory-mapped trace reading via memmap2, trace
//! replay through the response pipeline, and the on-disk run sinks:
//! - **CSV** - a directory of plain-text tables and histograms
//! - **HDF5** - a single chunked file (feature `hdf5`)
//!

pub mod csv;
mod error;
#[cfg(feature = "hdf5")]
pub mod hdf5;
mod reader;
pub mod replay;
pub mod scanner;
mod writer;

pub use csv::CsvRunSink;
pub use error::{Error, Result};
#[cfg(feature = "hdf5")]
pub use hdf5::{Hdf5RunSink, Hdf5WriteOptions};
pub use reader::{MappedFileReader, TraceFileReader, TraceFormat};
pub use replay::{process_trace, process_traces, replay_records, ReplayJob, ReplayStats};
pub use scanner::{TraceScanner, TraceSummary};
pub use writer::TraceFileWriter;
