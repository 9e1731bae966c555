//! cdtesim-response: CdTe detector response for step-level transport output.
//!
//! This crate turns the energy deposits of a transport engine into what the
//! instrument would have recorded:
//! - **Charge collection** - Hecht efficiency and near-surface loss by depth
//! - **Resolution** - Fano statistics plus electronic noise
//! - **Event finalization** - thresholding, instrument binning, single-hit
//!   classification
//! - **Run aggregation** - spectrum banks, bounded output tables, metadata
//!
#![warn(missing_docs)]

mod accumulator;
mod calibration;
mod collection;
mod config;
mod finalizer;
mod noise;
mod resolution;
mod run;
pub mod spectra;

pub use accumulator::{EventAccumulator, INCIDENT_ORIGIN_Y_MM, INCIDENT_ORIGIN_Z_MM};
pub use calibration::{CalibrationConstants, JitterBounds};
pub use collection::{ChargeCollectionModel, CollectionDiagnostics, CollectionResponse};
pub use config::{RunConfig, TableLimits, TerminationPolicy};
pub use finalizer::EventFinalizer;
pub use noise::{SmearedEnergy, Smearer};
pub use resolution::ResolutionModel;
pub use run::{RunAggregator, RunCounters, RunReport};
pub use spectra::{FineBinning, SpectrumBank, SpectrumFamily, HISTOGRAM_DIRECTORY};

// Re-export the shared data model
pub use cdtesim_core::{Error, Result};
