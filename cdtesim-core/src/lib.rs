//! cdtesim-core: Core types for CdTe detector-response simulation.
//!
//! This crate provides the shared vocabulary of the workspace: channel
//! addressing, transport steps, per-event hit ledgers, output rows,
//! histograms, the instrument energy-bin table and the run output sink trait.
//!

pub mod channel;
pub mod error;
pub mod histogram;
pub mod ledger;
pub mod records;
pub mod science;
pub mod sink;
pub mod step;

pub use channel::{
    spectrum_channel_name, ChannelId, BIG_PIXEL_CHANNEL, NUM_CHANNELS, NUM_MODULES,
    NUM_SPECTRUM_CHANNELS, PIXELS_PER_MODULE, SUMMED_CHANNEL,
};
pub use error::{Error, Result};
pub use histogram::{Axis, BinSlot, Histogram1D, Histogram2D};
pub use ledger::{HitLedger, DEFAULT_LEDGER_CAPACITY};
pub use records::{
    EventRecord, IncidentParticleRecord, ProcessRecord, SourceRecord, NO_SIGNAL, NO_SIGNAL_ENERGY,
};
pub use science::{science_bin, science_bin_width, NUM_SCIENCE_BINS, SCIENCE_EDGES_KEV};
pub use sink::{MemorySink, RunSink};
pub use step::{IncidentKinematics, PhysicsProcess, StepAction, StepDeposit, Vec3, VolumeKind};
