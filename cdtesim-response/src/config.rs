//! Run configuration.

use crate::calibration::{CalibrationConstants, JitterBounds};
use crate::spectra::FineBinning;
use cdtesim_core::{Result, DEFAULT_LEDGER_CAPACITY};
use std::path::PathBuf;

/// Early-termination policy for tracks entering designated volumes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TerminationPolicy {
    /// Kill tracks entering collimator grid volumes.
    pub terminate_at_grids: bool,
    /// Kill tracks once their deposit in a pixel has been accumulated.
    pub terminate_at_detectors: bool,
}

impl TerminationPolicy {
    /// Enables a policy by its short name: `grids` or `pix`.
    ///
    /// Returns `false` for unknown names.
    pub fn enable(&mut self, name: &str) -> bool {
        match name {
            "grids" => self.terminate_at_grids = true,
            "pix" => self.terminate_at_detectors = true,
            _ => return false,
        }
        true
    }
}

/// Maximum rows per output table for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableLimits {
    /// `events` rows.
    pub events: usize,
    /// `inp` rows.
    pub incident: usize,
    /// `phys` rows.
    pub processes: usize,
    /// `source` rows.
    pub sources: usize,
}

impl Default for TableLimits {
    fn default() -> Self {
        Self {
            events: 1_000_000,
            incident: 1_000_000,
            processes: 1_000_000,
            sources: 100_000,
        }
    }
}

/// Everything a run aggregator needs before the first run starts.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Output identifier, recorded in the logs.
    pub output: String,
    /// Command line that launched the run.
    pub command_line: String,
    /// Macro file copied into the metadata record.
    pub macro_path: Option<PathBuf>,
    /// Free-form metadata text.
    pub metadata: String,
    /// Response calibration.
    pub calibration: CalibrationConstants,
    /// Early-termination policy.
    pub termination: TerminationPolicy,
    /// Per-event near-surface randomization, debug mode only.
    pub jitter: Option<JitterBounds>,
    /// RNG seed; `None` seeds from OS entropy.
    pub seed: Option<u64>,
    /// Output table bounds.
    pub limits: TableLimits,
    /// Hit-ledger capacity per event.
    pub ledger_capacity: usize,
    /// Binning of the fine spectra.
    pub fine_binning: FineBinning,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            output: String::new(),
            command_line: String::new(),
            macro_path: None,
            metadata: String::new(),
            calibration: CalibrationConstants::default(),
            termination: TerminationPolicy::default(),
            jitter: None,
            seed: None,
            limits: TableLimits::default(),
            ledger_capacity: DEFAULT_LEDGER_CAPACITY,
            fine_binning: FineBinning::default(),
        }
    }
}

impl RunConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the output identifier.
    #[must_use]
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }

    /// Sets the command line recorded in the metadata.
    #[must_use]
    pub fn with_command_line(mut self, command_line: impl Into<String>) -> Self {
        self.command_line = command_line.into();
        self
    }

    /// Sets the macro file copied into the metadata.
    #[must_use]
    pub fn with_macro_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.macro_path = Some(path.into());
        self
    }

    /// Sets the free-form metadata text.
    #[must_use]
    pub fn with_metadata(mut self, text: impl Into<String>) -> Self {
        self.metadata = text.into();
        self
    }

    /// Sets the calibration constants.
    #[must_use]
    pub fn with_calibration(mut self, calibration: CalibrationConstants) -> Self {
        self.calibration = calibration;
        self
    }

    /// Sets the termination policy.
    #[must_use]
    pub fn with_termination(mut self, termination: TerminationPolicy) -> Self {
        self.termination = termination;
        self
    }

    /// Enables per-event near-surface jitter.
    #[must_use]
    pub fn with_jitter(mut self, bounds: JitterBounds) -> Self {
        self.jitter = Some(bounds);
        self
    }

    /// Seeds the RNG.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Sets the output table bounds.
    #[must_use]
    pub fn with_limits(mut self, limits: TableLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Sets the hit-ledger capacity.
    #[must_use]
    pub fn with_ledger_capacity(mut self, capacity: usize) -> Self {
        self.ledger_capacity = capacity;
        self
    }

    /// Sets the fine-spectrum binning.
    #[must_use]
    pub fn with_fine_binning(mut self, fine_binning: FineBinning) -> Self {
        self.fine_binning = fine_binning;
        self
    }

    /// Validates calibration and jitter bounds.
    ///
    /// # Errors
    /// Returns [`cdtesim_core::Error::Config`] for invalid values.
    pub fn validate(&self) -> Result<()> {
        self.calibration.validate()?;
        if let Some(jitter) = &self.jitter {
            jitter.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RunConfig::new();
        assert_eq!(config.limits.sources, 100_000);
        assert_eq!(config.limits.events, 1_000_000);
        assert_eq!(config.ledger_capacity, 10_000);
        assert_eq!(config.fine_binning.bins, 1500);
        assert!(config.jitter.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builders() {
        let config = RunConfig::new()
            .with_output("run.h5")
            .with_seed(9)
            .with_macro_path("run.mac")
            .with_jitter(JitterBounds::default());
        assert_eq!(config.output, "run.h5");
        assert_eq!(config.seed, Some(9));
        assert_eq!(config.macro_path, Some(PathBuf::from("run.mac")));
        assert!(config.jitter.is_some());
    }

    #[test]
    fn test_termination_names() {
        let mut policy = TerminationPolicy::default();
        assert!(policy.enable("grids"));
        assert!(policy.terminate_at_grids);
        assert!(!policy.terminate_at_detectors);
        assert!(policy.enable("pix"));
        assert!(policy.terminate_at_detectors);
        assert!(!policy.enable("world"));
    }
}
