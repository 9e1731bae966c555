//! Fano-limited energy resolution.

use crate::calibration::CalibrationConstants;

/// Intrinsic energy resolution of the crystal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolutionModel {
    fano_factor: f64,
    pair_creation_energy_kev: f64,
}

impl ResolutionModel {
    /// Builds the model from calibration constants.
    #[must_use]
    pub fn new(constants: &CalibrationConstants) -> Self {
        Self {
            fano_factor: constants.fano_factor,
            pair_creation_energy_kev: constants.pair_creation_energy_kev,
        }
    }

    /// Standard deviation (keV) of the charge signal for `energy_kev` collected.
    ///
    /// `sqrt(F · w · E)`. Negative energies are treated as zero.
    #[inline]
    #[must_use]
    pub fn sigma(&self, energy_kev: f64) -> f64 {
        (self.fano_factor * self.pair_creation_energy_kev * energy_kev.max(0.0)).sqrt()
    }
}

impl Default for ResolutionModel {
    fn default() -> Self {
        Self::new(&CalibrationConstants::default())
    }
}
