//! Detector calibration constants.

use cdtesim_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Calibration of the CdTe response chain.
///
/// Loaded from JSON with every field optional; missing fields keep the
/// calibrated defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConstants {
    /// Near-surface trapping amplitude `R0`.
    pub near_surface_r0: f64,
    /// Near-surface trapping length `L` (mm).
    pub near_surface_length_mm: f64,
    /// x coordinate of the cathode surface (mm); depth is measured from here.
    pub surface_x_mm: f64,
    /// Fano factor of CdTe.
    pub fano_factor: f64,
    /// Mean energy to create one electron-hole pair (keV).
    pub pair_creation_energy_kev: f64,
    /// Readout electronics noise (keV, one sigma).
    pub electronic_noise_kev: f64,
    /// Detection threshold (keV).
    pub threshold_kev: f64,
    /// Bias voltage (V).
    pub bias_voltage: f64,
    /// Electron mobility (cm²/Vs).
    pub electron_mobility: f64,
    /// Electron lifetime (s).
    pub electron_lifetime_s: f64,
    /// Hole mobility (cm²/Vs).
    pub hole_mobility: f64,
    /// Hole lifetime (s).
    pub hole_lifetime_s: f64,
    /// Crystal thickness, the nominal transport distance (mm).
    pub thickness_mm: f64,
}

impl Default for CalibrationConstants {
    fn default() -> Self {
        Self {
            near_surface_r0: 0.116,
            near_surface_length_mm: 5.28e-3,
            surface_x_mm: 12.7741,
            fano_factor: 0.15,
            pair_creation_energy_kev: 4.46e-3,
            electronic_noise_kev: 0.43,
            threshold_kev: 4.0,
            bias_voltage: 300.0,
            electron_mobility: 1100.0,
            electron_lifetime_s: 3e-6,
            hole_mobility: 100.0,
            hole_lifetime_s: 2e-6,
            thickness_mm: 1.0,
        }
    }
}

impl CalibrationConstants {
    /// Loads constants from a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// holds out-of-range values.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let constants: Self = serde_json::from_reader(reader)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        constants.validate()?;
        Ok(constants)
    }

    /// Parses constants from a JSON string.
    ///
    /// # Errors
    /// Returns an error for malformed JSON or out-of-range values.
    pub fn from_json(json: &str) -> Result<Self> {
        let constants: Self =
            serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        constants.validate()?;
        Ok(constants)
    }

    /// Checks that every constant is physically meaningful.
    ///
    /// # Errors
    /// Returns [`Error::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.near_surface_r0) {
            return Err(Error::Config(format!(
                "near_surface_r0 must be in [0, 1), got {}",
                self.near_surface_r0
            )));
        }
        let positive = [
            ("near_surface_length_mm", self.near_surface_length_mm),
            ("pair_creation_energy_kev", self.pair_creation_energy_kev),
            ("bias_voltage", self.bias_voltage),
            ("electron_mobility", self.electron_mobility),
            ("electron_lifetime_s", self.electron_lifetime_s),
            ("hole_mobility", self.hole_mobility),
            ("hole_lifetime_s", self.hole_lifetime_s),
            ("thickness_mm", self.thickness_mm),
        ];
        for (name, value) in positive {
            if !(value > 0.0) || !value.is_finite() {
                return Err(Error::Config(format!("{name} must be positive, got {value}")));
            }
        }
        let non_negative = [
            ("fano_factor", self.fano_factor),
            ("electronic_noise_kev", self.electronic_noise_kev),
            ("threshold_kev", self.threshold_kev),
        ];
        for (name, value) in non_negative {
            if !(value >= 0.0) || !value.is_finite() {
                return Err(Error::Config(format!(
                    "{name} must be non-negative, got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Sets the near-surface trapping constants.
    #[must_use]
    pub fn with_near_surface(mut self, r0: f64, length_mm: f64) -> Self {
        self.near_surface_r0 = r0;
        self.near_surface_length_mm = length_mm;
        self
    }

    /// Sets the electronic noise.
    #[must_use]
    pub fn with_electronic_noise(mut self, noise_kev: f64) -> Self {
        self.electronic_noise_kev = noise_kev;
        self
    }

    /// Sets the detection threshold.
    #[must_use]
    pub fn with_threshold(mut self, threshold_kev: f64) -> Self {
        self.threshold_kev = threshold_kev;
        self
    }

    /// Sets the bias voltage.
    #[must_use]
    pub fn with_bias_voltage(mut self, volts: f64) -> Self {
        self.bias_voltage = volts;
        self
    }

    /// Electron free path `μτV/d` in mm.
    #[must_use]
    pub fn electron_free_path_mm(&self) -> f64 {
        self.free_path_mm(self.electron_mobility, self.electron_lifetime_s)
    }

    /// Hole free path `μτV/d` in mm.
    #[must_use]
    pub fn hole_free_path_mm(&self) -> f64 {
        self.free_path_mm(self.hole_mobility, self.hole_lifetime_s)
    }

    fn free_path_mm(&self, mobility: f64, lifetime_s: f64) -> f64 {
        // Field is V / d(cm); d(cm) = d(mm) / 10 and cm -> mm is another x10.
        mobility * lifetime_s * self.bias_voltage * 100.0 / self.thickness_mm
    }
}

/// Ranges for the per-event randomization of the near-surface constants.
///
/// Used for calibration-sensitivity studies: each event draws `R0` and `L`
/// uniformly from these bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JitterBounds {
    /// Smallest `R0`.
    pub r0_min: f64,
    /// Largest `R0`.
    pub r0_max: f64,
    /// Smallest `L` (mm).
    pub length_min_mm: f64,
    /// Largest `L` (mm).
    pub length_max_mm: f64,
}

impl Default for JitterBounds {
    fn default() -> Self {
        Self {
            r0_min: 0.1,
            r0_max: 0.9,
            length_min_mm: 5.0e-3,
            length_max_mm: 8.5e-3,
        }
    }
}

impl JitterBounds {
    /// Checks that both ranges are ordered and physically meaningful.
    ///
    /// # Errors
    /// Returns [`Error::Config`] for inverted or out-of-range bounds.
    pub fn validate(&self) -> Result<()> {
        if !(0.0 <= self.r0_min && self.r0_min <= self.r0_max && self.r0_max < 1.0) {
            return Err(Error::Config(format!(
                "R0 jitter bounds must satisfy 0 <= min <= max < 1, got [{}, {}]",
                self.r0_min, self.r0_max
            )));
        }
        if !(0.0 < self.length_min_mm && self.length_min_mm <= self.length_max_mm) {
            return Err(Error::Config(format!(
                "L jitter bounds must satisfy 0 < min <= max, got [{}, {}]",
                self.length_min_mm, self.length_max_mm
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Write;

    #[test]
    fn test_default_free_paths() {
        let c = CalibrationConstants::default();
        assert_relative_eq!(c.electron_free_path_mm(), 99.0, epsilon = 1e-9);
        assert_relative_eq!(c.hole_free_path_mm(), 6.0, epsilon = 1e-9);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let c = CalibrationConstants::from_json(r#"{ "electronic_noise_kev": 0.6 }"#).unwrap();
        assert_relative_eq!(c.electronic_noise_kev, 0.6);
        assert_relative_eq!(c.fano_factor, 0.15);
        assert_relative_eq!(c.threshold_kev, 4.0);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(CalibrationConstants::from_json(r#"{ "near_surface_r0": 1.5 }"#).is_err());
        assert!(CalibrationConstants::from_json(r#"{ "thickness_mm": 0.0 }"#).is_err());
        assert!(CalibrationConstants::from_json(r#"{ "fano_factor": -0.1 }"#).is_err());
        assert!(CalibrationConstants::from_json("not json").is_err());
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{ "bias_voltage": 600.0, "threshold_kev": 5.0 }}"#).unwrap();
        let c = CalibrationConstants::from_json_file(file.path()).unwrap();
        assert_relative_eq!(c.threshold_kev, 5.0);
        assert_relative_eq!(c.electron_free_path_mm(), 198.0, epsilon = 1e-9);
    }

    #[test]
    fn test_jitter_bounds() {
        assert!(JitterBounds::default().validate().is_ok());
        let inverted = JitterBounds {
            r0_min: 0.5,
            r0_max: 0.2,
            ..JitterBounds::default()
        };
        assert!(inverted.validate().is_err());
    }
}
