//! Random draws of the response chain: two-stage Gaussian smearing and
//! near-surface jitter.

use crate::calibration::JitterBounds;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

/// Output of the two-stage smear for one channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmearedEnergy {
    /// After the charge-statistics draw (keV).
    pub charge_kev: f64,
    /// After the electronics draw; the realistic energy (keV).
    pub realistic_kev: f64,
}

/// Noise generator owned by one run aggregator.
///
/// The charge-statistics draw and the electronics draw are two independent
/// Gaussian samples, never one combined-variance sample.
#[derive(Debug, Clone)]
pub struct Smearer {
    rng: StdRng,
    electronic_noise_kev: f64,
}

impl Smearer {
    /// Creates a smearer, seeded for reproducibility or from OS entropy.
    #[must_use]
    pub fn new(seed: Option<u64>, electronic_noise_kev: f64) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            electronic_noise_kev,
        }
    }

    /// Draws from N(mean, sigma²). A non-positive sigma returns `mean` exactly.
    pub fn gaussian(&mut self, mean: f64, sigma: f64) -> f64 {
        if sigma <= 0.0 {
            return mean;
        }
        let z: f64 = self.rng.sample(StandardNormal);
        mean + sigma * z
    }

    /// Smears a collected energy with `charge_sigma`, then with the fixed
    /// electronics noise.
    pub fn smear(&mut self, collected_kev: f64, charge_sigma: f64) -> SmearedEnergy {
        let charge_kev = self.gaussian(collected_kev, charge_sigma);
        let realistic_kev = self.gaussian(charge_kev, self.electronic_noise_kev);
        SmearedEnergy {
            charge_kev,
            realistic_kev,
        }
    }

    /// Draws near-surface constants `(R0, L)` uniformly within `bounds`.
    pub fn draw_near_surface(&mut self, bounds: &JitterBounds) -> (f64, f64) {
        let r0 = self.rng.gen_range(bounds.r0_min..=bounds.r0_max);
        let length = self
            .rng
            .gen_range(bounds.length_min_mm..=bounds.length_max_mm);
        (r0, length)
    }
}
