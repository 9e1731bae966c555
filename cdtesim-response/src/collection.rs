//! Charge-collection model.
//!
//! Collection efficiency follows the Hecht equation for a planar detector,
//! with depth measured from the cathode surface along x:
//!
//! ```text
//! eff(z) = (1 - exp((z - d) / λe)) · λe / d + λh / d · (1 - exp(-z / λh))
//! ```
//!
//! On top of that an empirical near-surface factor `1 - R0 · exp(-z / L)`
//! models charge lost to crystal damage close to the cathode.

use crate::calibration::CalibrationConstants;
use cdtesim_core::{Axis, Histogram1D, Result, Vec3};

/// Collection response at one interaction point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollectionResponse {
    /// Depth below the cathode surface (mm).
    pub depth_mm: f64,
    /// Hecht collection efficiency.
    pub efficiency: f64,
    /// Near-surface trapping factor.
    pub near_surface_factor: f64,
}

impl CollectionResponse {
    /// Combined weight applied to the raw deposit.
    #[must_use]
    pub fn weight(&self) -> f64 {
        self.efficiency * self.near_surface_factor
    }
}

/// Position-dependent charge-collection model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChargeCollectionModel {
    surface_x_mm: f64,
    r0: f64,
    length_mm: f64,
    electron_path_mm: f64,
    hole_path_mm: f64,
    thickness_mm: f64,
}

impl ChargeCollectionModel {
    /// Builds the model from calibration constants.
    #[must_use]
    pub fn new(constants: &CalibrationConstants) -> Self {
        Self {
            surface_x_mm: constants.surface_x_mm,
            r0: constants.near_surface_r0,
            length_mm: constants.near_surface_length_mm,
            electron_path_mm: constants.electron_free_path_mm(),
            hole_path_mm: constants.hole_free_path_mm(),
            thickness_mm: constants.thickness_mm,
        }
    }

    /// Returns a copy with different near-surface constants.
    #[must_use]
    pub fn with_near_surface(mut self, r0: f64, length_mm: f64) -> Self {
        self.r0 = r0;
        self.length_mm = length_mm;
        self
    }

    /// Near-surface `(R0, L)` in effect.
    #[must_use]
    pub fn near_surface(&self) -> (f64, f64) {
        (self.r0, self.length_mm)
    }

    /// Depth of `position` below the cathode surface (mm).
    #[inline]
    #[must_use]
    pub fn depth(&self, position: Vec3) -> f64 {
        (position.x - self.surface_x_mm).abs()
    }

    /// `1 - R0 · exp(-depth / L)`.
    #[inline]
    #[must_use]
    pub fn near_surface_factor(&self, depth_mm: f64) -> f64 {
        1.0 - self.r0 * (-depth_mm / self.length_mm).exp()
    }

    /// Hecht collection efficiency at `depth_mm`.
    #[inline]
    #[must_use]
    pub fn collection_efficiency(&self, depth_mm: f64) -> f64 {
        let d = self.thickness_mm;
        let le = self.electron_path_mm;
        let lh = self.hole_path_mm;
        (1.0 - ((depth_mm - d) / le).exp()) * (le / d) + (lh / d) * (1.0 - (-depth_mm / lh).exp())
    }

    /// Evaluates the model at an interaction point.
    #[must_use]
    pub fn evaluate(&self, position: Vec3) -> CollectionResponse {
        let depth_mm = self.depth(position);
        CollectionResponse {
            depth_mm,
            efficiency: self.collection_efficiency(depth_mm),
            near_surface_factor: self.near_surface_factor(depth_mm),
        }
    }
}

/// Monitoring distributions of the collection model.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionDiagnostics {
    /// Interaction depth, `h1depth`.
    pub depth: Histogram1D,
    /// Collection efficiency, `h1ChargeColEff`.
    pub efficiency: Histogram1D,
    /// Near-surface factor, `hNearSurfaceFactor`.
    pub near_surface: Histogram1D,
}

impl CollectionDiagnostics {
    /// Allocates the diagnostic histograms. Titles record the constants.
    ///
    /// # Errors
    /// Never fails for the fixed layouts; the `Result` comes from axis construction.
    pub fn new(constants: &CalibrationConstants) -> Result<Self> {
        Ok(Self {
            depth: Histogram1D::new(
                "h1depth",
                "Energy deposition depth; Depth (mm); Counts;",
                Axis::uniform(100, 0.0, 1.0)?,
            ),
            efficiency: Histogram1D::new(
                "h1ChargeColEff",
                format!(
                    "Distribution of Charge collection efficiency (Fano: {:.6}, ENOISE: {:.6}); Efficiency; Counts;",
                    constants.fano_factor, constants.electronic_noise_kev
                ),
                Axis::uniform(200, 0.0, 1.0)?,
            ),
            near_surface: Histogram1D::new(
                "hNearSurfaceFactor",
                format!(
                    "CF of surface effect (L: {:.6}; R0: {:.6}); Efficiency; Counts;",
                    constants.near_surface_length_mm, constants.near_surface_r0
                ),
                Axis::uniform(200, 0.0, 1.0)?,
            ),
        })
    }

    /// Records one model evaluation.
    pub fn record(&mut self, response: &CollectionResponse) {
        self.depth.fill(response.depth_mm);
        self.efficiency.fill(response.efficiency);
        self.near_surface.fill(response.near_surface_factor);
    }

    /// Adds another set of diagnostics.
    ///
    /// # Errors
    /// Returns an error if the layouts differ.
    pub fn merge(&mut self, other: &Self) -> Result<()> {
        self.depth.merge(&other.depth)?;
        self.efficiency.merge(&other.efficiency)?;
        self.near_surface.merge(&other.near_surface)
    }
}
