//! Histogram families of a run.
//!
//! For each of the 32 modules and the two virtual channels (all modules
//! summed, big pixels excluding CFL and BKG) eight spectra are kept:
//! {raw, realistic} × {fine, instrument-binned} × {all hits, single hit}.
//! A few global histograms sit next to them.

use crate::calibration::CalibrationConstants;
use crate::collection::{CollectionDiagnostics, CollectionResponse};
use cdtesim_core::{
    spectrum_channel_name, Axis, ChannelId, Error, Histogram1D, Histogram2D, Result,
    RunSink, BIG_PIXEL_CHANNEL, NUM_CHANNELS, NUM_MODULES, NUM_SPECTRUM_CHANNELS,
    PIXELS_PER_MODULE, SCIENCE_EDGES_KEV, SUMMED_CHANNEL,
};

/// Directory histograms are written under.
pub const HISTOGRAM_DIRECTORY: &str = "hist";

/// `hEdepSum` covers 0-300 keV in 0.5 keV bins.
const EDEP_SUM_BINS: usize = 600;
const EDEP_SUM_MAX_KEV: f64 = 300.0;

/// Binning of the fine-grained spectra.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FineBinning {
    /// Number of bins.
    pub bins: usize,
    /// Upper edge (keV); the lower edge is 0.
    pub max_kev: f64,
}

impl Default for FineBinning {
    fn default() -> Self {
        Self {
            bins: 1500,
            max_kev: 150.0,
        }
    }
}

/// One spectrum channel: eight spectra plus the pixel pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumFamily {
    /// Raw deposits, fine binning.
    pub edep: Histogram1D,
    /// Realistic energies, fine binning.
    pub real: Histogram1D,
    /// Raw deposits, instrument bins.
    pub edep_sci: Histogram1D,
    /// Realistic energies, instrument bins.
    pub real_sci: Histogram1D,
    /// Single-hit raw deposits, fine binning.
    pub edep_single: Histogram1D,
    /// Single-hit realistic energies, fine binning.
    pub real_single: Histogram1D,
    /// Single-hit raw deposits, instrument bins.
    pub edep_sci_single: Histogram1D,
    /// Single-hit realistic energies, instrument bins.
    pub real_sci_single: Histogram1D,
    /// Pixel count pattern of channels above threshold.
    pub pattern: Histogram1D,
}

impl SpectrumFamily {
    fn new(index: usize, fine: FineBinning) -> Result<Self> {
        let label = spectrum_channel_name(index);
        let fine_axis = Axis::uniform(fine.bins, 0.0, fine.max_kev)?;
        let sci_axis = Axis::variable(&SCIENCE_EDGES_KEV)?;
        let recorded = format!("Recorded energy spectrum ({label}); Energy (keV)");
        let deposited = format!("Deposited energy spectrum ({label}); Energy (keV)");
        let recorded_sci =
            format!("Recorded energy spectrum - Rebinned to SCI channels ({label}); Energy (keV)");
        let deposited_sci =
            format!("Deposited energy spectrum - Rebinned to SCI channels ({label}); Energy (keV)");

        #[allow(clippy::cast_precision_loss)]
        let pattern_axis = Axis::uniform(PIXELS_PER_MODULE, 0.0, PIXELS_PER_MODULE as f64)?;

        Ok(Self {
            edep: Histogram1D::new(format!("hEdep{index}"), &deposited, fine_axis.clone()),
            real: Histogram1D::new(format!("hReal{index}"), &recorded, fine_axis.clone()),
            edep_sci: Histogram1D::new(format!("hEdepSci{index}"), &deposited_sci, sci_axis.clone()),
            real_sci: Histogram1D::new(format!("hRealSci{index}"), &recorded_sci, sci_axis.clone()),
            edep_single: Histogram1D::new(
                format!("hEdepSingleHit{index}"),
                &deposited,
                fine_axis.clone(),
            ),
            real_single: Histogram1D::new(format!("hRealSingleHit{index}"), &recorded, fine_axis),
            edep_sci_single: Histogram1D::new(
                format!("hEdepSciSingleHit{index}"),
                &deposited_sci,
                sci_axis.clone(),
            ),
            real_sci_single: Histogram1D::new(
                format!("hRealSciSingleHit{index}"),
                &recorded_sci,
                sci_axis,
            ),
            pattern: Histogram1D::new(
                format!("hpat_{index}"),
                "Detector count pattern; Pixel #; counts;",
                pattern_axis,
            ),
        })
    }

    fn fill_all(&mut self, raw_kev: f64, realistic_kev: f64) {
        self.edep.fill(raw_kev);
        self.real.fill(realistic_kev);
        self.edep_sci.fill(raw_kev);
        self.real_sci.fill(realistic_kev);
    }

    fn fill_single(&mut self, raw_kev: f64, realistic_kev: f64) {
        self.edep_single.fill(raw_kev);
        self.real_single.fill(realistic_kev);
        self.edep_sci_single.fill(raw_kev);
        self.real_sci_single.fill(realistic_kev);
    }

    fn instrument_binned_mut(&mut self) -> [&mut Histogram1D; 4] {
        [
            &mut self.edep_sci,
            &mut self.real_sci,
            &mut self.edep_sci_single,
            &mut self.real_sci_single,
        ]
    }

    /// Histograms in output order.
    #[must_use]
    pub fn histograms(&self) -> [&Histogram1D; 9] {
        [
            &self.real,
            &self.edep,
            &self.real_sci,
            &self.edep_sci,
            &self.real_sci_single,
            &self.edep_sci_single,
            &self.real_single,
            &self.edep_single,
            &self.pattern,
        ]
    }

    fn merge(&mut self, other: &Self) -> Result<()> {
        self.edep.merge(&other.edep)?;
        self.real.merge(&other.real)?;
        self.edep_sci.merge(&other.edep_sci)?;
        self.real_sci.merge(&other.real_sci)?;
        self.edep_single.merge(&other.edep_single)?;
        self.real_single.merge(&other.real_single)?;
        self.edep_sci_single.merge(&other.edep_sci_single)?;
        self.real_sci_single.merge(&other.real_sci_single)?;
        self.pattern.merge(&other.pattern)
    }
}

/// All histograms of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumBank {
    families: Vec<SpectrumFamily>,
    /// Raw deposit per channel with signal, `hEdepSum`.
    pub edep_sum: Histogram1D,
    /// Channels with signal per module, `h1DetTotCnts`.
    pub detector_counts: Histogram1D,
    /// Channels with signal per channel index, `h1PixelTotCnts`.
    pub pixel_counts: Histogram1D,
    /// Incident-plane hit map, `h2xy`.
    pub hit_map: Histogram2D,
    /// Charge-collection monitoring.
    pub diagnostics: CollectionDiagnostics,
    normalized: bool,
}

impl SpectrumBank {
    /// Allocates every histogram of a run.
    ///
    /// # Errors
    /// Returns an error if the fine binning is invalid.
    pub fn new(fine: FineBinning, constants: &CalibrationConstants) -> Result<Self> {
        let families = (0..NUM_SPECTRUM_CHANNELS)
            .map(|i| SpectrumFamily::new(i, fine))
            .collect::<Result<Vec<_>>>()?;

        #[allow(clippy::cast_precision_loss)]
        let (modules, channels) = (NUM_MODULES as f64, NUM_CHANNELS as f64);

        Ok(Self {
            families,
            edep_sum: Histogram1D::new(
                "hEdepSum",
                "Detector summed energy spectrum; Energy (keV); Counts;",
                Axis::uniform(EDEP_SUM_BINS, 0.0, EDEP_SUM_MAX_KEV)?,
            ),
            detector_counts: Histogram1D::new(
                "h1DetTotCnts",
                "Detector total counts; Detector ID; counts;",
                Axis::uniform(NUM_MODULES, 0.0, modules)?,
            ),
            pixel_counts: Histogram1D::new(
                "h1PixelTotCnts",
                "Pixel total counts; Pixel ID; counts;",
                Axis::uniform(NUM_CHANNELS, 0.0, channels)?,
            ),
            hit_map: Histogram2D::new(
                "h2xy",
                "Locations of hits; X (mm); Y(mm)",
                Axis::uniform(1800, -90.0, 90.0)?,
                Axis::uniform(1800, -90.0, 90.0)?,
            ),
            diagnostics: CollectionDiagnostics::new(constants)?,
            normalized: false,
        })
    }

    /// Family of spectrum channel `index` (module, or one of the virtual channels).
    #[must_use]
    pub fn family(&self, index: usize) -> Option<&SpectrumFamily> {
        self.families.get(index)
    }

    /// All families in channel order.
    #[must_use]
    pub fn families(&self) -> &[SpectrumFamily] {
        &self.families
    }

    /// True once the instrument-binned spectra were width-normalized.
    #[must_use]
    pub fn is_normalized(&self) -> bool {
        self.normalized
    }

    /// Fills the all-hits spectra of the channel's module, the summed channel
    /// and, for big pixels outside CFL/BKG, the big-pixel channel. Also counts
    /// the channel in the global totals.
    #[allow(clippy::cast_precision_loss)]
    pub fn fill_channel(&mut self, channel: ChannelId, raw_kev: f64, realistic_kev: f64) {
        self.edep_sum.fill(raw_kev);
        self.detector_counts.fill(channel.module() as f64);
        self.pixel_counts.fill(channel.index() as f64);
        for target in Self::targets(channel) {
            self.families[target].fill_all(raw_kev, realistic_kev);
        }
    }

    /// Fills the single-hit spectra, same routing as [`Self::fill_channel`].
    pub fn fill_single_hit(&mut self, channel: ChannelId, raw_kev: f64, realistic_kev: f64) {
        for target in Self::targets(channel) {
            self.families[target].fill_single(raw_kev, realistic_kev);
        }
    }

    /// Counts a channel above threshold in the pixel patterns.
    #[allow(clippy::cast_precision_loss)]
    pub fn fill_pattern(&mut self, channel: ChannelId) {
        let pixel = channel.pixel() as f64;
        for target in Self::targets(channel) {
            self.families[target].pattern.fill(pixel);
        }
    }

    /// Records an incident-plane crossing at instrument offsets `(y, z)`.
    pub fn fill_hit_map(&mut self, y_mm: f64, z_mm: f64) {
        self.hit_map.fill(y_mm, z_mm);
    }

    /// Records one charge-collection evaluation.
    pub fn record_collection(&mut self, response: &CollectionResponse) {
        self.diagnostics.record(response);
    }

    fn targets(channel: ChannelId) -> impl Iterator<Item = usize> {
        let big = channel.in_big_pixel_sum().then_some(BIG_PIXEL_CHANNEL);
        [channel.module(), SUMMED_CHANNEL].into_iter().chain(big)
    }

    /// Divides every instrument-binned spectrum by its bin widths, turning
    /// counts into counts per keV. Runs at most once per bank.
    pub fn normalize_instrument_spectra(&mut self) {
        if self.normalized {
            return;
        }
        for family in &mut self.families {
            for histogram in family.instrument_binned_mut() {
                histogram.normalize_by_width();
            }
        }
        self.normalized = true;
    }

    /// Adds another bank into this one.
    ///
    /// # Errors
    /// Returns an error if the layouts differ or only one bank is normalized.
    pub fn merge(&mut self, other: &Self) -> Result<()> {
        if self.normalized != other.normalized {
            return Err(Error::Config(
                "cannot merge a normalized spectrum bank with an unnormalized one".to_string(),
            ));
        }
        if self.families.len() != other.families.len() {
            return Err(Error::Config(format!(
                "spectrum bank size mismatch: {} vs {}",
                self.families.len(),
                other.families.len()
            )));
        }
        for (mine, theirs) in self.families.iter_mut().zip(&other.families) {
            mine.merge(theirs)?;
        }
        self.edep_sum.merge(&other.edep_sum)?;
        self.detector_counts.merge(&other.detector_counts)?;
        self.pixel_counts.merge(&other.pixel_counts)?;
        self.hit_map.merge(&other.hit_map)?;
        self.diagnostics.merge(&other.diagnostics)
    }

    /// Iterates over every 1-D histogram in output order.
    pub fn histograms(&self) -> impl Iterator<Item = &Histogram1D> {
        self.families
            .iter()
            .flat_map(SpectrumFamily::histograms)
            .chain([
                &self.edep_sum,
                &self.detector_counts,
                &self.pixel_counts,
                &self.diagnostics.depth,
                &self.diagnostics.efficiency,
                &self.diagnostics.near_surface,
            ])
    }

    /// Looks up a 1-D histogram by name.
    #[must_use]
    pub fn histogram(&self, name: &str) -> Option<&Histogram1D> {
        self.histograms().find(|h| h.name() == name)
    }

    /// Writes every histogram to `sink` under [`HISTOGRAM_DIRECTORY`].
    ///
    /// # Errors
    /// Propagates sink failures.
    pub fn write_to(&self, sink: &mut dyn RunSink) -> Result<()> {
        for histogram in self.histograms() {
            sink.write_histogram(HISTOGRAM_DIRECTORY, histogram)?;
        }
        sink.write_histogram_2d(HISTOGRAM_DIRECTORY, &self.hit_map)
    }
}
