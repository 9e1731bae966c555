//! Instrument ("science") energy channels.
//!
//! The instrument reports counts in 32 non-uniform energy bins. Classifying
//! a single energy clamps: bin 0 holds everything below 4 keV and bin 31
//! everything from 150 keV up. Spectra filled by value over the same edges
//! send values outside 0-250 keV to underflow/overflow instead.

/// Number of instrument energy bins.
pub const NUM_SCIENCE_BINS: usize = 32;

/// Bin edges in keV. `SCIENCE_EDGES_KEV[i]..SCIENCE_EDGES_KEV[i + 1]` is bin `i`.
pub const SCIENCE_EDGES_KEV: [f64; NUM_SCIENCE_BINS + 1] = [
    0.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0, 18.0, 20.0, 22.0,
    25.0, 28.0, 32.0, 36.0, 40.0, 45.0, 50.0, 56.0, 63.0, 70.0, 76.0, 84.0, 100.0, 120.0, 150.0,
    250.0,
];

const LOWEST_SIGNAL_KEV: f64 = 4.0;
const HIGHEST_BIN_START_KEV: f64 = 150.0;

/// Maps an energy (keV) to its instrument bin.
///
/// Energies below 4 keV (including negative noise excursions) map to bin 0,
/// energies at or above 150 keV map to bin 31.
#[must_use]
pub fn science_bin(energy_kev: f64) -> usize {
    if energy_kev.is_nan() || energy_kev < LOWEST_SIGNAL_KEV {
        return 0;
    }
    if energy_kev >= HIGHEST_BIN_START_KEV {
        return NUM_SCIENCE_BINS - 1;
    }
    // First edge strictly above the energy; the bin starts one edge earlier.
    SCIENCE_EDGES_KEV[..NUM_SCIENCE_BINS].partition_point(|&edge| edge <= energy_kev) - 1
}

/// Physical width of bin `bin` in keV, `None` past the last bin.
#[must_use]
pub fn science_bin_width(bin: usize) -> Option<f64> {
    let lo = SCIENCE_EDGES_KEV.get(bin)?;
    let hi = SCIENCE_EDGES_KEV.get(bin + 1)?;
    Some(hi - lo)
}
