//! Channel, module and pixel addressing.
//!
//! The detector has 32 modules of 12 pixels each. A channel is the flat index
//! `module * 12 + pixel`; every module/pixel lookup in the workspace goes
//! through [`ChannelId`] so that this arithmetic lives in one place.

use crate::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Number of detector modules.
pub const NUM_MODULES: usize = 32;
/// Pixels per module.
pub const PIXELS_PER_MODULE: usize = 12;
/// Total number of sensitive channels.
pub const NUM_CHANNELS: usize = NUM_MODULES * PIXELS_PER_MODULE;
/// Pixels `0..8` of each module are the large pixels.
pub const BIG_PIXELS_PER_MODULE: usize = 8;
/// Calibration-source module, excluded from the big-pixel sum.
pub const CFL_MODULE: usize = 8;
/// Background module, excluded from the big-pixel sum.
pub const BKG_MODULE: usize = 9;

/// Index of the all-modules-summed virtual channel.
pub const SUMMED_CHANNEL: usize = NUM_MODULES;
/// Index of the big-pixels-except-CFL-and-BKG virtual channel.
pub const BIG_PIXEL_CHANNEL: usize = NUM_MODULES + 1;
/// Modules plus the two virtual channels.
pub const NUM_SPECTRUM_CHANNELS: usize = NUM_MODULES + 2;

/// A validated sensitive channel index in `0..NUM_CHANNELS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChannelId(u16);

impl ChannelId {
    /// Validates a raw channel id coming from the transport engine.
    ///
    /// # Errors
    /// Returns [`Error::InvalidChannel`] when `raw` is outside `0..384`.
    pub fn new(raw: i32) -> Result<Self> {
        match u16::try_from(raw) {
            Ok(value) if usize::from(value) < NUM_CHANNELS => Ok(Self(value)),
            _ => Err(Error::InvalidChannel(raw)),
        }
    }

    /// Builds a channel from module and pixel indices.
    ///
    /// # Errors
    /// Returns [`Error::InvalidChannel`] when either index is out of range.
    pub fn from_module_pixel(module: usize, pixel: usize) -> Result<Self> {
        if module >= NUM_MODULES || pixel >= PIXELS_PER_MODULE {
            let raw = module * PIXELS_PER_MODULE + pixel;
            return Err(Error::InvalidChannel(i32::try_from(raw).unwrap_or(i32::MAX)));
        }
        Ok(Self((module * PIXELS_PER_MODULE + pixel) as u16))
    }

    /// Returns the flat channel index.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        usize::from(self.0)
    }

    /// Module this channel belongs to.
    #[inline]
    #[must_use]
    pub fn module(self) -> usize {
        self.index() / PIXELS_PER_MODULE
    }

    /// Pixel index within the module.
    #[inline]
    #[must_use]
    pub fn pixel(self) -> usize {
        self.index() % PIXELS_PER_MODULE
    }

    /// True for pixels `0..8`.
    #[inline]
    #[must_use]
    pub fn is_big_pixel(self) -> bool {
        self.pixel() < BIG_PIXELS_PER_MODULE
    }

    /// True when the channel feeds the big-pixel virtual channel.
    #[inline]
    #[must_use]
    pub fn in_big_pixel_sum(self) -> bool {
        let module = self.module();
        self.is_big_pixel() && module != CFL_MODULE && module != BKG_MODULE
    }

    /// Iterates over all sensitive channels in index order.
    pub fn all() -> impl Iterator<Item = Self> {
        (0..NUM_CHANNELS as u16).map(Self)
    }

    /// Iterates over the channels of one module.
    pub fn in_module(module: usize) -> impl Iterator<Item = Self> {
        let start = module.min(NUM_MODULES) * PIXELS_PER_MODULE;
        let end = (start + PIXELS_PER_MODULE).min(NUM_CHANNELS);
        (start as u16..end as u16).map(Self)
    }
}

/// Display name of a spectrum channel (module or virtual channel).
#[must_use]
pub fn spectrum_channel_name(index: usize) -> String {
    match index {
        CFL_MODULE => "CFL".to_string(),
        BKG_MODULE => "BKG".to_string(),
        SUMMED_CHANNEL => "Detector summed".to_string(),
        BIG_PIXEL_CHANNEL => "Big pixels except CFL and BKG".to_string(),
        _ => format!("D{index}"),
    }
}
