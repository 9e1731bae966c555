//! Fixed-layout 1-D and 2-D histograms.
//!
//! Histograms are allocated once with their final binning and only ever
//! accumulate. Out-of-range fills go to dedicated underflow/overflow
//! counters so the in-range contents stay exact.

use crate::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Binning of one histogram axis.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Axis {
    /// `bins` equal-width bins over `[min, max)`.
    Uniform { bins: usize, min: f64, max: f64 },
    /// Arbitrary strictly increasing edges.
    Variable { edges: Vec<f64> },
}

/// Where a value lands on an axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinSlot {
    Underflow,
    Bin(usize),
    Overflow,
}

impl Axis {
    /// Creates a uniform axis.
    ///
    /// # Errors
    /// Returns an error for zero bins or an empty/inverted range.
    pub fn uniform(bins: usize, min: f64, max: f64) -> Result<Self> {
        if bins == 0 || !(max > min) {
            return Err(Error::Config(format!(
                "invalid uniform axis: {bins} bins over [{min}, {max})"
            )));
        }
        Ok(Self::Uniform { bins, min, max })
    }

    /// Creates an axis from explicit bin edges.
    ///
    /// # Errors
    /// Returns an error unless there are at least two strictly increasing edges.
    pub fn variable(edges: &[f64]) -> Result<Self> {
        if edges.len() < 2 || edges.windows(2).any(|w| !(w[1] > w[0])) {
            return Err(Error::Config(
                "variable axis needs at least two strictly increasing edges".to_string(),
            ));
        }
        Ok(Self::Variable {
            edges: edges.to_vec(),
        })
    }

    /// Number of in-range bins.
    #[must_use]
    pub fn bins(&self) -> usize {
        match self {
            Self::Uniform { bins, .. } => *bins,
            Self::Variable { edges } => edges.len() - 1,
        }
    }

    /// Lower edge of bin `i`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn lower_edge(&self, i: usize) -> f64 {
        match self {
            Self::Uniform { bins, min, max } => min + (max - min) * (i as f64) / (*bins as f64),
            Self::Variable { edges } => edges[i],
        }
    }

    /// Upper edge of bin `i`.
    #[must_use]
    pub fn upper_edge(&self, i: usize) -> f64 {
        self.lower_edge(i + 1)
    }

    /// Width of bin `i`.
    #[must_use]
    pub fn bin_width(&self, i: usize) -> f64 {
        self.upper_edge(i) - self.lower_edge(i)
    }

    /// All bin edges, `bins() + 1` values.
    #[must_use]
    pub fn edges(&self) -> Vec<f64> {
        (0..=self.bins()).map(|i| self.lower_edge(i)).collect()
    }

    /// Locates `value` on the axis. NaN counts as underflow.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn slot(&self, value: f64) -> BinSlot {
        match self {
            Self::Uniform { bins, min, max } => {
                if value.is_nan() || value < *min {
                    BinSlot::Underflow
                } else if value >= *max {
                    BinSlot::Overflow
                } else {
                    let bin = ((value - min) * (*bins as f64) / (max - min)) as usize;
                    BinSlot::Bin(bin.min(bins - 1))
                }
            }
            Self::Variable { edges } => {
                if value.is_nan() || value < edges[0] {
                    BinSlot::Underflow
                } else if value >= edges[edges.len() - 1] {
                    BinSlot::Overflow
                } else {
                    BinSlot::Bin(edges.partition_point(|&edge| edge <= value) - 1)
                }
            }
        }
    }
}

/// A 1-D histogram with `f64` contents.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Histogram1D {
    name: String,
    title: String,
    axis: Axis,
    contents: Vec<f64>,
    underflow: f64,
    overflow: f64,
    entries: u64,
}

impl Histogram1D {
    /// Creates an empty histogram.
    #[must_use]
    pub fn new(name: impl Into<String>, title: impl Into<String>, axis: Axis) -> Self {
        let bins = axis.bins();
        Self {
            name: name.into(),
            title: title.into(),
            axis,
            contents: vec![0.0; bins],
            underflow: 0.0,
            overflow: 0.0,
            entries: 0,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn axis(&self) -> &Axis {
        &self.axis
    }

    /// In-range bin contents.
    #[must_use]
    pub fn contents(&self) -> &[f64] {
        &self.contents
    }

    /// Content of bin `i`.
    #[must_use]
    pub fn content(&self, i: usize) -> f64 {
        self.contents[i]
    }

    #[must_use]
    pub fn underflow(&self) -> f64 {
        self.underflow
    }

    #[must_use]
    pub fn overflow(&self) -> f64 {
        self.overflow
    }

    /// Number of fill calls, including out-of-range ones.
    #[must_use]
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Sum of in-range contents.
    #[must_use]
    pub fn integral(&self) -> f64 {
        self.contents.iter().sum()
    }

    /// Adds one count at `value`.
    pub fn fill(&mut self, value: f64) {
        self.fill_weighted(value, 1.0);
    }

    /// Adds `weight` at `value`.
    pub fn fill_weighted(&mut self, value: f64, weight: f64) {
        self.entries += 1;
        match self.axis.slot(value) {
            BinSlot::Underflow => self.underflow += weight,
            BinSlot::Overflow => self.overflow += weight,
            BinSlot::Bin(i) => self.contents[i] += weight,
        }
    }

    /// Divides every bin by its width, turning counts into a density per axis unit.
    pub fn normalize_by_width(&mut self) {
        for (i, content) in self.contents.iter_mut().enumerate() {
            let width = self.axis.bin_width(i);
            if width > 0.0 {
                *content /= width;
            }
        }
    }

    /// Adds the contents of `other` into `self`.
    ///
    /// # Errors
    /// Returns [`Error::AxisMismatch`] if the binning differs.
    pub fn merge(&mut self, other: &Self) -> Result<()> {
        if self.axis != other.axis {
            return Err(Error::AxisMismatch {
                name: self.name.clone(),
                reason: format!("cannot merge '{}' with different binning", other.name),
            });
        }
        for (a, b) in self.contents.iter_mut().zip(&other.contents) {
            *a += b;
        }
        self.underflow += other.underflow;
        self.overflow += other.overflow;
        self.entries += other.entries;
        Ok(())
    }
}

/// A 2-D histogram with `f64` contents, stored row-major as `[y][x]`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Histogram2D {
    name: String,
    title: String,
    x_axis: Axis,
    y_axis: Axis,
    contents: Vec<f64>,
    out_of_range: f64,
    entries: u64,
}

impl Histogram2D {
    /// Creates an empty 2-D histogram.
    #[must_use]
    pub fn new(name: impl Into<String>, title: impl Into<String>, x_axis: Axis, y_axis: Axis) -> Self {
        let len = x_axis.bins() * y_axis.bins();
        Self {
            name: name.into(),
            title: title.into(),
            x_axis,
            y_axis,
            contents: vec![0.0; len],
            out_of_range: 0.0,
            entries: 0,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn x_axis(&self) -> &Axis {
        &self.x_axis
    }

    #[must_use]
    pub fn y_axis(&self) -> &Axis {
        &self.y_axis
    }

    /// Content of cell `(ix, iy)`.
    #[must_use]
    pub fn content(&self, ix: usize, iy: usize) -> f64 {
        self.contents[iy * self.x_axis.bins() + ix]
    }

    /// Row-major contents.
    #[must_use]
    pub fn contents(&self) -> &[f64] {
        &self.contents
    }

    /// Weight of fills that fell outside either axis.
    #[must_use]
    pub fn out_of_range(&self) -> f64 {
        self.out_of_range
    }

    #[must_use]
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Adds one count at `(x, y)`.
    pub fn fill(&mut self, x: f64, y: f64) {
        self.entries += 1;
        match (self.x_axis.slot(x), self.y_axis.slot(y)) {
            (BinSlot::Bin(ix), BinSlot::Bin(iy)) => {
                let width = self.x_axis.bins();
                self.contents[iy * width + ix] += 1.0;
            }
            _ => self.out_of_range += 1.0,
        }
    }

    /// Iterates over non-empty cells as `(ix, iy, content)`.
    pub fn non_empty_cells(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        let width = self.x_axis.bins();
        self.contents
            .iter()
            .enumerate()
            .filter(|(_, &value)| value != 0.0)
            .map(move |(idx, &value)| (idx % width, idx / width, value))
    }

    /// Adds the contents of `other` into `self`.
    ///
    /// # Errors
    /// Returns [`Error::AxisMismatch`] if the binning differs.
    pub fn merge(&mut self, other: &Self) -> Result<()> {
        if self.x_axis != other.x_axis || self.y_axis != other.y_axis {
            return Err(Error::AxisMismatch {
                name: self.name.clone(),
                reason: format!("cannot merge '{}' with different binning", other.name),
            });
        }
        for (a, b) in self.contents.iter_mut().zip(&other.contents) {
            *a += b;
        }
        self.out_of_range += other.out_of_range;
        self.entries += other.entries;
        Ok(())
    }
}
