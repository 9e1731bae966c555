//! Bounded per-event hit ledger in Structure of Arrays (`SoA`) layout.
//!
//! The ledger is allocated once with a fixed capacity and reused across
//! events. Entries past the capacity are dropped silently; aggregate
//! energies are tracked elsewhere and stay correct.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default ledger capacity per event.
pub const DEFAULT_LEDGER_CAPACITY: usize = 10_000;

/// Per-step hit records of one event.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HitLedger {
    /// Hit x positions (mm).
    pub x: Vec<f64>,
    /// Hit y positions (mm).
    pub y: Vec<f64>,
    /// Hit z positions (mm).
    pub z: Vec<f64>,
    /// Deposited energy (keV).
    pub energy: Vec<f64>,
    /// Global time (ns).
    pub time: Vec<f64>,
    /// PDG code.
    pub pdg: Vec<i32>,
    /// Parent track id.
    pub parent: Vec<i32>,
    /// Channel index.
    pub pixel: Vec<i32>,
    capacity: usize,
    dropped: u64,
}

impl Default for HitLedger {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LEDGER_CAPACITY)
    }
}

impl HitLedger {
    /// Creates an empty ledger that holds at most `capacity` hits.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            x: Vec::with_capacity(capacity),
            y: Vec::with_capacity(capacity),
            z: Vec::with_capacity(capacity),
            energy: Vec::with_capacity(capacity),
            time: Vec::with_capacity(capacity),
            pdg: Vec::with_capacity(capacity),
            parent: Vec::with_capacity(capacity),
            pixel: Vec::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    /// Returns the number of recorded hits.
    #[must_use]
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// Returns true if no hit is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Maximum number of hits kept per event.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Hits that arrived after the ledger was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// True once the ledger has reached its capacity.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Clears all columns, keeping the allocation.
    pub fn clear(&mut self) {
        self.x.clear();
        self.y.clear();
        self.z.clear();
        self.energy.clear();
        self.time.clear();
        self.pdg.clear();
        self.parent.clear();
        self.pixel.clear();
        self.dropped = 0;
    }

    /// Appends a hit. Returns false when the ledger is full.
    #[allow(clippy::too_many_arguments)]
    pub fn push(
        &mut self,
        position: [f64; 3],
        energy: f64,
        time: f64,
        pdg: i32,
        parent: i32,
        pixel: i32,
    ) -> bool {
        if self.is_full() {
            self.dropped += 1;
            return false;
        }
        self.x.push(position[0]);
        self.y.push(position[1]);
        self.z.push(position[2]);
        self.energy.push(energy);
        self.time.push(time);
        self.pdg.push(pdg);
        self.parent.push(parent);
        self.pixel.push(pixel);
        true
    }
}
