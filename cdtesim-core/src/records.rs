//! Output table rows produced by a run.

use crate::channel::{NUM_CHANNELS, NUM_MODULES};
use crate::ledger::HitLedger;
use crate::step::IncidentKinematics;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Instrument-bin value meaning "no signal in this channel".
pub const NO_SIGNAL: i32 = -1;
/// Realistic-energy value meaning "no signal in this channel".
pub const NO_SIGNAL_ENERGY: f64 = -1.0;

/// Per-event aggregate row (`events` table).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EventRecord {
    pub event_id: i64,
    /// Raw deposited energy per channel (keV).
    pub edep: Vec<f64>,
    /// Instrument energy bin per channel, [`NO_SIGNAL`] when nothing was deposited.
    pub sci: Vec<i32>,
    /// Collection-weighted energy per channel (keV).
    pub collected: Vec<f64>,
    /// Energy after the charge-statistics smear (keV).
    pub charge: Vec<f64>,
    /// Realistic energy after both smears (keV), [`NO_SIGNAL_ENERGY`] when nothing was deposited.
    pub realistic: Vec<f64>,
    pub gun_energy_kev: f64,
    pub gun_position: [f64; 3],
    pub gun_direction: [f64; 3],
    pub num_tracks: u32,
    /// Channels above threshold, per module.
    pub n_hits: [u32; NUM_MODULES],
    pub hits: HitLedger,
    pub total_steps: u64,
    /// Near-surface constants in effect for this event (debug jitter mode only).
    pub near_surface: Option<(f64, f64)>,
}

impl EventRecord {
    /// Creates a row with all channel columns at their empty values.
    #[must_use]
    pub fn empty(kinematics: &IncidentKinematics, ledger_capacity: usize) -> Self {
        Self {
            event_id: kinematics.event_id,
            edep: vec![0.0; NUM_CHANNELS],
            sci: vec![NO_SIGNAL; NUM_CHANNELS],
            collected: vec![0.0; NUM_CHANNELS],
            charge: vec![0.0; NUM_CHANNELS],
            realistic: vec![NO_SIGNAL_ENERGY; NUM_CHANNELS],
            gun_energy_kev: kinematics.energy_kev,
            gun_position: kinematics.position.to_array(),
            gun_direction: kinematics.direction.to_array(),
            num_tracks: 0,
            n_hits: [0; NUM_MODULES],
            hits: HitLedger::with_capacity(ledger_capacity),
            total_steps: 0,
            near_surface: None,
        }
    }
}

/// Particle crossing the incident reference plane (`inp` table).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IncidentParticleRecord {
    pub event_id: i64,
    /// Position relative to the instrument origin (mm).
    pub position: [f64; 3],
    pub gun_energy_kev: f64,
    /// Tracks seen so far in the event.
    pub track_index: u32,
    /// Pixel within the module, -1 when not resolved.
    pub pixel_id: i32,
    /// Module index, -1 when not resolved.
    pub detector_id: i32,
    pub direction: [f64; 3],
    /// Incidence angle to the x axis (degrees).
    pub theta_deg: f64,
    /// Kinetic energy at the plane (keV).
    pub energy_kev: f64,
    pub pdg: i32,
    pub parent_id: i32,
}

/// Source kinematics of one event (`source` table).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SourceRecord {
    pub event_id: i64,
    pub position: [f64; 3],
    pub direction: [f64; 3],
    pub energy_kev: f64,
}

impl From<&IncidentKinematics> for SourceRecord {
    fn from(value: &IncidentKinematics) -> Self {
        Self {
            event_id: value.event_id,
            position: value.position.to_array(),
            direction: value.direction.to_array(),
            energy_kev: value.energy_kev,
        }
    }
}

/// Interaction process seen in a sensitive volume (`phys` table).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProcessRecord {
    pub process_type: i32,
    pub process_subtype: i32,
    pub gun_energy_kev: f64,
    pub pdg: i32,
    pub parent_id: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::Vec3;

    #[test]
    fn test_empty_event_record() {
        let kin = IncidentKinematics {
            event_id: 42,
            position: Vec3::new(1.0, 2.0, 3.0),
            direction: Vec3::new(-1.0, 0.0, 0.0),
            energy_kev: 30.0,
        };
        let record = EventRecord::empty(&kin, 16);
        assert_eq!(record.event_id, 42);
        assert_eq!(record.edep.len(), NUM_CHANNELS);
        assert!(record.sci.iter().all(|&bin| bin == NO_SIGNAL));
        assert_eq!(record.gun_position, [1.0, 2.0, 3.0]);
        assert_eq!(record.hits.capacity(), 16);
    }

    #[test]
    fn test_source_record_from_kinematics() {
        let kin = IncidentKinematics {
            event_id: 7,
            position: Vec3::new(0.0, 0.0, 500.0),
            direction: Vec3::new(0.0, 0.0, -1.0),
            energy_kev: 81.0,
        };
        let row = SourceRecord::from(&kin);
        assert_eq!(row.event_id, 7);
        assert_eq!(row.direction, [0.0, 0.0, -1.0]);
        assert!((row.energy_kev - 81.0).abs() < f64::EPSILON);
    }
}
