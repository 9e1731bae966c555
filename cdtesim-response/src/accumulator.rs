//! Per-event step accumulation.

use crate::collection::CollectionResponse;
use cdtesim_core::{
    ChannelId, HitLedger, IncidentKinematics, IncidentParticleRecord, StepDeposit, NUM_CHANNELS,
};
use std::collections::HashSet;

/// y offset of the instrument origin for incident-plane positions (mm).
pub const INCIDENT_ORIGIN_Y_MM: f64 = 103.1;
/// z offset of the instrument origin for incident-plane positions (mm).
pub const INCIDENT_ORIGIN_Z_MM: f64 = 127.5;

/// Energy registers of one event.
///
/// Reset at every event start; energies only grow while the event is open.
#[derive(Debug, Clone)]
pub struct EventAccumulator {
    raw: [f64; NUM_CHANNELS],
    collected: [f64; NUM_CHANNELS],
    kinematics: IncidentKinematics,
    ledger: HitLedger,
    tracks: HashSet<i32>,
    step_count: u64,
}

impl EventAccumulator {
    /// Creates an accumulator whose hit ledger holds `ledger_capacity` hits.
    #[must_use]
    pub fn new(ledger_capacity: usize) -> Self {
        Self {
            raw: [0.0; NUM_CHANNELS],
            collected: [0.0; NUM_CHANNELS],
            kinematics: IncidentKinematics::default(),
            ledger: HitLedger::with_capacity(ledger_capacity),
            tracks: HashSet::new(),
            step_count: 0,
        }
    }

    /// Clears all registers and captures the kinematics of the new event.
    pub fn reset(&mut self, kinematics: IncidentKinematics) {
        self.raw.fill(0.0);
        self.collected.fill(0.0);
        self.kinematics = kinematics;
        self.ledger.clear();
        self.tracks.clear();
        self.step_count = 0;
    }

    /// Counts the step and remembers its track id.
    pub fn observe(&mut self, step: &StepDeposit) {
        self.step_count += 1;
        self.tracks.insert(step.track_id);
    }

    /// Adds a sensitive deposit. Steps with energy also go to the ledger
    /// while it has room.
    pub fn deposit(&mut self, channel: ChannelId, step: &StepDeposit, response: &CollectionResponse) {
        let c = channel.index();
        self.raw[c] += step.raw_energy_kev;
        self.collected[c] += step.raw_energy_kev * response.weight();
        if step.raw_energy_kev > 0.0 {
            let pixel = i32::try_from(c).unwrap_or(i32::MAX);
            self.ledger.push(
                step.position.to_array(),
                step.raw_energy_kev,
                step.time_ns,
                step.pdg,
                step.parent_id,
                pixel,
            );
        }
    }

    /// Builds the incident-plane row for a step crossing the reference volume.
    #[must_use]
    pub fn incident_row(&self, step: &StepDeposit) -> IncidentParticleRecord {
        let v = step.direction;
        let theta_deg = (v.y * v.y + v.z * v.z).sqrt().min(1.0).asin().to_degrees();
        IncidentParticleRecord {
            event_id: self.kinematics.event_id,
            position: [
                step.position.x,
                step.position.y - INCIDENT_ORIGIN_Y_MM,
                step.position.z - INCIDENT_ORIGIN_Z_MM,
            ],
            gun_energy_kev: self.kinematics.energy_kev,
            track_index: self.track_count(),
            pixel_id: -1,
            detector_id: -1,
            direction: v.to_array(),
            theta_deg,
            energy_kev: step.kinetic_energy_kev,
            pdg: step.pdg,
            parent_id: step.parent_id,
        }
    }

    /// Raw deposited energy per channel (keV).
    #[must_use]
    pub fn raw(&self) -> &[f64; NUM_CHANNELS] {
        &self.raw
    }

    /// Collection-weighted energy per channel (keV).
    #[must_use]
    pub fn collected(&self) -> &[f64; NUM_CHANNELS] {
        &self.collected
    }

    /// Kinematics captured at event start.
    #[must_use]
    pub fn kinematics(&self) -> &IncidentKinematics {
        &self.kinematics
    }

    /// Hit ledger of the event.
    #[must_use]
    pub fn ledger(&self) -> &HitLedger {
        &self.ledger
    }

    /// Number of distinct tracks seen.
    #[must_use]
    pub fn track_count(&self) -> u32 {
        u32::try_from(self.tracks.len()).unwrap_or(u32::MAX)
    }

    /// Number of steps seen, in any volume.
    #[must_use]
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// True if any channel received a positive raw deposit.
    #[must_use]
    pub fn has_deposit(&self) -> bool {
        self.raw.iter().any(|&e| e > 0.0)
    }
}
