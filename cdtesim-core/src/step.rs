//! Step-level data handed over by the particle-transport engine.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Geant4 process type for plain transportation.
pub const PROCESS_TRANSPORTATION: i32 = 1;
/// Geant4 process type "not defined".
pub const PROCESS_NOT_DEFINED: i32 = 0;

/// A 3-D vector. Positions are in mm, directions are unit vectors.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    /// Creates a new vector.
    #[inline]
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Returns the components as an array.
    #[inline]
    #[must_use]
    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    /// Returns the Euclidean length.
    #[inline]
    #[must_use]
    pub fn norm(self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

impl From<[f64; 3]> for Vec3 {
    fn from(value: [f64; 3]) -> Self {
        Self::new(value[0], value[1], value[2])
    }
}

/// Which kind of volume a step occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum VolumeKind {
    /// Sensitive CdTe pixel. The raw id is validated by the accumulator.
    Pixel { channel: i32 },
    /// Reference plane in front of the detectors that records incident particles.
    IncidentPlane,
    /// Collimator grid material.
    Grid,
    /// Any other volume.
    Passive,
}

/// Physics process that limited a step (Geant4 type/subtype numbering).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PhysicsProcess {
    /// Process type, e.g. 2 = electromagnetic.
    pub kind: i32,
    /// Process subtype, e.g. 12 = photoelectric, 13 = Compton.
    pub subtype: i32,
}

impl PhysicsProcess {
    /// True for processes that represent an actual interaction.
    #[must_use]
    pub fn is_interaction(&self) -> bool {
        self.kind != PROCESS_TRANSPORTATION && self.kind != PROCESS_NOT_DEFINED
    }
}

/// One transport step as seen by the response pipeline.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StepDeposit {
    /// Volume the step belongs to.
    pub volume: VolumeKind,
    /// Energy deposited in this step (keV).
    pub raw_energy_kev: f64,
    /// Pre-step kinetic energy (keV).
    pub kinetic_energy_kev: f64,
    /// Interaction position (mm), taken at the post-step point.
    pub position: Vec3,
    /// Momentum direction of the track.
    pub direction: Vec3,
    /// Global time of the step (ns).
    pub time_ns: f64,
    /// Track id.
    pub track_id: i32,
    /// Parent track id (0 for primaries).
    pub parent_id: i32,
    /// PDG code of the particle.
    pub pdg: i32,
    /// Process that limited the step, if known.
    pub process: Option<PhysicsProcess>,
}

impl StepDeposit {
    /// Creates a deposit step in a pixel with the remaining fields zeroed.
    #[must_use]
    pub fn in_pixel(channel: i32, raw_energy_kev: f64, position: Vec3) -> Self {
        Self {
            volume: VolumeKind::Pixel { channel },
            raw_energy_kev,
            kinetic_energy_kev: 0.0,
            position,
            direction: Vec3::default(),
            time_ns: 0.0,
            track_id: 1,
            parent_id: 0,
            pdg: 22,
            process: None,
        }
    }

    /// Sets the track and parent ids.
    #[must_use]
    pub fn with_track(mut self, track_id: i32, parent_id: i32) -> Self {
        self.track_id = track_id;
        self.parent_id = parent_id;
        self
    }

    /// Sets the limiting process.
    #[must_use]
    pub fn with_process(mut self, kind: i32, subtype: i32) -> Self {
        self.process = Some(PhysicsProcess { kind, subtype });
        self
    }
}

/// Source kinematics of the current event, supplied at event start.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IncidentKinematics {
    /// Event id assigned by the transport engine.
    pub event_id: i64,
    /// Gun position (mm).
    pub position: Vec3,
    /// Gun direction.
    pub direction: Vec3,
    /// Gun energy (keV).
    pub energy_kev: f64,
}

/// What the transport engine should do with the current track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction {
    /// Keep tracking.
    Continue,
    /// Stop this track and all its secondaries.
    KillTrackAndSecondaries,
}
