//! Step-trace record types and the fixed-size binary layout.
//!
//! Every record is [`RECORD_SIZE`] bytes, little-endian, with the tag in
//! byte 0:
//!
//! | tag | record | payload |
//! |-----|--------|---------|
//! | 1 | event begin | `event_id: i64 @8`, `position: 3×f64 @16`, `direction: 3×f64 @40`, `energy: f64 @64` |
//! | 2 | step | `volume: u8 @1`, `channel: i32 @4`, `track: i32 @8`, `parent: i32 @12`, `pdg: i32 @16`, `process: i32 @20`, `subtype: i32 @24`, `edep: f64 @32`, `kinetic: f64 @40`, `position: 3×f64 @48`, `direction: 3×f64 @72`, `time: f64 @96` |
//! | 3 | event end | `event_id: i64 @8` |

use crate::{Error, Result};
use cdtesim_core::{IncidentKinematics, PhysicsProcess, StepDeposit, Vec3, VolumeKind};
use serde::{Deserialize, Serialize};

/// Size of one binary record in bytes.
pub const RECORD_SIZE: usize = 112;

const TAG_EVENT_BEGIN: u8 = 1;
const TAG_STEP: u8 = 2;
const TAG_EVENT_END: u8 = 3;

const VOLUME_PASSIVE: u8 = 0;
const VOLUME_PIXEL: u8 = 1;
const VOLUME_INCIDENT_PLANE: u8 = 2;
const VOLUME_GRID: u8 = 3;

/// Process kind stored when a step has no limiting process.
const NO_PROCESS: i32 = -1;

/// One entry of a step trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum TraceRecord {
    /// Start of an event with the source kinematics.
    EventBegin(IncidentKinematics),
    /// A transport step.
    Step(StepDeposit),
    /// End of the event.
    EventEnd { event_id: i64 },
}

impl TraceRecord {
    /// Parses one binary record. `index` is only used for error messages.
    ///
    /// # Errors
    /// Returns an error for short buffers and unknown tags or volume kinds.
    pub fn parse(raw: &[u8], index: usize) -> Result<Self> {
        if raw.len() < RECORD_SIZE {
            return Err(Error::Truncated(format!(
                "record {index} has {} of {RECORD_SIZE} bytes",
                raw.len()
            )));
        }

        match raw[0] {
            TAG_EVENT_BEGIN => Ok(TraceRecord::EventBegin(IncidentKinematics {
                event_id: read_i64(raw, 8),
                position: read_vec3(raw, 16),
                direction: read_vec3(raw, 40),
                energy_kev: read_f64(raw, 64),
            })),
            TAG_STEP => {
                let volume = match raw[1] {
                    VOLUME_PASSIVE => VolumeKind::Passive,
                    VOLUME_PIXEL => VolumeKind::Pixel {
                        channel: read_i32(raw, 4),
                    },
                    VOLUME_INCIDENT_PLANE => VolumeKind::IncidentPlane,
                    VOLUME_GRID => VolumeKind::Grid,
                    other => return Err(Error::UnknownVolume(other)),
                };
                let process_kind = read_i32(raw, 20);
                let process = (process_kind != NO_PROCESS).then(|| PhysicsProcess {
                    kind: process_kind,
                    subtype: read_i32(raw, 24),
                });
                Ok(TraceRecord::Step(StepDeposit {
                    volume,
                    raw_energy_kev: read_f64(raw, 32),
                    kinetic_energy_kev: read_f64(raw, 40),
                    position: read_vec3(raw, 48),
                    direction: read_vec3(raw, 72),
                    time_ns: read_f64(raw, 96),
                    track_id: read_i32(raw, 8),
                    parent_id: read_i32(raw, 12),
                    pdg: read_i32(raw, 16),
                    process,
                }))
            }
            TAG_EVENT_END => Ok(TraceRecord::EventEnd {
                event_id: read_i64(raw, 8),
            }),
            tag => Err(Error::UnknownTag { tag, index }),
        }
    }

    /// Encodes the record into its binary form.
    #[must_use]
    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        match self {
            TraceRecord::EventBegin(kin) => {
                buf[0] = TAG_EVENT_BEGIN;
                write_i64(&mut buf, 8, kin.event_id);
                write_vec3(&mut buf, 16, kin.position);
                write_vec3(&mut buf, 40, kin.direction);
                write_f64(&mut buf, 64, kin.energy_kev);
            }
            TraceRecord::Step(step) => {
                buf[0] = TAG_STEP;
                let (volume, channel) = match step.volume {
                    VolumeKind::Passive => (VOLUME_PASSIVE, 0),
                    VolumeKind::Pixel { channel } => (VOLUME_PIXEL, channel),
                    VolumeKind::IncidentPlane => (VOLUME_INCIDENT_PLANE, 0),
                    VolumeKind::Grid => (VOLUME_GRID, 0),
                };
                buf[1] = volume;
                write_i32(&mut buf, 4, channel);
                write_i32(&mut buf, 8, step.track_id);
                write_i32(&mut buf, 12, step.parent_id);
                write_i32(&mut buf, 16, step.pdg);
                let (kind, subtype) = step
                    .process
                    .map_or((NO_PROCESS, 0), |p| (p.kind, p.subtype));
                write_i32(&mut buf, 20, kind);
                write_i32(&mut buf, 24, subtype);
                write_f64(&mut buf, 32, step.raw_energy_kev);
                write_f64(&mut buf, 40, step.kinetic_energy_kev);
                write_vec3(&mut buf, 48, step.position);
                write_vec3(&mut buf, 72, step.direction);
                write_f64(&mut buf, 96, step.time_ns);
            }
            TraceRecord::EventEnd { event_id } => {
                buf[0] = TAG_EVENT_END;
                write_i64(&mut buf, 8, *event_id);
            }
        }
        buf
    }

    /// Returns true if this is a step record.
    #[must_use]
    pub fn is_step(&self) -> bool {
        matches!(self, TraceRecord::Step(_))
    }
}

#[inline]
fn read_array<const N: usize>(raw: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&raw[offset..offset + N]);
    out
}

#[inline]
fn read_i32(raw: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes(read_array(raw, offset))
}

#[inline]
fn read_i64(raw: &[u8], offset: usize) -> i64 {
    i64::from_le_bytes(read_array(raw, offset))
}

#[inline]
fn read_f64(raw: &[u8], offset: usize) -> f64 {
    f64::from_le_bytes(read_array(raw, offset))
}

fn read_vec3(raw: &[u8], offset: usize) -> Vec3 {
    Vec3::new(
        read_f64(raw, offset),
        read_f64(raw, offset + 8),
        read_f64(raw, offset + 16),
    )
}

#[inline]
fn write_i32(buf: &mut [u8], offset: usize, value: i32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

#[inline]
fn write_i64(buf: &mut [u8], offset: usize, value: i64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

#[inline]
fn write_f64(buf: &mut [u8], offset: usize, value: f64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

fn write_vec3(buf: &mut [u8], offset: usize, value: Vec3) {
    write_f64(buf, offset, value.x);
    write_f64(buf, offset + 8, value.y);
    write_f64(buf, offset + 16, value.z);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_layout() {
        let step = StepDeposit::in_pixel(17, 12.5, Vec3::new(12.9, -3.0, 4.0))
            .with_track(3, 1)
            .with_process(2, 12);
        let buf = TraceRecord::Step(step.clone()).encode();

        assert_eq!(buf[0], TAG_STEP);
        assert_eq!(buf[1], VOLUME_PIXEL);
        assert_eq!(read_i32(&buf, 4), 17);
        assert_eq!(read_i32(&buf, 20), 2);
        assert!((read_f64(&buf, 32) - 12.5).abs() < f64::EPSILON);

        match TraceRecord::parse(&buf, 0).unwrap() {
            TraceRecord::Step(parsed) => assert_eq!(parsed, step),
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    fn test_step_without_process() {
        let mut step = StepDeposit::in_pixel(0, 1.0, Vec3::default());
        step.volume = VolumeKind::Grid;
        let buf = TraceRecord::Step(step).encode();
        assert_eq!(read_i32(&buf, 20), NO_PROCESS);
        match TraceRecord::parse(&buf, 0).unwrap() {
            TraceRecord::Step(parsed) => {
                assert_eq!(parsed.volume, VolumeKind::Grid);
                assert!(parsed.process.is_none());
            }
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    fn test_unknown_tag_and_volume() {
        let mut buf = [0u8; RECORD_SIZE];
        buf[0] = 0x7F;
        assert!(matches!(
            TraceRecord::parse(&buf, 4),
            Err(Error::UnknownTag { tag: 0x7F, index: 4 })
        ));

        buf[0] = TAG_STEP;
        buf[1] = 9;
        assert!(matches!(
            TraceRecord::parse(&buf, 0),
            Err(Error::UnknownVolume(9))
        ));
    }

    #[test]
    fn test_short_record() {
        let buf = [TAG_EVENT_END; 10];
        assert!(matches!(
            TraceRecord::parse(&buf, 0),
            Err(Error::Truncated(_))
        ));
    }

    #[test]
    fn test_json_representation() {
        let record = TraceRecord::EventEnd { event_id: 5 };
        let text = serde_json::to_string(&record).unwrap();
        assert_eq!(text, r#"{"record":"event_end","event_id":5}"#);
        let back: TraceRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(back, record);
    }
}
