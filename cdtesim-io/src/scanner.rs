//! Event scanner for step traces.
//!
//! Walks a trace once and reports its event structure without running the
//! response pipeline.

use crate::Result;
use cdtesim_core::VolumeKind;
use cdtesim_trace::TraceRecord;

/// Summary of a step trace.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraceSummary {
    /// Records of any kind.
    pub records: usize,
    /// Event-begin records.
    pub events: usize,
    /// Step records.
    pub steps: usize,
    /// Steps in pixel volumes.
    pub pixel_steps: usize,
    /// Steps crossing the incident plane.
    pub incident_steps: usize,
    /// Steps in collimator grids.
    pub grid_steps: usize,
    /// Raw energy deposited in pixel volumes (keV).
    pub pixel_deposit_kev: f64,
    /// Events begun but never ended, or ended without a begin.
    pub unbalanced_events: usize,
    /// Smallest and largest event id seen.
    pub event_id_range: Option<(i64, i64)>,
}

/// Scanner for event boundaries in step traces.
pub struct TraceScanner;

impl TraceScanner {
    /// Scans a record stream.
    ///
    /// # Errors
    /// Returns the first decoding error of the stream.
    pub fn scan<I>(records: I) -> Result<TraceSummary>
    where
        I: IntoIterator<Item = Result<TraceRecord>>,
    {
        let mut summary = TraceSummary::default();
        let mut open = false;

        for record in records {
            let record = record?;
            summary.records += 1;
            match record {
                TraceRecord::EventBegin(kin) => {
                    if open {
                        summary.unbalanced_events += 1;
                    }
                    open = true;
                    summary.events += 1;
                    summary.event_id_range = Some(match summary.event_id_range {
                        Some((lo, hi)) => (lo.min(kin.event_id), hi.max(kin.event_id)),
                        None => (kin.event_id, kin.event_id),
                    });
                }
                TraceRecord::Step(step) => {
                    summary.steps += 1;
                    match step.volume {
                        VolumeKind::Pixel { .. } => {
                            summary.pixel_steps += 1;
                            summary.pixel_deposit_kev += step.raw_energy_kev;
                        }
                        VolumeKind::IncidentPlane => summary.incident_steps += 1,
                        VolumeKind::Grid => summary.grid_steps += 1,
                        VolumeKind::Passive => {}
                    }
                }
                TraceRecord::EventEnd { .. } => {
                    if !open {
                        summary.unbalanced_events += 1;
                    }
                    open = false;
                }
            }
        }
        if open {
            summary.unbalanced_events += 1;
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use cdtesim_core::{IncidentKinematics, StepDeposit, Vec3};

    fn begin(event_id: i64) -> TraceRecord {
        TraceRecord::EventBegin(IncidentKinematics {
            event_id,
            ..IncidentKinematics::default()
        })
    }

    #[test]
    fn test_scan_counts() {
        let mut grid = StepDeposit::in_pixel(0, 0.0, Vec3::default());
        grid.volume = VolumeKind::Grid;
        let records = vec![
            begin(5),
            TraceRecord::Step(StepDeposit::in_pixel(1, 2.5, Vec3::default())),
            TraceRecord::Step(StepDeposit::in_pixel(2, 4.0, Vec3::default())),
            TraceRecord::Step(grid),
            TraceRecord::EventEnd { event_id: 5 },
            begin(2),
            TraceRecord::EventEnd { event_id: 2 },
        ];
        let summary = TraceScanner::scan(records.into_iter().map(Ok)).unwrap();
        assert_eq!(summary.records, 7);
        assert_eq!(summary.events, 2);
        assert_eq!(summary.steps, 3);
        assert_eq!(summary.pixel_steps, 2);
        assert_eq!(summary.grid_steps, 1);
        assert_relative_eq!(summary.pixel_deposit_kev, 6.5);
        assert_eq!(summary.unbalanced_events, 0);
        assert_eq!(summary.event_id_range, Some((2, 5)));
    }

    #[test]
    fn test_scan_unbalanced() {
        let records = vec![begin(0), begin(1), TraceRecord::EventEnd { event_id: 1 }, begin(2)];
        let summary = TraceScanner::scan(records.into_iter().map(Ok)).unwrap();
        assert_eq!(summary.events, 3);
        assert_eq!(summary.unbalanced_events, 2);
    }

    #[test]
    fn test_scan_empty() {
        let summary = TraceScanner::scan(std::iter::empty()).unwrap();
        assert_eq!(summary, TraceSummary::default());
    }
}
