//! Replays step traces through the response pipeline.
//!
//! The transport engine that produced a trace has already run, so the kill
//! decisions returned by the aggregator are applied here: once a track is
//! killed, its remaining steps and those of its descendants are skipped.

use crate::reader::TraceFileReader;
use crate::{Error, Result};
use cdtesim_core::{RunSink, StepAction};
use cdtesim_response::{RunAggregator, RunConfig, RunReport};
use cdtesim_trace::TraceRecord;
use log::{debug, info, warn};
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::PathBuf;

/// Statistics of one replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Events replayed.
    pub events: usize,
    /// Steps handed to the aggregator.
    pub steps: usize,
    /// Steps skipped because their track was killed.
    pub skipped_steps: usize,
}

/// Feeds a record stream into an aggregator with an open run.
///
/// A missing event-end record is tolerated: the open event is closed when
/// the next event begins, or left for `end_run` at the end of the stream.
///
/// # Errors
/// Returns decoding errors, steps or event ends outside an event, and
/// aggregator errors.
pub fn replay_records<I>(records: I, aggregator: &mut RunAggregator) -> Result<ReplayStats>
where
    I: IntoIterator<Item = Result<TraceRecord>>,
{
    let mut stats = ReplayStats::default();
    let mut killed: HashSet<i32> = HashSet::new();
    let mut current: Option<i64> = None;

    for (index, record) in records.into_iter().enumerate() {
        match record? {
            TraceRecord::EventBegin(kinematics) => {
                if let Some(id) = current {
                    warn!("event {id} has no end record, closing it at record {index}");
                    aggregator.end_event()?;
                }
                killed.clear();
                current = Some(kinematics.event_id);
                aggregator.begin_event(kinematics)?;
                stats.events += 1;
            }
            TraceRecord::Step(step) => {
                if current.is_none() {
                    return Err(Error::InvalidFormat(format!(
                        "step record {index} outside of an event"
                    )));
                }
                if killed.contains(&step.track_id) || killed.contains(&step.parent_id) {
                    killed.insert(step.track_id);
                    stats.skipped_steps += 1;
                    continue;
                }
                stats.steps += 1;
                if aggregator.on_step(&step)? == StepAction::KillTrackAndSecondaries {
                    killed.insert(step.track_id);
                }
            }
            TraceRecord::EventEnd { event_id } => {
                let Some(id) = current.take() else {
                    return Err(Error::InvalidFormat(format!(
                        "event end {event_id} at record {index} without a begin"
                    )));
                };
                if id != event_id {
                    warn!("event {id} closed by an end record for event {event_id}");
                }
                aggregator.end_event()?;
            }
        }
    }
    if let Some(id) = current {
        debug!("trace ends inside event {id}");
    }
    Ok(stats)
}

/// One trace to replay into its own sink.
#[derive(Debug, Clone)]
pub struct ReplayJob {
    /// Trace file.
    pub input: PathBuf,
    /// Run configuration for this trace.
    pub config: RunConfig,
}

/// Replays one trace into `sink` as a complete run.
///
/// # Errors
/// Returns an error if the trace cannot be read or the run fails.
pub fn process_trace(job: &ReplayJob, sink: Box<dyn RunSink>) -> Result<RunReport> {
    let reader = TraceFileReader::open(&job.input)?;
    let mut aggregator = RunAggregator::new(job.config.clone())?;
    aggregator.begin_run(sink)?;
    let stats = replay_records(reader.records()?, &mut aggregator)?;
    let report = aggregator.end_run()?;
    info!(
        "{}: replayed {} events, {} steps ({} skipped after kills)",
        job.input.display(),
        stats.events,
        stats.steps,
        stats.skipped_steps
    );
    Ok(report)
}

/// Replays several traces in parallel, one aggregator and one sink each.
///
/// Results are returned in job order.
pub fn process_traces<F>(jobs: &[ReplayJob], make_sink: F) -> Vec<Result<RunReport>>
where
    F: Fn(&ReplayJob) -> Result<Box<dyn RunSink>> + Sync,
{
    jobs.par_iter()
        .map(|job| process_trace(job, make_sink(job)?))
        .collect()
}
