//! Run lifecycle: step routing, event finalization and output.
//!
//! A [`RunAggregator`] is constructed once and drives any number of
//! sequential runs. Between `begin_run` and `end_run` it exclusively owns the
//! run's sink, spectrum bank and event registers; nothing is shared between
//! aggregators, so parallel workers each build their own and merge the
//! returned [`RunReport`]s afterwards.

use crate::accumulator::EventAccumulator;
use crate::collection::ChargeCollectionModel;
use crate::config::RunConfig;
use crate::finalizer::EventFinalizer;
use crate::noise::Smearer;
use crate::spectra::SpectrumBank;
use cdtesim_core::{
    ChannelId, Error, IncidentKinematics, ProcessRecord, Result, RunSink, SourceRecord, StepAction,
    StepDeposit, VolumeKind,
};
use log::{debug, info, warn};

/// Counters of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounters {
    /// Events finalized.
    pub events: u64,
    /// Events with at least one positive raw deposit.
    pub events_with_deposit: u64,
    /// Rows written to `events`.
    pub event_rows: u64,
    /// Rows written to `inp`.
    pub incident_rows: u64,
    /// Rows written to `source`.
    pub source_rows: u64,
    /// Rows written to `phys`.
    pub process_rows: u64,
    /// Rows not written because a table reached its bound.
    pub rows_dropped: u64,
    /// Steps seen, in any volume.
    pub steps: u64,
    /// Steps dropped for an invalid channel id.
    pub invalid_steps: u64,
    /// Tracks killed by the incident plane or a termination policy.
    pub tracks_killed: u64,
    /// Hits that did not fit in an event's hit ledger.
    pub ledger_overflow: u64,
}

/// Result of a closed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Run counters.
    pub counters: RunCounters,
    /// Finalized, width-normalized spectra.
    pub spectra: SpectrumBank,
    /// Whether the metadata record was written.
    pub metadata_written: bool,
}

struct OpenRun {
    sink: Box<dyn RunSink>,
    bank: SpectrumBank,
    accumulator: EventAccumulator,
    event_model: ChargeCollectionModel,
    event_open: bool,
    counters: RunCounters,
}

/// Detector-response pipeline for one output stream.
pub struct RunAggregator {
    config: RunConfig,
    base_model: ChargeCollectionModel,
    finalizer: EventFinalizer,
    smearer: Smearer,
    run: Option<OpenRun>,
}

impl RunAggregator {
    /// Creates an aggregator.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the configuration is invalid.
    pub fn new(config: RunConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            base_model: ChargeCollectionModel::new(&config.calibration),
            finalizer: EventFinalizer::new(&config.calibration),
            smearer: Smearer::new(config.seed, config.calibration.electronic_noise_kev),
            config,
            run: None,
        })
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// True between `begin_run` and `end_run`.
    #[must_use]
    pub fn is_run_open(&self) -> bool {
        self.run.is_some()
    }

    /// True between `begin_event` and `end_event`.
    #[must_use]
    pub fn is_event_open(&self) -> bool {
        self.run.as_ref().is_some_and(|run| run.event_open)
    }

    /// Counters of the open run.
    #[must_use]
    pub fn counters(&self) -> Option<&RunCounters> {
        self.run.as_ref().map(|run| &run.counters)
    }

    /// Spectra of the open run.
    #[must_use]
    pub fn spectra(&self) -> Option<&SpectrumBank> {
        self.run.as_ref().map(|run| &run.bank)
    }

    /// Opens a run writing to `sink`.
    ///
    /// # Errors
    /// Returns [`Error::RunAlreadyOpen`] if a run is open.
    pub fn begin_run(&mut self, sink: Box<dyn RunSink>) -> Result<()> {
        if self.run.is_some() {
            return Err(Error::RunAlreadyOpen);
        }
        let bank = SpectrumBank::new(self.config.fine_binning, &self.config.calibration)?;
        self.run = Some(OpenRun {
            sink,
            bank,
            accumulator: EventAccumulator::new(self.config.ledger_capacity),
            event_model: self.base_model,
            event_open: false,
            counters: RunCounters::default(),
        });
        info!("run started, output '{}'", self.config.output);
        Ok(())
    }

    /// Opens an event with the source kinematics of the primary generator.
    ///
    /// # Errors
    /// Returns an error without an open run or while another event is open.
    pub fn begin_event(&mut self, kinematics: IncidentKinematics) -> Result<()> {
        let run = self.run.as_mut().ok_or(Error::NoOpenRun)?;
        if run.event_open {
            return Err(Error::EventAlreadyOpen(run.accumulator.kinematics().event_id));
        }
        run.event_model = match &self.config.jitter {
            Some(bounds) => {
                let (r0, length) = self.smearer.draw_near_surface(bounds);
                self.base_model.with_near_surface(r0, length)
            }
            None => self.base_model,
        };
        run.accumulator.reset(kinematics);
        run.event_open = true;
        Ok(())
    }

    /// Routes one transport step and tells the engine what to do with its track.
    ///
    /// Steps in pixels with an invalid channel id are logged and dropped.
    ///
    /// # Errors
    /// Returns an error outside an open event or when the sink fails.
    pub fn on_step(&mut self, step: &StepDeposit) -> Result<StepAction> {
        let run = self.run.as_mut().ok_or(Error::NoOpenRun)?;
        if !run.event_open {
            return Err(Error::NoOpenEvent);
        }
        run.accumulator.observe(step);
        run.counters.steps += 1;

        match step.volume {
            VolumeKind::Passive => Ok(StepAction::Continue),
            VolumeKind::Grid => {
                if self.config.termination.terminate_at_grids {
                    run.counters.tracks_killed += 1;
                    Ok(StepAction::KillTrackAndSecondaries)
                } else {
                    Ok(StepAction::Continue)
                }
            }
            VolumeKind::IncidentPlane => {
                let row = run.accumulator.incident_row(step);
                run.bank.fill_hit_map(row.position[1], row.position[2]);
                if within(run.counters.incident_rows, self.config.limits.incident) {
                    run.sink.write_incident(&row)?;
                    run.counters.incident_rows += 1;
                } else {
                    run.counters.rows_dropped += 1;
                }
                run.counters.tracks_killed += 1;
                Ok(StepAction::KillTrackAndSecondaries)
            }
            VolumeKind::Pixel { channel } => {
                let channel = match ChannelId::new(channel) {
                    Ok(channel) => channel,
                    Err(e) => {
                        warn!(
                            "event {}: {e}, step dropped",
                            run.accumulator.kinematics().event_id
                        );
                        run.counters.invalid_steps += 1;
                        return Ok(StepAction::Continue);
                    }
                };
                let response = run.event_model.evaluate(step.position);
                run.bank.record_collection(&response);
                run.accumulator.deposit(channel, step, &response);

                if let Some(process) = step.process.filter(|p| p.is_interaction()) {
                    if within(run.counters.process_rows, self.config.limits.processes) {
                        run.sink.write_process(&ProcessRecord {
                            process_type: process.kind,
                            process_subtype: process.subtype,
                            gun_energy_kev: run.accumulator.kinematics().energy_kev,
                            pdg: step.pdg,
                            parent_id: step.parent_id,
                        })?;
                        run.counters.process_rows += 1;
                    } else {
                        run.counters.rows_dropped += 1;
                    }
                }

                if self.config.termination.terminate_at_detectors {
                    run.counters.tracks_killed += 1;
                    Ok(StepAction::KillTrackAndSecondaries)
                } else {
                    Ok(StepAction::Continue)
                }
            }
        }
    }

    /// Closes the current event: finalizes it, fills the spectra and writes
    /// its rows.
    ///
    /// # Errors
    /// Returns an error without an open event or when the sink fails.
    pub fn end_event(&mut self) -> Result<()> {
        let run = self.run.as_mut().ok_or(Error::NoOpenRun)?;
        if !run.event_open {
            return Err(Error::NoOpenEvent);
        }
        run.event_open = false;

        let mut record = self
            .finalizer
            .finalize(&run.accumulator, &mut self.smearer, &mut run.bank);
        if self.config.jitter.is_some() {
            record.near_surface = Some(run.event_model.near_surface());
        }

        run.counters.events += 1;
        run.counters.ledger_overflow += run.accumulator.ledger().dropped();
        if run.accumulator.has_deposit() {
            run.counters.events_with_deposit += 1;
            if within(run.counters.event_rows, self.config.limits.events) {
                run.sink.write_event(&record)?;
                run.counters.event_rows += 1;
            } else {
                run.counters.rows_dropped += 1;
            }
        }

        if within(run.counters.source_rows, self.config.limits.sources) {
            run.sink
                .write_source(&SourceRecord::from(run.accumulator.kinematics()))?;
            run.counters.source_rows += 1;
        } else {
            run.counters.rows_dropped += 1;
        }
        Ok(())
    }

    /// Closes the run: normalizes the instrument spectra, writes histograms
    /// and metadata, and finishes the sink. An event still open is finalized
    /// first.
    ///
    /// # Errors
    /// Returns [`Error::NoOpenRun`] without an open run, or the sink error.
    pub fn end_run(&mut self) -> Result<RunReport> {
        if self.is_event_open() {
            debug!("finalizing the open event before closing the run");
            self.end_event()?;
        }
        let mut run = self.run.take().ok_or(Error::NoOpenRun)?;

        run.bank.normalize_instrument_spectra();
        run.bank.write_to(run.sink.as_mut())?;

        let metadata = build_metadata(&self.config);
        let metadata_written = match &metadata {
            Some(text) => {
                run.sink.write_metadata(text)?;
                true
            }
            None => false,
        };
        run.sink.finish()?;

        let c = &run.counters;
        info!(
            "run finished, output '{}': {} events ({} with deposits, {} recorded), \
             {} incident particles, {} tracks killed",
            self.config.output, c.events, c.events_with_deposit, c.event_rows, c.incident_rows,
            c.tracks_killed
        );
        if c.rows_dropped > 0 {
            info!("{} rows dropped by table bounds", c.rows_dropped);
        }
        if c.invalid_steps > 0 {
            warn!("{} steps dropped for invalid channel ids", c.invalid_steps);
        }
        if c.ledger_overflow > 0 {
            debug!("{} hits beyond the ledger capacity", c.ledger_overflow);
        }

        Ok(RunReport {
            counters: run.counters,
            spectra: run.bank,
            metadata_written,
        })
    }
}

fn within(written: u64, limit: usize) -> bool {
    usize::try_from(written).is_ok_and(|n| n < limit)
}

/// Assembles the run metadata record.
///
/// Returns `None` if the configured macro file cannot be read; the run
/// continues without metadata.
fn build_metadata(config: &RunConfig) -> Option<String> {
    let mut text = format!("Command:{}\n", config.command_line);

    if let Some(path) = &config.macro_path {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                text.push_str(&format!("Macro filename: {}\n", path.display()));
                for line in contents.lines() {
                    text.push_str(line);
                    text.push('\n');
                }
            }
            Err(e) => {
                warn!(
                    "cannot read macro file {}: {e}; metadata skipped",
                    path.display()
                );
                return None;
            }
        }
    }

    if !config.metadata.is_empty() {
        text.push_str(&config.metadata);
        text.push('\n');
    }

    let c = &config.calibration;
    text.push_str("\nRealistic simulation parameters\n");
    match &config.jitter {
        Some(bounds) => {
            text.push_str(&format!(
                "Near surface R0: randomized in [{}, {}]\n",
                bounds.r0_min, bounds.r0_max
            ));
            text.push_str(&format!(
                "Near surface L (mm): randomized in [{}, {}]\n",
                bounds.length_min_mm, bounds.length_max_mm
            ));
        }
        None => {
            text.push_str(&format!("Near surface R0: {:.6}\n", c.near_surface_r0));
            text.push_str(&format!(
                "Near surface L (mm): {:.6}\n",
                c.near_surface_length_mm
            ));
        }
    }
    text.push_str(&format!("Fano factor: {:.6}\n", c.fano_factor));
    text.push_str(&format!(
        "Electronic noise (keV): {:.6}\n",
        c.electronic_noise_kev
    ));
    text.push_str(&format!("Threshold (keV): {:.6}\n", c.threshold_kev));
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::JitterBounds;
    use crate::config::TableLimits;
    use cdtesim_core::{MemorySink, Vec3};
    use std::io::Write as _;

    fn aggregator() -> RunAggregator {
        RunAggregator::new(RunConfig::new().with_seed(5)).unwrap()
    }

    fn kin(event_id: i64) -> IncidentKinematics {
        IncidentKinematics {
            event_id,
            energy_kev: 30.0,
            ..IncidentKinematics::default()
        }
    }

    #[test]
    fn test_lifecycle_errors() {
        let mut agg = aggregator();
        assert!(matches!(agg.end_run(), Err(Error::NoOpenRun)));
        assert!(matches!(agg.begin_event(kin(0)), Err(Error::NoOpenRun)));

        agg.begin_run(Box::new(MemorySink::default())).unwrap();
        assert!(matches!(
            agg.begin_run(Box::new(MemorySink::default())),
            Err(Error::RunAlreadyOpen)
        ));
        let step = StepDeposit::in_pixel(0, 1.0, Vec3::default());
        assert!(matches!(agg.on_step(&step), Err(Error::NoOpenEvent)));
        assert!(matches!(agg.end_event(), Err(Error::NoOpenEvent)));

        agg.begin_event(kin(1)).unwrap();
        assert!(matches!(
            agg.begin_event(kin(2)),
            Err(Error::EventAlreadyOpen(1))
        ));
        agg.end_event().unwrap();
        agg.end_run().unwrap();
        assert!(!agg.is_run_open());
    }

    #[test]
    fn test_invalid_channel_is_dropped() {
        let mut agg = aggregator();
        agg.begin_run(Box::new(MemorySink::default())).unwrap();
        agg.begin_event(kin(0)).unwrap();
        let action = agg
            .on_step(&StepDeposit::in_pixel(384, 10.0, Vec3::default()))
            .unwrap();
        assert_eq!(action, StepAction::Continue);
        agg.end_event().unwrap();
        let report = agg.end_run().unwrap();
        assert_eq!(report.counters.invalid_steps, 1);
        assert_eq!(report.counters.events_with_deposit, 0);
        assert_eq!(report.counters.event_rows, 0);
        assert_eq!(report.counters.source_rows, 1);
    }

    #[test]
    fn test_grid_policy() {
        let mut step = StepDeposit::in_pixel(0, 0.0, Vec3::default());
        step.volume = VolumeKind::Grid;

        let mut agg = aggregator();
        agg.begin_run(Box::new(MemorySink::default())).unwrap();
        agg.begin_event(kin(0)).unwrap();
        assert_eq!(agg.on_step(&step).unwrap(), StepAction::Continue);

        let mut policy = crate::config::TerminationPolicy::default();
        policy.enable("grids");
        let mut agg = RunAggregator::new(RunConfig::new().with_termination(policy)).unwrap();
        agg.begin_run(Box::new(MemorySink::default())).unwrap();
        agg.begin_event(kin(0)).unwrap();
        assert_eq!(
            agg.on_step(&step).unwrap(),
            StepAction::KillTrackAndSecondaries
        );
        assert_eq!(agg.counters().unwrap().tracks_killed, 1);
    }

    #[test]
    fn test_source_rows_bounded() {
        let limits = TableLimits {
            sources: 2,
            ..TableLimits::default()
        };
        let mut agg = RunAggregator::new(RunConfig::new().with_limits(limits)).unwrap();
        agg.begin_run(Box::new(MemorySink::default())).unwrap();
        for id in 0..5 {
            agg.begin_event(kin(id)).unwrap();
            agg.end_event().unwrap();
        }
        let report = agg.end_run().unwrap();
        assert_eq!(report.counters.source_rows, 2);
        assert_eq!(report.counters.rows_dropped, 3);
        assert_eq!(report.counters.events, 5);
    }

    #[test]
    fn test_open_event_is_finalized_at_run_end() {
        let mut agg = aggregator();
        agg.begin_run(Box::new(MemorySink::default())).unwrap();
        agg.begin_event(kin(0)).unwrap();
        agg.on_step(&StepDeposit::in_pixel(3, 20.0, Vec3::new(12.5, 0.0, 0.0)))
            .unwrap();
        let report = agg.end_run().unwrap();
        assert_eq!(report.counters.events, 1);
        assert_eq!(report.counters.event_rows, 1);
    }

    #[test]
    fn test_metadata_text() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "/run/beamOn 100").unwrap();
        let config = RunConfig::new()
            .with_command_line("cdtesim process run.steps")
            .with_macro_path(file.path())
            .with_metadata("flare test");
        let text = build_metadata(&config).unwrap();
        assert!(text.starts_with("Command:cdtesim process run.steps\n"));
        assert!(text.contains("Macro filename: "));
        assert!(text.contains("/run/beamOn 100\n"));
        assert!(text.contains("/run/beamOn 100\nflare test\n\nRealistic simulation parameters\n"));
        assert!(text.contains("Near surface R0: 0.116000\n"));
        assert!(text.ends_with("Threshold (keV): 4.000000\n"));
        assert_eq!(text.lines().count(), 11);
    }

    #[test]
    fn test_metadata_without_macro_and_with_missing_macro() {
        assert!(build_metadata(&RunConfig::new()).is_some());
        let missing = RunConfig::new().with_macro_path("/nonexistent/run.mac");
        assert!(build_metadata(&missing).is_none());

        let jittered = RunConfig::new().with_jitter(JitterBounds::default());
        assert!(build_metadata(&jittered)
            .unwrap()
            .contains("randomized in [0.1, 0.9]"));
    }

    #[test]
    fn test_jitter_run_records_events() {
        let config = RunConfig::new()
            .with_seed(21)
            .with_jitter(JitterBounds::default());
        let mut agg = RunAggregator::new(config).unwrap();
        agg.begin_run(Box::new(MemorySink::default())).unwrap();
        agg.begin_event(kin(0)).unwrap();
        agg.on_step(&StepDeposit::in_pixel(0, 10.0, Vec3::new(12.7741, 0.0, 0.0)))
            .unwrap();
        agg.end_event().unwrap();
        assert_eq!(agg.spectra().unwrap().diagnostics.near_surface.entries(), 1);
        let report = agg.end_run().unwrap();
        assert_eq!(report.counters.event_rows, 1);
        assert!(report.metadata_written);
    }
}
