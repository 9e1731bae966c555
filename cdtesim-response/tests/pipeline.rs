#![allow(clippy::uninlined_format_args)]
use approx::assert_relative_eq;
use cdtesim_core::{
    EventRecord, Histogram1D, Histogram2D, IncidentKinematics, IncidentParticleRecord,
    MemorySink, ProcessRecord, RunSink, SourceRecord, StepAction, StepDeposit,
    Vec3, VolumeKind, NO_SIGNAL,
};
use cdtesim_response::{
    CalibrationConstants, ChargeCollectionModel, JitterBounds, RunAggregator, RunConfig,
    TableLimits, TerminationPolicy,
};
use std::sync::{Arc, Mutex};

/// Sink that stays readable after the aggregator took ownership of it.
#[derive(Clone, Default)]
struct SharedSink(Arc<Mutex<MemorySink>>);

impl SharedSink {
    fn snapshot<T>(&self, f: impl FnOnce(&MemorySink) -> T) -> T {
        f(&self.0.lock().unwrap())
    }
}

impl RunSink for SharedSink {
    fn write_event(&mut self, record: &EventRecord) -> cdtesim_core::Result<()> {
        self.0.lock().unwrap().write_event(record)
    }
    fn write_incident(&mut self, record: &IncidentParticleRecord) -> cdtesim_core::Result<()> {
        self.0.lock().unwrap().write_incident(record)
    }
    fn write_source(&mut self, record: &SourceRecord) -> cdtesim_core::Result<()> {
        self.0.lock().unwrap().write_source(record)
    }
    fn write_process(&mut self, record: &ProcessRecord) -> cdtesim_core::Result<()> {
        self.0.lock().unwrap().write_process(record)
    }
    fn write_histogram(&mut self, dir: &str, h: &Histogram1D) -> cdtesim_core::Result<()> {
        self.0.lock().unwrap().write_histogram(dir, h)
    }
    fn write_histogram_2d(&mut self, dir: &str, h: &Histogram2D) -> cdtesim_core::Result<()> {
        self.0.lock().unwrap().write_histogram_2d(dir, h)
    }
    fn write_metadata(&mut self, text: &str) -> cdtesim_core::Result<()> {
        self.0.lock().unwrap().write_metadata(text)
    }
    fn finish(&mut self) -> cdtesim_core::Result<()> {
        self.0.lock().unwrap().finish()
    }
}

fn gun(event_id: i64, energy_kev: f64) -> IncidentKinematics {
    IncidentKinematics {
        event_id,
        position: Vec3::new(50.0, 103.1, 127.5),
        direction: Vec3::new(-1.0, 0.0, 0.0),
        energy_kev,
    }
}

fn open(config: RunConfig) -> (RunAggregator, SharedSink) {
    let sink = SharedSink::default();
    let mut agg = RunAggregator::new(config).unwrap();
    agg.begin_run(Box::new(sink.clone())).unwrap();
    (agg, sink)
}

#[test]
fn test_surface_deposit_is_collected_and_recorded() {
    let (mut agg, sink) = open(RunConfig::new().with_seed(1));
    agg.begin_event(gun(0, 10.0)).unwrap();
    let at_surface = Vec3::new(12.7741, 3.0, 4.0);
    let step = StepDeposit::in_pixel(5, 10.0, at_surface).with_track(1, 0);
    assert_eq!(agg.on_step(&step).unwrap(), StepAction::Continue);
    agg.end_event().unwrap();
    let report = agg.end_run().unwrap();

    let model = ChargeCollectionModel::new(&CalibrationConstants::default());
    let expected = 10.0 * model.evaluate(at_surface).weight();
    assert_relative_eq!(expected, 10.0 * (1.0 - 0.116) * model.collection_efficiency(0.0));

    sink.snapshot(|s| {
        assert_eq!(s.events.len(), 1);
        let event = &s.events[0];
        assert_relative_eq!(event.edep[5], 10.0);
        assert_relative_eq!(event.collected[5], expected, epsilon = 1e-12);
        assert_eq!(event.sci[4], NO_SIGNAL);
        assert_eq!(event.num_tracks, 1);
        assert_eq!(event.hits.len(), 1);
        assert!(event.near_surface.is_none());
        assert_eq!(s.sources.len(), 1);
        assert!(s.finished);
        assert!(s.metadata.is_some());
    });

    let module0 = report.spectra.family(0).unwrap();
    assert_relative_eq!(module0.edep.integral(), 1.0);
    assert_relative_eq!(module0.edep_single.integral(), 1.0);
    assert!(report.spectra.is_normalized());
}

#[test]
fn test_incident_plane_kills_track() {
    let (mut agg, sink) = open(RunConfig::new().with_seed(2));
    agg.begin_event(gun(7, 30.0)).unwrap();

    let mut crossing = StepDeposit::in_pixel(0, 0.0, Vec3::new(40.0, 103.1 + 2.0, 127.5 - 1.0));
    crossing.volume = VolumeKind::IncidentPlane;
    crossing.direction = Vec3::new(-1.0, 0.0, 0.0);
    crossing.kinetic_energy_kev = 30.0;
    assert_eq!(
        agg.on_step(&crossing).unwrap(),
        StepAction::KillTrackAndSecondaries
    );
    agg.end_event().unwrap();
    let report = agg.end_run().unwrap();

    assert_eq!(report.counters.incident_rows, 1);
    assert_eq!(report.counters.tracks_killed, 1);
    assert_eq!(report.counters.event_rows, 0);
    assert_eq!(report.spectra.hit_map.entries(), 1);
    sink.snapshot(|s| {
        let row = &s.incident[0];
        assert_eq!(row.event_id, 7);
        assert_relative_eq!(row.position[1], 2.0, epsilon = 1e-9);
        assert_relative_eq!(row.position[2], -1.0, epsilon = 1e-9);
        assert_relative_eq!(row.theta_deg, 0.0);
        assert!(s.events.is_empty());
        assert_eq!(s.histograms_2d.len(), 1);
    });
}

#[test]
fn test_energy_conservation_over_steps() {
    let (mut agg, sink) = open(RunConfig::new().with_seed(3));
    agg.begin_event(gun(0, 60.0)).unwrap();
    let deposits = [(40, 1.5), (40, 2.25), (41, 7.0), (200, 12.0), (40, 0.0)];
    for (i, &(channel, e)) in deposits.iter().enumerate() {
        let pos = Vec3::new(12.7741 - 0.1 * (i as f64 + 1.0), 0.0, 0.0);
        agg.on_step(&StepDeposit::in_pixel(channel, e, pos)).unwrap();
    }
    agg.end_event().unwrap();
    agg.end_run().unwrap();

    sink.snapshot(|s| {
        let event = &s.events[0];
        assert_relative_eq!(event.edep[40], 3.75, epsilon = 1e-12);
        assert_relative_eq!(event.edep[41], 7.0);
        assert_relative_eq!(event.edep[200], 12.0);
        let total: f64 = event.edep.iter().sum();
        assert_relative_eq!(total, 22.75, epsilon = 1e-12);
        for c in [40, 41, 200] {
            assert!(event.collected[c] < event.edep[c]);
            assert!(event.collected[c] > 0.0);
        }
        // Zero-energy steps are not hits.
        assert_eq!(event.hits.len(), 4);
    });
}

#[test]
fn test_detector_policy_and_process_rows() {
    let mut policy = TerminationPolicy::default();
    policy.enable("pix");
    let (mut agg, sink) = open(RunConfig::new().with_seed(4).with_termination(policy));
    agg.begin_event(gun(0, 30.0)).unwrap();

    let photo = StepDeposit::in_pixel(9, 25.0, Vec3::new(12.5, 0.0, 0.0))
        .with_process(2, 12);
    let transport = StepDeposit::in_pixel(9, 1.0, Vec3::new(12.4, 0.0, 0.0))
        .with_process(1, 91);
    assert_eq!(
        agg.on_step(&photo).unwrap(),
        StepAction::KillTrackAndSecondaries
    );
    agg.on_step(&transport).unwrap();
    agg.end_event().unwrap();
    let report = agg.end_run().unwrap();

    assert_eq!(report.counters.process_rows, 1);
    sink.snapshot(|s| {
        assert_eq!(s.processes.len(), 1);
        assert_eq!(s.processes[0].process_subtype, 12);
        assert_relative_eq!(s.processes[0].gun_energy_kev, 30.0);
    });
}

#[test]
fn test_event_table_bound() {
    let limits = TableLimits {
        events: 3,
        ..TableLimits::default()
    };
    let (mut agg, sink) = open(RunConfig::new().with_seed(5).with_limits(limits));
    for id in 0..10 {
        agg.begin_event(gun(id, 20.0)).unwrap();
        agg.on_step(&StepDeposit::in_pixel(0, 20.0, Vec3::new(12.0, 0.0, 0.0)))
            .unwrap();
        agg.end_event().unwrap();
    }
    let report = agg.end_run().unwrap();
    assert_eq!(report.counters.events_with_deposit, 10);
    assert_eq!(report.counters.event_rows, 3);
    assert_eq!(report.counters.source_rows, 10);
    sink.snapshot(|s| {
        let ids: Vec<_> = s.events.iter().map(|e| e.event_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    });
    // Spectra are not bounded by the table limits.
    assert_relative_eq!(
        report.spectra.histogram("hEdep0").unwrap().integral(),
        10.0
    );
}

#[test]
fn test_histograms_written_once_per_run() {
    let (mut agg, sink) = open(RunConfig::new().with_seed(6));
    agg.begin_event(gun(0, 20.0)).unwrap();
    agg.end_event().unwrap();
    agg.end_run().unwrap();
    sink.snapshot(|s| {
        assert_eq!(s.histograms.len(), 34 * 9 + 6);
        assert!(s.histograms.iter().all(|(dir, _)| dir == "hist"));
        assert!(s.histogram("hRealSci32").is_some());
        assert!(s.histogram("hpat_33").is_some());
        assert!(s.histogram("h1ChargeColEff").is_some());
    });
}

#[test]
fn test_parallel_runs_merge() {
    let run = |seed: u64, events: i64| {
        let (mut agg, _) = open(RunConfig::new().with_seed(seed));
        for id in 0..events {
            agg.begin_event(gun(id, 30.0)).unwrap();
            agg.on_step(&StepDeposit::in_pixel(100, 30.0, Vec3::new(12.0, 0.0, 0.0)))
                .unwrap();
            agg.end_event().unwrap();
        }
        agg.end_run().unwrap()
    };
    let mut a = run(10, 4);
    let b = run(11, 6);
    a.spectra.merge(&b.spectra).unwrap();
    assert_relative_eq!(a.spectra.family(8).unwrap().edep.integral(), 10.0);
    assert_relative_eq!(a.spectra.family(32).unwrap().edep.integral(), 10.0);
    assert_relative_eq!(a.spectra.edep_sum.integral(), 10.0);
}

#[test]
fn test_aggregator_reusable_across_runs() {
    let (mut agg, first) = open(RunConfig::new().with_seed(7));
    agg.begin_event(gun(0, 20.0)).unwrap();
    agg.end_event().unwrap();
    agg.end_run().unwrap();

    let second = SharedSink::default();
    agg.begin_run(Box::new(second.clone())).unwrap();
    agg.begin_event(gun(1, 20.0)).unwrap();
    agg.end_event().unwrap();
    let report = agg.end_run().unwrap();
    assert_eq!(report.counters.events, 1);
    assert_eq!(first.snapshot(|s| s.sources.len()), 1);
    assert_eq!(second.snapshot(|s| s.sources[0].event_id), 1);
}

#[test]
fn test_jitter_draws_near_surface_per_event() {
    let config = RunConfig::new()
        .with_seed(21)
        .with_jitter(JitterBounds::default());
    let (mut agg, sink) = open(config);
    for id in 0..4 {
        agg.begin_event(gun(id, 10.0)).unwrap();
        agg.on_step(&StepDeposit::in_pixel(0, 10.0, Vec3::new(12.7741, 0.0, 0.0)))
            .unwrap();
        agg.end_event().unwrap();
    }
    agg.end_run().unwrap();

    sink.snapshot(|s| {
        assert_eq!(s.events.len(), 4);
        let draws: Vec<(f64, f64)> = s.events.iter().map(|e| e.near_surface.unwrap()).collect();
        for &(r0, length) in &draws {
            assert!((0.1..=0.9).contains(&r0));
            assert!((5.0e-3..=8.5e-3).contains(&length));
        }
        assert!(draws.windows(2).any(|w| w[0] != w[1]));
        // At the surface the collected fraction follows the drawn R0.
        let model = ChargeCollectionModel::new(&CalibrationConstants::default());
        for (event, &(r0, _)) in s.events.iter().zip(&draws) {
            let expected = 10.0 * (1.0 - r0) * model.collection_efficiency(0.0);
            assert_relative_eq!(event.collected[0], expected, epsilon = 1e-9);
        }
        let metadata = s.metadata.as_deref().unwrap();
        assert!(metadata.contains("randomized"));
    });
}
