use approx::assert_relative_eq;
use cdtesim_core::{IncidentKinematics, RunSink, StepDeposit, Vec3, VolumeKind};
use cdtesim_io::{
    process_trace, process_traces, CsvRunSink, ReplayJob, TraceFileReader, TraceFileWriter,
    TraceFormat, TraceScanner,
};
use cdtesim_response::{RunConfig, SpectrumBank};
use cdtesim_trace::TraceRecord;
use std::fs;
use std::path::Path;

fn write_trace(path: &Path, format: TraceFormat, events: i64) {
    let mut writer = TraceFileWriter::create(path, format).unwrap();
    for id in 0..events {
        writer
            .write_record(&TraceRecord::EventBegin(IncidentKinematics {
                event_id: id,
                position: Vec3::new(60.0, 103.1, 127.5),
                direction: Vec3::new(-1.0, 0.0, 0.0),
                energy_kev: 30.0,
            }))
            .unwrap();
        let mut crossing =
            StepDeposit::in_pixel(0, 0.0, Vec3::new(30.0, 104.1, 126.5)).with_track(1, 0);
        crossing.volume = VolumeKind::IncidentPlane;
        crossing.direction = Vec3::new(-1.0, 0.0, 0.0);
        crossing.kinetic_energy_kev = 30.0;
        writer.write_record(&TraceRecord::Step(crossing)).unwrap();
        // Killed at the plane, so the deposit comes from an unrelated track.
        writer
            .write_record(&TraceRecord::Step(
                StepDeposit::in_pixel(13, 30.0, Vec3::new(12.6, 0.0, 0.0))
                    .with_track(2, 0)
                    .with_process(2, 12),
            ))
            .unwrap();
        writer
            .write_record(&TraceRecord::EventEnd { event_id: id })
            .unwrap();
    }
    writer.flush().unwrap();
}

#[test]
fn test_binary_trace_to_csv_run() {
    let dir = tempfile::tempdir().unwrap();
    let trace = dir.path().join("run.steps");
    write_trace(&trace, TraceFormat::Binary, 5);

    let summary =
        TraceScanner::scan(TraceFileReader::open(&trace).unwrap().records().unwrap()).unwrap();
    assert_eq!(summary.events, 5);
    assert_eq!(summary.steps, 10);
    assert_eq!(summary.incident_steps, 5);

    let out = dir.path().join("out");
    let job = ReplayJob {
        input: trace,
        config: RunConfig::new().with_seed(3).with_command_line("cdtesim process run.steps"),
    };
    let sink = CsvRunSink::create(&out).unwrap();
    let report = process_trace(&job, Box::new(sink)).unwrap();

    assert_eq!(report.counters.events, 5);
    assert_eq!(report.counters.incident_rows, 5);
    assert_eq!(report.counters.process_rows, 5);
    assert_eq!(report.counters.event_rows, 5);

    let inp = fs::read_to_string(out.join("inp.csv")).unwrap();
    assert_eq!(inp.lines().count(), 6);
    let events = fs::read_to_string(out.join("events.jsonl")).unwrap();
    assert_eq!(events.lines().count(), 5);
    let metadata = fs::read_to_string(out.join("metadata.txt")).unwrap();
    assert!(metadata.starts_with("Command:cdtesim process run.steps"));
    assert!(out.join("hist").join("hRealSci1.csv").exists());
    assert!(out.join("hist").join("h2xy.csv").exists());
}

#[test]
fn test_parallel_jobs_merge_to_combined_bank() {
    let dir = tempfile::tempdir().unwrap();
    let jobs: Vec<ReplayJob> = [(TraceFormat::Binary, 3), (TraceFormat::JsonLines, 4)]
        .into_iter()
        .enumerate()
        .map(|(i, (format, events))| {
            let input = dir.path().join(format!("run{i}.trace"));
            write_trace(&input, format, events);
            ReplayJob {
                input,
                config: RunConfig::new().with_seed(i as u64),
            }
        })
        .collect();

    let out = dir.path().to_path_buf();
    let reports = process_traces(&jobs, |job| {
        let name = job.input.file_stem().unwrap().to_string_lossy().to_string();
        let sink: Box<dyn RunSink> = Box::new(CsvRunSink::create(out.join(name))?);
        Ok(sink)
    });
    let reports: Vec<_> = reports.into_iter().map(Result::unwrap).collect();
    assert_eq!(reports[0].counters.events, 3);
    assert_eq!(reports[1].counters.events, 4);

    let mut merged: SpectrumBank = reports[0].spectra.clone();
    merged.merge(&reports[1].spectra).unwrap();
    assert_relative_eq!(merged.family(1).unwrap().edep.integral(), 7.0);
    assert_eq!(merged.hit_map.entries(), 7);
}

#[test]
fn test_missing_trace_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let job = ReplayJob {
        input: dir.path().join("missing.steps"),
        config: RunConfig::new(),
    };
    let sink = CsvRunSink::create(dir.path().join("out")).unwrap();
    assert!(process_trace(&job, Box::new(sink)).is_err());
}
