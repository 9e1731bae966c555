//! cdtesim CLI - CdTe detector response for recorded transport runs.
//!
//! Replays step traces through the response pipeline and writes the run
//! tables, spectra and metadata.
#![allow(
    clippy::uninlined_format_args,
    clippy::cast_precision_loss,
    clippy::too_many_lines
)]

use cdtesim_core::{science_bin_width, RunSink, NUM_SCIENCE_BINS, SCIENCE_EDGES_KEV};
use cdtesim_io::{
    process_traces, CsvRunSink, ReplayJob, TraceFileReader, TraceFileWriter, TraceFormat,
    TraceScanner,
};
use cdtesim_response::{
    CalibrationConstants, JitterBounds, RunConfig, SpectrumBank, TerminationPolicy,
};
use clap::{Parser, Subcommand, ValueEnum};
use log::{error, info, warn};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error: {0}")]
    CdtesimIo(#[from] cdtesim_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] cdtesim_core::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0} of {1} runs failed")]
    RunsFailed(usize, usize),
}

/// Output sink selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Directory of CSV tables and histograms
    Csv,
    /// Single HDF5 file (requires the `hdf5` feature)
    Hdf5,
}

/// Trace encoding selection for `convert`.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum TraceEncoding {
    /// Fixed-size binary records
    Binary,
    /// One JSON record per line
    Jsonl,
}

/// CdTe detector-response simulation over recorded step traces.
#[derive(Parser)]
#[command(name = "cdtesim")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay step traces through the detector response
    Process {
        /// Input step trace file(s)
        #[arg(required = true)]
        input: Vec<PathBuf>,

        /// Output path; a directory of per-input outputs when several inputs are given
        #[arg(short, long)]
        output: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "csv")]
        format: OutputFormat,

        /// Calibration constants (JSON)
        #[arg(long)]
        calibration: Option<PathBuf>,

        /// Macro file copied into the run metadata
        #[arg(long = "macro")]
        macro_file: Option<PathBuf>,

        /// Free-form metadata text
        #[arg(long, default_value = "")]
        metadata: String,

        /// Kill tracks entering these volumes (grids, pix)
        #[arg(long = "kill")]
        kill: Vec<String>,

        /// Randomize the near-surface constants per event
        #[arg(long)]
        jitter: bool,

        /// RNG seed; input i uses seed + i
        #[arg(long)]
        seed: Option<u64>,

        /// Also write the spectra summed over all inputs
        #[arg(long)]
        merge: bool,

        /// Worker threads (default: all cores)
        #[arg(short = 'j', long)]
        threads: Option<usize>,
    },

    /// Show information about a step trace
    Info {
        /// Input step trace
        input: PathBuf,
    },

    /// Print the instrument energy bins and the calibration constants
    Bins {
        /// Calibration constants (JSON)
        #[arg(long)]
        calibration: Option<PathBuf>,
    },

    /// Convert a step trace between binary and JSON lines
    Convert {
        /// Input step trace
        input: PathBuf,

        /// Output step trace
        output: PathBuf,

        /// Output encoding (default: from the output extension)
        #[arg(long, value_enum)]
        to: Option<TraceEncoding>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.command {
        Commands::Process {
            input,
            output,
            format,
            calibration,
            macro_file,
            metadata,
            kill,
            jitter,
            seed,
            merge,
            threads,
        } => {
            if let Some(threads) = threads {
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build_global()
                    .map_err(|e| CliError::InvalidArgument(format!("thread pool: {e}")))?;
            }

            let calibration = load_calibration(calibration.as_deref())?;
            let mut termination = TerminationPolicy::default();
            for name in &kill {
                if !termination.enable(name) {
                    return Err(CliError::InvalidArgument(format!(
                        "unknown kill volume '{name}' (expected grids or pix)"
                    )));
                }
            }

            let command_line = std::env::args().collect::<Vec<_>>().join(" ");
            let mut base = RunConfig::new()
                .with_command_line(command_line)
                .with_metadata(metadata)
                .with_calibration(calibration)
                .with_termination(termination);
            if let Some(path) = macro_file {
                base = base.with_macro_path(path);
            }
            if jitter {
                base = base.with_jitter(JitterBounds::default());
            }

            let single = input.len() == 1;
            let targets = output_targets(&input, &output, format, merge)?;
            if !single {
                std::fs::create_dir_all(&output)?;
            }
            let jobs: Vec<ReplayJob> = input
                .iter()
                .zip(targets)
                .enumerate()
                .map(|(i, (path, target))| {
                    let mut config = base.clone().with_output(target.display().to_string());
                    if let Some(seed) = seed {
                        config = config.with_seed(seed.wrapping_add(i as u64));
                    }
                    ReplayJob {
                        input: path.clone(),
                        config,
                    }
                })
                .collect();

            info!("processing {} trace(s)", jobs.len());
            let start = Instant::now();
            let results = process_traces(&jobs, |job| {
                open_sink(format, Path::new(&job.config.output)).map_err(|e| match e {
                    CliError::CdtesimIo(inner) => inner,
                    other => cdtesim_io::Error::InvalidFormat(other.to_string()),
                })
            });

            let mut reports = Vec::with_capacity(results.len());
            let mut failed = 0usize;
            for (job, result) in jobs.iter().zip(results) {
                match result {
                    Ok(report) => reports.push(report),
                    Err(e) => {
                        error!("{}: {e}", job.input.display());
                        failed += 1;
                    }
                }
            }

            let total_events: u64 = reports.iter().map(|r| r.counters.events).sum();
            let recorded: u64 = reports.iter().map(|r| r.counters.event_rows).sum();
            println!(
                "Processed {} files in {:.2}s",
                reports.len(),
                start.elapsed().as_secs_f64()
            );
            println!("Total events: {}", total_events);
            println!("Recorded events: {}", recorded);

            if merge {
                if single {
                    warn!("--merge with a single input has nothing to merge");
                } else if let Some((first, rest)) = reports.split_first() {
                    let mut bank: SpectrumBank = first.spectra.clone();
                    for report in rest {
                        bank.merge(&report.spectra)?;
                    }
                    let target = output.join(merged_name(format));
                    let mut sink = open_sink(format, &target)?;
                    bank.write_to(sink.as_mut())?;
                    sink.write_metadata(&format!(
                        "Merged spectra of {} runs:\n{}",
                        reports.len(),
                        jobs.iter()
                            .map(|j| j.input.display().to_string())
                            .collect::<Vec<_>>()
                            .join("\n")
                    ))?;
                    sink.finish()?;
                    println!("Merged spectra: {}", target.display());
                }
            }

            if failed > 0 {
                return Err(CliError::RunsFailed(failed, jobs.len()));
            }
        }

        Commands::Info { input } => {
            let reader = TraceFileReader::open(&input)?;
            let file_size = reader.file_size();
            let summary = TraceScanner::scan(reader.records()?)?;

            println!("File: {}", input.display());
            println!(
                "Size: {} bytes ({:.2} MB)",
                file_size,
                file_size as f64 / 1_000_000.0
            );
            println!("Format: {:?}", reader.format());
            println!("Records: {}", summary.records);
            println!("Events: {}", summary.events);
            println!("Steps: {}", summary.steps);
            println!("  pixel: {}", summary.pixel_steps);
            println!("  incident plane: {}", summary.incident_steps);
            println!("  grid: {}", summary.grid_steps);
            println!("Pixel deposit: {:.3} keV", summary.pixel_deposit_kev);
            if let Some((lo, hi)) = summary.event_id_range {
                println!("Event id range: {} - {}", lo, hi);
            }
            if summary.unbalanced_events > 0 {
                println!("Unbalanced events: {}", summary.unbalanced_events);
            }
        }

        Commands::Bins { calibration } => {
            let calibration = load_calibration(calibration.as_deref())?;
            println!("{:<5} | {:<10} | {:<10} | {:<10}", "Bin", "Low (keV)", "High (keV)", "Width");
            println!("{:-<45}", "");
            for bin in 0..NUM_SCIENCE_BINS {
                if let Some(width) = science_bin_width(bin) {
                    println!(
                        "{:<5} | {:<10.1} | {:<10.1} | {:<10.1}",
                        bin,
                        SCIENCE_EDGES_KEV[bin],
                        SCIENCE_EDGES_KEV[bin + 1],
                        width
                    );
                }
            }
            println!();
            println!("Calibration:");
            println!("{}", serde_json::to_string_pretty(&calibration)?);
            println!(
                "Free paths: electrons {:.2} mm, holes {:.2} mm",
                calibration.electron_free_path_mm(),
                calibration.hole_free_path_mm()
            );
        }

        Commands::Convert { input, output, to } => {
            let format = match to {
                Some(TraceEncoding::Binary) => TraceFormat::Binary,
                Some(TraceEncoding::Jsonl) => TraceFormat::JsonLines,
                None => TraceFormat::from_extension(&output),
            };
            let reader = TraceFileReader::open(&input)?;
            let mut writer = TraceFileWriter::create(&output, format)?;
            for record in reader.records()? {
                writer.write_record(&record?)?;
            }
            writer.flush()?;
            println!(
                "Converted {} records: {:?} -> {:?}",
                writer.records_written(),
                reader.format(),
                format
            );
        }
    }

    Ok(())
}

fn load_calibration(path: Option<&Path>) -> Result<CalibrationConstants> {
    match path {
        Some(path) => Ok(CalibrationConstants::from_json_file(path)?),
        None => Ok(CalibrationConstants::default()),
    }
}

/// Output path of every input. A single input writes to `output` itself;
/// several inputs write to `output/<stem>`, suffixed with the input index when
/// the stem is already taken.
fn output_targets(
    inputs: &[PathBuf],
    output: &Path,
    format: OutputFormat,
    merge: bool,
) -> Result<Vec<PathBuf>> {
    if inputs.len() == 1 {
        return Ok(vec![output.to_path_buf()]);
    }
    let mut taken = HashSet::new();
    if merge {
        taken.insert(merged_name(format).to_string());
    }
    let mut targets = Vec::with_capacity(inputs.len());
    for (i, input) in inputs.iter().enumerate() {
        let mut name = output_name(input, format, None);
        if taken.contains(&name) {
            name = output_name(input, format, Some(i));
        }
        if !taken.insert(name.clone()) {
            return Err(CliError::InvalidArgument(format!(
                "output '{name}' for {} is already used by another input",
                input.display()
            )));
        }
        targets.push(output.join(name));
    }
    Ok(targets)
}

fn output_name(input: &Path, format: OutputFormat, index: Option<usize>) -> String {
    let mut stem = input
        .file_stem()
        .map_or_else(|| "run".to_string(), |s| s.to_string_lossy().into_owned());
    if let Some(index) = index {
        stem = format!("{stem}_{index}");
    }
    match format {
        OutputFormat::Csv => stem,
        OutputFormat::Hdf5 => format!("{stem}.h5"),
    }
}

fn merged_name(format: OutputFormat) -> &'static str {
    match format {
        OutputFormat::Csv => "merged",
        OutputFormat::Hdf5 => "merged.h5",
    }
}

fn open_sink(format: OutputFormat, path: &Path) -> Result<Box<dyn RunSink>> {
    match format {
        OutputFormat::Csv => Ok(Box::new(CsvRunSink::create(path)?)),
        #[cfg(feature = "hdf5")]
        OutputFormat::Hdf5 => Ok(Box::new(cdtesim_io::Hdf5RunSink::create(
            path,
            cdtesim_io::Hdf5WriteOptions::default(),
        )?)),
        #[cfg(not(feature = "hdf5"))]
        OutputFormat::Hdf5 => Err(CliError::InvalidArgument(format!(
            "cannot write {}: built without the hdf5 feature",
            path.display()
        ))),
    }
}
