//! Plain-text run output.
//!
//! A run directory holds `events.jsonl`, `inp.csv`, `source.csv`,
//! `phys.csv`, `metadata.txt` and one CSV per histogram under `hist/`.

use crate::Error;
use cdtesim_core::{
    EventRecord, Histogram1D, Histogram2D, IncidentParticleRecord, ProcessRecord, Result, RunSink,
    SourceRecord,
};
use log::debug;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const INCIDENT_HEADER: &str =
    "eventID,x,y,z,E0,itrack,pixelID,detectorID,vx,vy,vz,theta,energy,pdg,parent";
const SOURCE_HEADER: &str = "eventID,x,y,z,vx,vy,vz,energy";
const PROCESS_HEADER: &str = "type,subType,E0,pdg,parent";

/// Run sink writing CSV tables into a directory.
pub struct CsvRunSink {
    dir: PathBuf,
    events: BufWriter<File>,
    incident: BufWriter<File>,
    sources: BufWriter<File>,
    processes: BufWriter<File>,
}

impl CsvRunSink {
    /// Creates the run directory and its table files.
    ///
    /// # Errors
    /// Returns an error if the directory or files cannot be created.
    pub fn create<P: AsRef<Path>>(dir: P) -> crate::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let open = |name: &str, header: Option<&str>| -> crate::Result<BufWriter<File>> {
            let mut writer = BufWriter::new(File::create(dir.join(name))?);
            if let Some(header) = header {
                writeln!(writer, "{header}")?;
            }
            Ok(writer)
        };
        Ok(Self {
            events: open("events.jsonl", None)?,
            incident: open("inp.csv", Some(INCIDENT_HEADER))?,
            sources: open("source.csv", Some(SOURCE_HEADER))?,
            processes: open("phys.csv", Some(PROCESS_HEADER))?,
            dir,
        })
    }

    /// Run directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn histogram_path(&self, directory: &str, name: &str) -> Result<PathBuf> {
        let dir = self.dir.join(directory);
        fs::create_dir_all(&dir)?;
        Ok(dir.join(format!("{name}.csv")))
    }
}

impl RunSink for CsvRunSink {
    fn write_event(&mut self, record: &EventRecord) -> Result<()> {
        serde_json::to_writer(&mut self.events, record).map_err(Error::Json)?;
        self.events.write_all(b"\n")?;
        Ok(())
    }

    fn write_incident(&mut self, r: &IncidentParticleRecord) -> Result<()> {
        writeln!(
            self.incident,
            "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
            r.event_id,
            r.position[0],
            r.position[1],
            r.position[2],
            r.gun_energy_kev,
            r.track_index,
            r.pixel_id,
            r.detector_id,
            r.direction[0],
            r.direction[1],
            r.direction[2],
            r.theta_deg,
            r.energy_kev,
            r.pdg,
            r.parent_id
        )?;
        Ok(())
    }

    fn write_source(&mut self, r: &SourceRecord) -> Result<()> {
        writeln!(
            self.sources,
            "{},{},{},{},{},{},{},{}",
            r.event_id,
            r.position[0],
            r.position[1],
            r.position[2],
            r.direction[0],
            r.direction[1],
            r.direction[2],
            r.energy_kev
        )?;
        Ok(())
    }

    fn write_process(&mut self, r: &ProcessRecord) -> Result<()> {
        writeln!(
            self.processes,
            "{},{},{},{},{}",
            r.process_type, r.process_subtype, r.gun_energy_kev, r.pdg, r.parent_id
        )?;
        Ok(())
    }

    fn write_histogram(&mut self, directory: &str, histogram: &Histogram1D) -> Result<()> {
        let path = self.histogram_path(directory, histogram.name())?;
        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(writer, "# {}", histogram.title())?;
        writeln!(
            writer,
            "# entries={} underflow={} overflow={}",
            histogram.entries(),
            histogram.underflow(),
            histogram.overflow()
        )?;
        writeln!(writer, "bin,low,high,content")?;
        let axis = histogram.axis();
        for (i, content) in histogram.contents().iter().enumerate() {
            writeln!(
                writer,
                "{i},{},{},{content}",
                axis.lower_edge(i),
                axis.upper_edge(i)
            )?;
        }
        writer.flush()?;
        Ok(())
    }

    fn write_histogram_2d(&mut self, directory: &str, histogram: &Histogram2D) -> Result<()> {
        let path = self.histogram_path(directory, histogram.name())?;
        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(writer, "# {}", histogram.title())?;
        writeln!(
            writer,
            "# entries={} out_of_range={}",
            histogram.entries(),
            histogram.out_of_range()
        )?;
        writeln!(writer, "ix,iy,x_low,y_low,content")?;
        let (x_axis, y_axis) = (histogram.x_axis(), histogram.y_axis());
        for (ix, iy, content) in histogram.non_empty_cells() {
            writeln!(
                writer,
                "{ix},{iy},{},{},{content}",
                x_axis.lower_edge(ix),
                y_axis.lower_edge(iy)
            )?;
        }
        writer.flush()?;
        Ok(())
    }

    fn write_metadata(&mut self, text: &str) -> Result<()> {
        fs::write(self.dir.join("metadata.txt"), text)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.events.flush()?;
        self.incident.flush()?;
        self.sources.flush()?;
        self.processes.flush()?;
        debug!("closed run directory {}", self.dir.display());
        Ok(())
    }
}
