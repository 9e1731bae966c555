//! Output sink abstraction for a run.

use crate::histogram::{Histogram1D, Histogram2D};
use crate::records::{EventRecord, IncidentParticleRecord, ProcessRecord, SourceRecord};
use crate::Result;

/// Destination for the tables, histograms and metadata of one run.
///
/// Rows arrive incrementally while the run is open; histograms and the
/// metadata record arrive once at run end, followed by [`RunSink::finish`].
/// A sink belongs to exactly one run and is never shared between workers.
pub trait RunSink: Send {
    /// Appends a row to the `events` table.
    fn write_event(&mut self, record: &EventRecord) -> Result<()>;

    /// Appends a row to the `inp` table.
    fn write_incident(&mut self, record: &IncidentParticleRecord) -> Result<()>;

    /// Appends a row to the `source` table.
    fn write_source(&mut self, record: &SourceRecord) -> Result<()>;

    /// Appends a row to the `phys` table.
    fn write_process(&mut self, record: &ProcessRecord) -> Result<()>;

    /// Stores a 1-D histogram under the given directory (e.g. `hist`).
    fn write_histogram(&mut self, directory: &str, histogram: &Histogram1D) -> Result<()>;

    /// Stores a 2-D histogram under the given directory.
    fn write_histogram_2d(&mut self, directory: &str, histogram: &Histogram2D) -> Result<()>;

    /// Stores the free-text run metadata record.
    fn write_metadata(&mut self, text: &str) -> Result<()>;

    /// Flushes and closes the sink.
    fn finish(&mut self) -> Result<()>;
}

/// In-memory sink that keeps everything it is given. Useful for tests and
/// for callers that post-process a run without touching the filesystem.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub events: Vec<EventRecord>,
    pub incident: Vec<IncidentParticleRecord>,
    pub sources: Vec<SourceRecord>,
    pub processes: Vec<ProcessRecord>,
    pub histograms: Vec<(String, Histogram1D)>,
    pub histograms_2d: Vec<(String, Histogram2D)>,
    pub metadata: Option<String>,
    pub finished: bool,
}

impl MemorySink {
    /// Looks up a stored 1-D histogram by name.
    #[must_use]
    pub fn histogram(&self, name: &str) -> Option<&Histogram1D> {
        self.histograms
            .iter()
            .map(|(_, h)| h)
            .find(|h| h.name() == name)
    }
}

impl RunSink for MemorySink {
    fn write_event(&mut self, record: &EventRecord) -> Result<()> {
        self.events.push(record.clone());
        Ok(())
    }

    fn write_incident(&mut self, record: &IncidentParticleRecord) -> Result<()> {
        self.incident.push(*record);
        Ok(())
    }

    fn write_source(&mut self, record: &SourceRecord) -> Result<()> {
        self.sources.push(*record);
        Ok(())
    }

    fn write_process(&mut self, record: &ProcessRecord) -> Result<()> {
        self.processes.push(*record);
        Ok(())
    }

    fn write_histogram(&mut self, directory: &str, histogram: &Histogram1D) -> Result<()> {
        self.histograms
            .push((directory.to_string(), histogram.clone()));
        Ok(())
    }

    fn write_histogram_2d(&mut self, directory: &str, histogram: &Histogram2D) -> Result<()> {
        self.histograms_2d
            .push((directory.to_string(), histogram.clone()));
        Ok(())
    }

    fn write_metadata(&mut self, text: &str) -> Result<()> {
        self.metadata = Some(text.to_string());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}
