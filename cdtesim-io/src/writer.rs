//! Step-trace writers.

use crate::reader::TraceFormat;
use crate::Result;
use cdtesim_trace::{TraceHeader, TraceRecord};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writer for step traces in either format.
pub struct TraceFileWriter {
    writer: BufWriter<File>,
    format: TraceFormat,
    records: usize,
}

impl TraceFileWriter {
    /// Creates a trace file; binary traces get their header immediately.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P, format: TraceFormat) -> Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        if format == TraceFormat::Binary {
            writer.write_all(&TraceHeader::default().encode())?;
        }
        Ok(Self {
            writer,
            format,
            records: 0,
        })
    }

    /// Appends one record.
    ///
    /// # Errors
    /// Returns an error if encoding or writing fails.
    pub fn write_record(&mut self, record: &TraceRecord) -> Result<()> {
        match self.format {
            TraceFormat::Binary => self.writer.write_all(&record.encode())?,
            TraceFormat::JsonLines => {
                serde_json::to_writer(&mut self.writer, record)?;
                self.writer.write_all(b"\n")?;
            }
        }
        self.records += 1;
        Ok(())
    }

    /// Appends every record of `records`.
    ///
    /// # Errors
    /// Returns the first encoding or write error.
    pub fn write_all<'a, I>(&mut self, records: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a TraceRecord>,
    {
        for record in records {
            self.write_record(record)?;
        }
        Ok(())
    }

    /// Records written so far.
    #[must_use]
    pub fn records_written(&self) -> usize {
        self.records
    }

    /// Flushes the writer.
    ///
    /// # Errors
    /// Returns an error if the flush fails.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::TraceFileReader;
    use cdtesim_core::{IncidentKinematics, StepDeposit, Vec3, VolumeKind};
    use cdtesim_trace::{HEADER_SIZE, RECORD_SIZE};
    use tempfile::NamedTempFile;

    fn records() -> Vec<TraceRecord> {
        let mut crossing = StepDeposit::in_pixel(0, 0.0, Vec3::new(40.0, 100.0, 120.0));
        crossing.volume = VolumeKind::IncidentPlane;
        vec![
            TraceRecord::EventBegin(IncidentKinematics::default()),
            TraceRecord::Step(crossing),
            TraceRecord::Step(StepDeposit::in_pixel(12, 3.0, Vec3::default()).with_process(2, 12)),
            TraceRecord::EventEnd { event_id: 0 },
        ]
    }

    #[test]
    fn test_write_binary() {
        let file = NamedTempFile::new().unwrap();
        let mut writer = TraceFileWriter::create(file.path(), TraceFormat::Binary).unwrap();
        writer.write_all(&records()).unwrap();
        writer.flush().unwrap();
        assert_eq!(writer.records_written(), 4);

        let data = std::fs::read(file.path()).unwrap();
        assert_eq!(data.len(), HEADER_SIZE + 4 * RECORD_SIZE);
        let reader = TraceFileReader::open(file.path()).unwrap();
        assert_eq!(reader.read_all().unwrap(), records());
    }

    #[test]
    fn test_write_json_lines() {
        let file = NamedTempFile::new().unwrap();
        let mut writer = TraceFileWriter::create(file.path(), TraceFormat::JsonLines).unwrap();
        writer.write_all(&records()).unwrap();
        writer.flush().unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(content.lines().count(), 4);
        assert!(content.contains("\"record\":\"event_begin\""));
        let reader = TraceFileReader::open(file.path()).unwrap();
        assert_eq!(reader.read_all().unwrap(), records());
    }
}
