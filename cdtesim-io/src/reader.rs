//! Memory-mapped step-trace readers.
//!

use crate::{Error, Result};
use cdtesim_trace::{is_binary_trace, parse_json_line, TraceParser, TraceRecord};
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A memory-mapped file reader.
///
/// Uses memmap2 to efficiently access file contents without
/// loading the entire file into memory.
pub struct MappedFileReader {
    mmap: Option<Arc<Mmap>>,
    path: PathBuf,
}

impl MappedFileReader {
    /// Opens a file for memory-mapped reading.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or memory-mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        // Zero-length files cannot be mapped on every platform.
        let mmap = if file.metadata()?.len() == 0 {
            None
        } else {
            // SAFETY: The file is opened read-only and we assume it is not modified concurrently.
            // This is the standard safety contract for memory mapping.
            #[allow(unsafe_code)]
            let mmap = unsafe { Mmap::map(&file)? };
            Some(Arc::new(mmap))
        };
        Ok(Self {
            mmap,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Returns the file contents as a byte slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match &self.mmap {
            Some(mmap) => &mmap[..],
            None => &[],
        }
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Returns true if the file is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    /// Path the reader was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// On-disk encoding of a step trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceFormat {
    /// Magic header followed by fixed-size records.
    Binary,
    /// One JSON record per line.
    JsonLines,
}

impl TraceFormat {
    /// Guesses the format from a file extension: `.jsonl`/`.json` are JSON
    /// lines, everything else binary.
    #[must_use]
    pub fn from_extension(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("jsonl" | "json") => Self::JsonLines,
            _ => Self::Binary,
        }
    }
}

/// A step-trace file reader with memory-mapped I/O.
///
/// The format is detected from the content: files starting with the binary
/// magic are decoded as binary records, anything else as JSON lines.
pub struct TraceFileReader {
    reader: MappedFileReader,
    format: TraceFormat,
}

impl TraceFileReader {
    /// Opens a trace file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened, or if it looks binary
    /// but its header is invalid.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = MappedFileReader::open(path)?;
        let format = if is_binary_trace(reader.as_bytes()) {
            TraceParser::new(reader.as_bytes())?;
            TraceFormat::Binary
        } else {
            TraceFormat::JsonLines
        };
        Ok(Self { reader, format })
    }

    /// Detected format.
    #[must_use]
    pub fn format(&self) -> TraceFormat {
        self.format
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn file_size(&self) -> usize {
        self.reader.len()
    }

    /// Path of the trace.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.reader.path()
    }

    /// Iterates over the records of the trace in file order.
    ///
    /// A malformed binary record ends the iteration; a malformed JSON line is
    /// yielded as an error and iteration continues with the next line.
    ///
    /// # Errors
    /// Returns an error if the binary header is invalid or a JSON trace is
    /// not UTF-8.
    pub fn records(&self) -> Result<Box<dyn Iterator<Item = Result<TraceRecord>> + '_>> {
        let data = self.reader.as_bytes();
        match self.format {
            TraceFormat::Binary => {
                let parser = TraceParser::new(data)?;
                Ok(Box::new(parser.map(|r| r.map_err(Error::from))))
            }
            TraceFormat::JsonLines => {
                let text = std::str::from_utf8(data).map_err(|e| {
                    Error::InvalidFormat(format!(
                        "{} is neither a binary trace nor UTF-8 JSON lines: {e}",
                        self.path().display()
                    ))
                })?;
                Ok(Box::new(text.lines().enumerate().filter_map(
                    |(i, line)| parse_json_line(line, i + 1).map_err(Error::from).transpose(),
                )))
            }
        }
    }

    /// Reads every record into memory.
    ///
    /// # Errors
    /// Returns the first decoding error.
    pub fn read_all(&self) -> Result<Vec<TraceRecord>> {
        self.records()?.collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdtesim_core::{IncidentKinematics, StepDeposit, Vec3};
    use cdtesim_trace::TraceHeader;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn sample() -> Vec<TraceRecord> {
        vec![
            TraceRecord::EventBegin(IncidentKinematics {
                event_id: 3,
                energy_kev: 22.0,
                ..IncidentKinematics::default()
            }),
            TraceRecord::Step(StepDeposit::in_pixel(7, 5.5, Vec3::new(12.7, 1.0, 2.0))),
            TraceRecord::EventEnd { event_id: 3 },
        ]
    }

    #[test]
    fn test_reads_binary_trace() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&TraceHeader::default().encode()).unwrap();
        for record in sample() {
            file.write_all(&record.encode()).unwrap();
        }
        file.flush().unwrap();

        let reader = TraceFileReader::open(file.path()).unwrap();
        assert_eq!(reader.format(), TraceFormat::Binary);
        assert_eq!(reader.read_all().unwrap(), sample());
    }

    #[test]
    fn test_reads_json_lines_with_blank_lines() {
        let mut file = NamedTempFile::new().unwrap();
        for record in sample() {
            writeln!(file, "{}", serde_json::to_string(&record).unwrap()).unwrap();
            writeln!(file).unwrap();
        }
        file.flush().unwrap();

        let reader = TraceFileReader::open(file.path()).unwrap();
        assert_eq!(reader.format(), TraceFormat::JsonLines);
        assert_eq!(reader.read_all().unwrap(), sample());
    }

    #[test]
    fn test_json_error_reports_line() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", serde_json::to_string(&sample()[0]).unwrap()).unwrap();
        writeln!(file, "{{\"record\": \"nonsense\"}}").unwrap();
        file.flush().unwrap();

        let reader = TraceFileReader::open(file.path()).unwrap();
        let err = reader.read_all().unwrap_err();
        assert!(matches!(
            err,
            Error::TraceError(cdtesim_trace::Error::Json { line: 2, .. })
        ));
    }

    #[test]
    fn test_empty_file() {
        let file = NamedTempFile::new().unwrap();
        let reader = TraceFileReader::open(file.path()).unwrap();
        assert!(reader.read_all().unwrap().is_empty());
        assert_eq!(reader.file_size(), 0);
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            TraceFormat::from_extension(Path::new("run.jsonl")),
            TraceFormat::JsonLines
        );
        assert_eq!(
            TraceFormat::from_extension(Path::new("run.steps")),
            TraceFormat::Binary
        );
    }
}
