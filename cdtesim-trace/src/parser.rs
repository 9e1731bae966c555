//! Trace parsers for binary and JSON-lines input.

use crate::record::{TraceRecord, RECORD_SIZE};
use crate::{Error, Result, TraceHeader, HEADER_SIZE};

/// Iterator over the records of an in-memory binary trace.
///
/// The header is validated on construction. Iteration yields one
/// `Result<TraceRecord>` per record; a trailing partial record yields a
/// single [`Error::Truncated`] and ends the iteration.
#[derive(Debug, Clone)]
pub struct TraceParser<'a> {
    data: &'a [u8],
    offset: usize,
    index: usize,
    failed: bool,
}

impl<'a> TraceParser<'a> {
    /// Creates a parser over a complete binary trace, header included.
    ///
    /// # Errors
    /// Returns an error if the header is invalid.
    pub fn new(data: &'a [u8]) -> Result<Self> {
        TraceHeader::parse(data)?;
        Ok(Self {
            data,
            offset: HEADER_SIZE,
            index: 0,
            failed: false,
        })
    }

    /// Number of complete records in the trace.
    #[must_use]
    pub fn record_count(&self) -> usize {
        (self.data.len() - HEADER_SIZE) / RECORD_SIZE
    }

    /// Index of the next record to be parsed.
    #[must_use]
    pub fn position(&self) -> usize {
        self.index
    }
}

impl Iterator for TraceParser<'_> {
    type Item = Result<TraceRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.data.len() {
            return None;
        }
        let remaining = self.data.len() - self.offset;
        if remaining < RECORD_SIZE {
            self.failed = true;
            return Some(Err(Error::Truncated(format!(
                "{remaining} trailing bytes after record {}",
                self.index
            ))));
        }

        let raw = &self.data[self.offset..self.offset + RECORD_SIZE];
        let record = TraceRecord::parse(raw, self.index);
        self.offset += RECORD_SIZE;
        self.index += 1;
        if record.is_err() {
            self.failed = true;
        }
        Some(record)
    }
}

/// Parses one line of a JSON-lines trace. Blank lines yield `None`.
///
/// # Errors
/// Returns [`Error::Json`] with the 1-based line number on malformed input.
pub fn parse_json_line(line: &str, line_number: usize) -> Result<Option<TraceRecord>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(trimmed)
        .map(Some)
        .map_err(|source| Error::Json {
            line: line_number,
            source,
        })
}
