//! W3C extended log decoding
//!
//! CloudFront writes access logs as gzip-compressed text:
//!
//! ```text
//! #Version: 1.0
//! #Fields: date time x-edge-location sc-bytes c-ip
//! 2024-01-01 00:00:00 FRA56-P1 1045 1.2.3.4
//! ```
//!
//! [`W3cDecoder`] is fed one line at a time. It remembers the field names of
//! the last `#Fields:` directive and turns every following data line into a
//! [`LogRecord`] with exactly one value per field.

use flate2::read::MultiGzDecoder;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::io::Read;
use thiserror::Error;
use tracing::debug;

/// Prefix of the directive that declares the field names
pub const FIELDS_DIRECTIVE: &str = "#Fields:";

/// Prefix of every other directive or comment line
pub const COMMENT_MARKER: char = '#';

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("field count mismatch on line {line}: expected {expected}, got {got}")]
    FieldCountMismatch {
        line: usize,
        expected: usize,
        got: usize,
    },
}

/// Gunzip a whole object body.
///
/// Concatenated gzip members are read as one stream.
pub fn decompress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = MultiGzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed)?;
    debug!(
        compressed = data.len(),
        decompressed = decompressed.len(),
        "decompressed object"
    );
    Ok(decompressed)
}

/// One data line, paired with the header it was decoded against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord<'a> {
    fields: &'a [String],
    values: Vec<&'a str>,
}

impl<'a> LogRecord<'a> {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&'a str> {
        self.fields
            .iter()
            .position(|f| f == field)
            .map(|idx| self.values[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a str)> + '_ {
        self.fields
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }

    /// Compact JSON object with keys in header order
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl Serialize for LogRecord<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (field, value) in self.iter() {
            map.serialize_entry(field, value)?;
        }
        map.end()
    }
}

/// What a single input line turned out to be
#[derive(Debug, PartialEq, Eq)]
pub enum Line<'a> {
    /// A `#Fields:` directive; the header has been replaced
    Header,
    /// A comment, or a line seen before any header
    Skipped,
    Record(LogRecord<'a>),
}

/// Line-at-a-time decoder for a single file
#[derive(Debug, Default)]
pub struct W3cDecoder {
    header: Vec<String>,
    line_no: usize,
}

impl W3cDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Field names of the current header, empty until a directive is seen
    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Number of lines fed so far
    pub fn lines_seen(&self) -> usize {
        self.line_no
    }

    pub fn feed<'a>(&'a mut self, line: &'a str) -> Result<Line<'a>, DecodeError> {
        self.line_no += 1;

        if let Some(fields) = line.strip_prefix(FIELDS_DIRECTIVE) {
            self.header = fields.split_whitespace().map(str::to_string).collect();
            return Ok(Line::Header);
        }

        if line.starts_with(COMMENT_MARKER) || self.header.is_empty() {
            return Ok(Line::Skipped);
        }

        let values: Vec<&str> = line.split_whitespace().collect();
        if values.len() != self.header.len() {
            return Err(DecodeError::FieldCountMismatch {
                line: self.line_no,
                expected: self.header.len(),
                got: values.len(),
            });
        }

        Ok(Line::Record(LogRecord {
            fields: &self.header,
            values,
        }))
    }
}
