//! Rejected record collection
//!
//! In lenient mode every record that fails reading, mapping or
//! partitioning is kept here and later written as JSON Lines next to the
//! data, one object per record:
//!
//! ```json
//! {"source":"s3://raw/US_videos.csv","line":12,"error":"type_coercion","message":"...","record":{...}}
//! ```

use crate::error::{Error, Result};
use crate::source::RecordOrigin;
use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// File name of the rejected records of a run
pub fn quarantine_file_name(run_id: &str) -> String {
    format!("rejected-{run_id}.jsonl")
}

/// One rejected record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedRecord {
    /// File the record came from
    pub source: String,
    /// Line of the record in that file
    pub line: u64,
    /// Error category, see [`Error::kind`]
    pub error: String,
    /// Full error message
    pub message: String,
    /// The record as far as it could be read; `null` for unparseable rows
    pub record: Value,
}

impl RejectedRecord {
    /// Describe a rejection
    pub fn new(origin: &RecordOrigin, error: &Error, record: Value) -> Self {
        Self {
            source: origin.source.to_string(),
            line: origin.line,
            error: error.kind().to_string(),
            message: error.to_string(),
            record,
        }
    }

    /// Rejection of a row that could not be parsed at all
    pub fn unparsed(error: &Error) -> Self {
        let (source, line) = match error {
            Error::ReadParse {
                source_file, line, ..
            } => (source_file.clone(), *line),
            _ => (String::new(), 0),
        };
        Self {
            source,
            line,
            error: error.kind().to_string(),
            message: error.to_string(),
            record: Value::Null,
        }
    }
}

/// Rejected records of a run, in input order
#[derive(Debug, Clone, Default)]
pub struct Quarantine {
    records: Vec<RejectedRecord>,
}

impl Quarantine {
    /// Create an empty quarantine
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rejected record
    pub fn push(&mut self, record: RejectedRecord) {
        self.records.push(record);
    }

    /// Append all records of another quarantine
    pub fn extend(&mut self, other: Quarantine) {
        self.records.extend(other.records);
    }

    /// Number of rejected records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if nothing was rejected
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Rejected records
    pub fn iter(&self) -> impl Iterator<Item = &RejectedRecord> {
        self.records.iter()
    }

    /// Rejections per error category
    pub fn count_by_kind(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for record in &self.records {
            *counts.entry(record.error.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Serialize as JSON Lines
    pub fn to_jsonl(&self) -> Result<Bytes> {
        let mut buf = Vec::new();
        for record in &self.records {
            serde_json::to_writer(&mut buf, record)?;
            buf.push(b'\n');
        }
        Ok(Bytes::from(buf))
    }
}
