//! Engine types
//!
//! Run lifecycle, statistics and the report emitted at the end of a run.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle of a run
///
/// `Reading → Mapping → Writing → Staged → Committed`, or `Failed` from any
/// stage before commit, or `Aborted` from `Staged`. There are no cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Discovering and fetching input files
    Reading,
    /// Applying the mapping table
    Mapping,
    /// Partitioning, encoding and staging output files
    Writing,
    /// All files staged, nothing visible yet
    Staged,
    /// Files published and `_SUCCESS` written
    Committed,
    /// Stopped by an error; nothing published
    Failed,
    /// Staging discarded on request; nothing published
    Aborted,
}

impl JobState {
    /// Label used in logs and reports
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Reading => "reading",
            JobState::Mapping => "mapping",
            JobState::Writing => "writing",
            JobState::Staged => "staged",
            JobState::Committed => "committed",
            JobState::Failed => "failed",
            JobState::Aborted => "aborted",
        }
    }

    /// Check if the run can make no further progress
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Committed | JobState::Failed | JobState::Aborted
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statistics from a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobStats {
    /// Input files read
    pub files_read: usize,
    /// Input bytes read
    pub bytes_read: usize,
    /// Rows read, including rejected ones
    pub records_read: usize,
    /// Records written to data files
    pub records_written: usize,
    /// Records sent to quarantine
    pub records_rejected: usize,
    /// Distinct partitions written
    pub partitions: usize,
    /// Data files written
    pub files_written: usize,
    /// Encoded bytes of data files
    pub bytes_written: usize,
}

impl JobStats {
    /// Create new stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fetched input file
    pub fn add_file_read(&mut self, bytes: usize) {
        self.files_read += 1;
        self.bytes_read += bytes;
    }

    /// Add a written data file
    pub fn add_file_written(&mut self, rows: usize, bytes: usize) {
        self.files_written += 1;
        self.records_written += rows;
        self.bytes_written += bytes;
    }
}

/// Rows and files of one published partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionSummary {
    /// Partition sub-path, empty for an unpartitioned dataset
    pub path: String,
    /// Records in the partition
    pub rows: usize,
    /// Data files of the partition
    pub files: usize,
}

/// Outcome of a finished run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Job name
    pub job: String,
    /// Run identifier used in file names
    pub run_id: String,
    /// Final state
    pub state: JobState,
    /// Source location
    pub source: String,
    /// Destination location
    pub destination: String,
    /// Quarantine location, if rejected records were written
    pub quarantine: Option<String>,
    /// Error policy the run used
    pub policy: String,
    /// Counters
    pub stats: JobStats,
    /// Rejections per error category
    pub rejected_by_kind: BTreeMap<String, usize>,
    /// Per-partition summary, in path order
    pub partitions: Vec<PartitionSummary>,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run reached its final state
    pub finished_at: DateTime<Utc>,
    /// Wall time in milliseconds
    pub duration_ms: u64,
}
