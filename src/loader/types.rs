//! Loader types
//!
//! Declarative job definition types for YAML parsing.

use crate::mapping::FieldMapping;
use crate::output::ParquetWriterConfig;
use crate::source::CsvOptions;
use crate::storage::RetryPolicy;
use crate::types::{CompressionCodec, ErrorPolicy};
use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Duration;

// ============================================================================
// Job Definition
// ============================================================================

/// Top-level job definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct JobDefinition {
    /// Job name, used for lineage, logging and as the run id prefix
    pub name: String,
    /// Where and how to read
    pub source: SourceDefinition,
    /// Ordered mapping table
    pub mappings: Vec<FieldMapping>,
    /// Transformation context label of the mapping stage
    #[serde(default)]
    pub mapping_ctx: Option<String>,
    /// Where and how to write
    pub sink: SinkDefinition,
    /// Data-quality error policy (required)
    pub policy: ErrorPolicy,
    /// Location for rejected records; required with the lenient policy
    #[serde(default)]
    pub quarantine: Option<String>,
    /// Concurrency and retry settings
    #[serde(default)]
    pub execution: ExecutionDefinition,
}

// ============================================================================
// Source Definition
// ============================================================================

/// Input format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    /// Delimited text
    #[default]
    Csv,
}

/// Source definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SourceDefinition {
    /// Storage URL prefix of the input files
    pub path: String,
    /// Input format
    #[serde(default)]
    pub format: SourceFormat,
    /// Parsing options
    #[serde(flatten)]
    pub options: CsvOptions,
    /// Transformation context label
    #[serde(default)]
    pub ctx: Option<String>,
}

// ============================================================================
// Sink Definition
// ============================================================================

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkFormat {
    /// Apache Parquet
    #[default]
    Parquet,
}

/// Sink definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SinkDefinition {
    /// Storage URL of the dataset root
    pub path: String,
    /// Output format
    #[serde(default)]
    pub format: SinkFormat,
    /// Target fields the dataset is partitioned by, outermost first
    #[serde(default)]
    pub partition_keys: Vec<String>,
    /// Column chunk compression
    #[serde(default)]
    pub compression: CompressionCodec,
    /// Maximum rows per Parquet row group
    #[serde(default = "default_row_group_size")]
    pub row_group_size: usize,
    /// Split partitions into files of at most this many rows
    #[serde(default)]
    pub max_rows_per_file: Option<usize>,
    /// Also store partition columns inside the data files
    #[serde(default = "default_true")]
    pub keep_partition_columns: bool,
    /// Transformation context label
    #[serde(default)]
    pub ctx: Option<String>,
}

fn default_row_group_size() -> usize {
    1024 * 1024
}

fn default_true() -> bool {
    true
}

impl SinkDefinition {
    /// Parquet writer settings for this sink
    pub fn writer_config(&self) -> ParquetWriterConfig {
        ParquetWriterConfig::new()
            .with_codec(self.compression)
            .with_row_group_size(self.row_group_size)
    }
}

// ============================================================================
// Execution Definition
// ============================================================================

/// Concurrency and retry settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ExecutionDefinition {
    /// Splits and files processed at once; defaults to available parallelism
    #[serde(default)]
    pub concurrency: Option<usize>,
    /// Retries for transient storage failures
    #[serde(default)]
    pub max_retries: Option<u32>,
    /// First retry delay in milliseconds
    #[serde(default)]
    pub initial_backoff_ms: Option<u64>,
    /// Upper bound of the retry delay in milliseconds
    #[serde(default)]
    pub max_backoff_ms: Option<u64>,
}

impl ExecutionDefinition {
    /// Effective concurrency
    pub fn concurrency(&self) -> usize {
        self.concurrency
            .unwrap_or_else(|| std::thread::available_parallelism().map_or(4, usize::from))
            .max(1)
    }

    /// Retry policy for storage calls
    pub fn retry_policy(&self) -> RetryPolicy {
        let default = RetryPolicy::default();
        RetryPolicy {
            max_retries: self.max_retries.unwrap_or(default.max_retries),
            initial_backoff: self
                .initial_backoff_ms
                .map_or(default.initial_backoff, Duration::from_millis),
            max_backoff: self
                .max_backoff_ms
                .map_or(default.max_backoff, Duration::from_millis),
        }
    }
}

// ============================================================================
// Run Identity
// ============================================================================

static UNSAFE_RUN_ID_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_.-]+").unwrap());

impl JobDefinition {
    /// Path-safe form of the job name, the prefix of every run id
    pub fn run_prefix(&self) -> String {
        let id = UNSAFE_RUN_ID_CHARS.replace_all(self.name.trim(), "_");
        let id = id.trim_matches('_');
        if id.is_empty() {
            "run".to_string()
        } else {
            id.to_string()
        }
    }

    /// Fresh identifier for one execution: `<prefix>-<UTC timestamp>-<random>`
    ///
    /// Output file names embed it, so files of different runs never collide.
    pub fn new_run_id(&self) -> String {
        let uuid = uuid::Uuid::new_v4().simple().to_string();
        format!(
            "{}-{}-{}",
            self.run_prefix(),
            Utc::now().format("%Y%m%dT%H%M%SZ"),
            &uuid[..8]
        )
    }
}
