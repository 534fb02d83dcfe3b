//! Output module
//!
//! Turns typed records into a partitioned Parquet dataset.
//!
//! # Overview
//!
//! This module provides utilities for:
//! - Converting typed records to Arrow RecordBatches and back
//! - Computing Hive-style partition paths (`region=US/`)
//! - Encoding Parquet files with a configurable codec
//! - Staging files under `_temporary/` and publishing them atomically
//! - Reading a published dataset back

mod partition;
mod reader;
mod schema;
mod staging;
mod writer;

pub use partition::{
    escape_partition_value, parse_partition_path, unescape_partition_value, PartitionGroups,
    Partitioner,
};
pub use reader::{is_committed, read_dataset, DatasetPartition};
pub use schema::{batch_to_json, batch_to_records, project_schema, records_to_batch};
pub use staging::{part_file_name, Stage, StagedFile, STAGING_DIR, SUCCESS_MARKER};
pub use writer::{encode_parquet, ParquetWriter, ParquetWriterConfig};
