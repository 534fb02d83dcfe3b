//! Read back a partitioned Parquet dataset

use super::partition::parse_partition_path;
use super::schema::batch_to_records;
use super::staging::SUCCESS_MARKER;
use crate::error::{Error, Result};
use crate::mapping::TypedRecord;
use crate::storage::{is_hidden, StorageLocation};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::collections::BTreeMap;

/// One partition directory of a dataset
#[derive(Debug, Clone)]
pub struct DatasetPartition {
    /// Directory relative to the dataset root, empty for the root itself
    pub path: String,
    /// Decoded `key=value` pairs of the directory
    pub values: Vec<(String, String)>,
    /// Data files, relative to the dataset root
    pub files: Vec<String>,
    /// Contents of all files, in file order
    pub batches: Vec<RecordBatch>,
}

impl DatasetPartition {
    /// Total rows in the partition
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    /// Schema of the stored files
    pub fn schema(&self) -> Option<SchemaRef> {
        self.batches.first().map(RecordBatch::schema)
    }

    /// Partition value for a key
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Stored rows as typed records
    pub fn records(&self) -> Result<Vec<TypedRecord>> {
        let mut records = Vec::with_capacity(self.num_rows());
        for batch in &self.batches {
            records.extend(batch_to_records(batch)?);
        }
        Ok(records)
    }
}

/// Check whether a dataset carries the `_SUCCESS` marker
pub async fn is_committed(location: &StorageLocation) -> Result<bool> {
    Ok(location.head(&location.path(SUCCESS_MARKER)).await?.is_some())
}

/// Read every published Parquet file under `location`, grouped by directory
///
/// Staging directories and markers are ignored.
pub async fn read_dataset(location: &StorageLocation) -> Result<Vec<DatasetPartition>> {
    let objects = location.list("", true).await?;
    let mut partitions: BTreeMap<String, DatasetPartition> = BTreeMap::new();

    for meta in objects {
        let Some(relative) = location.relative(&meta.location) else {
            continue;
        };
        if is_hidden(relative) || !relative.ends_with(".parquet") {
            continue;
        }

        let dir = relative.rsplit_once('/').map_or("", |(dir, _)| dir).to_string();
        let bytes = location.get(&meta.location).await?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(bytes)
            .map_err(|e| Error::output(format!("{relative} is not a Parquet file: {e}")))?
            .build()?;
        let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;

        let partition = partitions
            .entry(dir.clone())
            .or_insert_with(|| DatasetPartition {
                values: parse_partition_path(&dir),
                path: dir,
                files: Vec::new(),
                batches: Vec::new(),
            });
        partition.files.push(relative.to_string());
        partition.batches.extend(batches);
    }

    Ok(partitions.into_values().collect())
}
