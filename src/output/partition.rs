//! Hive-style partition paths
//!
//! A record's partition is the sub-path `<key>=<value>[/<key>=<value>...]`
//! built from its partition columns. Values are percent-escaped so that a
//! value can never introduce an extra path segment.

use crate::error::{Error, Result};
use crate::mapping::{MappingTable, TypedRecord, TypedValue};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Characters escaped in partition values, beyond control characters
const ESCAPED: &[char] = &[
    '"', '#', '%', '\'', '*', '/', ':', '=', '?', '\\', '\x7f', '{', '[', ']', '^',
];

fn needs_escape(c: char) -> bool {
    c.is_control() || ESCAPED.contains(&c)
}

/// Escape a value for use in a path segment
pub fn escape_partition_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if needs_escape(c) {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                let _ = write!(escaped, "%{byte:02X}");
            }
        } else {
            escaped.push(c);
        }
    }
    escaped
}

/// Reverse [`escape_partition_value`]; malformed escapes are kept literally
pub fn unescape_partition_value(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let decoded = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(byte) = decoded {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Parse `key=value` path segments, skipping segments of any other shape
pub fn parse_partition_path(path: &str) -> Vec<(String, String)> {
    path.split('/')
        .filter_map(|segment| {
            let (key, value) = segment.split_once('=')?;
            (!key.is_empty()).then(|| (key.to_string(), unescape_partition_value(value)))
        })
        .collect()
}

/// Computes partition sub-paths for typed records
#[derive(Debug, Clone)]
pub struct Partitioner {
    keys: Vec<(String, usize)>,
}

impl Partitioner {
    /// Resolve partition key names against the mapping table
    pub fn new(table: &MappingTable, keys: &[String]) -> Result<Self> {
        let mut resolved = Vec::with_capacity(keys.len());
        for key in keys {
            let index = table.index_of(key).ok_or_else(|| {
                Error::invalid_value(
                    "sink.partition_keys",
                    format!("partition key '{key}' is not a mapped target field"),
                )
            })?;
            if resolved.iter().any(|(name, _)| name == key) {
                return Err(Error::invalid_value(
                    "sink.partition_keys",
                    format!("partition key '{key}' is listed twice"),
                ));
            }
            resolved.push((key.clone(), index));
        }
        Ok(Self { keys: resolved })
    }

    /// Partition key names
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|(name, _)| name.as_str())
    }

    /// Check if records are partitioned at all
    pub fn is_partitioned(&self) -> bool {
        !self.keys.is_empty()
    }

    /// Column positions to store in data files
    ///
    /// Partition columns are dropped unless `keep_partition_columns` is set.
    pub fn data_columns(&self, width: usize, keep_partition_columns: bool) -> Vec<usize> {
        (0..width)
            .filter(|i| keep_partition_columns || !self.keys.iter().any(|(_, k)| k == i))
            .collect()
    }

    /// Sub-path for one record, empty when unpartitioned
    pub fn partition_path(&self, record: &TypedRecord) -> Result<String> {
        let mut segments = Vec::with_capacity(self.keys.len());
        for (name, index) in &self.keys {
            let value = match record.get(*index) {
                Some(TypedValue::String(s)) if s.trim().is_empty() => None,
                Some(value) => Some(value.to_string()),
                None => None,
            };
            let value = value.ok_or_else(|| Error::missing_partition_key(name))?;
            segments.push(format!(
                "{}={}",
                escape_partition_value(name),
                escape_partition_value(&value)
            ));
        }
        Ok(segments.join("/"))
    }
}

/// Records grouped by partition sub-path, iterated in path order
#[derive(Debug, Default)]
pub struct PartitionGroups {
    groups: BTreeMap<String, Vec<TypedRecord>>,
}

impl PartitionGroups {
    /// Create an empty grouping
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record to its partition
    pub fn insert(&mut self, path: String, record: TypedRecord) {
        self.groups.entry(path).or_default().push(record);
    }

    /// Number of partitions
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Check if there are no partitions
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Total records across partitions
    pub fn rows(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    /// Records of one partition
    pub fn get(&self, path: &str) -> Option<&[TypedRecord]> {
        self.groups.get(path).map(Vec::as_slice)
    }

    /// Partitions in path order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[TypedRecord])> {
        self.groups
            .iter()
            .map(|(path, records)| (path.as_str(), records.as_slice()))
    }
}

impl IntoIterator for PartitionGroups {
    type Item = (String, Vec<TypedRecord>);
    type IntoIter = std::collections::btree_map::IntoIter<String, Vec<TypedRecord>>;

    fn into_iter(self) -> Self::IntoIter {
        self.groups.into_iter()
    }
}
