//! Mapping table and typed record types

use super::coerce::coerce;
use crate::error::{Error, Result};
use crate::source::FieldLookup;
use crate::types::FieldType;
use arrow::datatypes::{Field, Schema, SchemaRef};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Field Mapping
// ============================================================================

/// One entry of the mapping table
///
/// In YAML either a 4-element sequence
/// `[source, source_type, target, target_type]` or a map with those keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "MappingSpec")]
pub struct FieldMapping {
    /// Field name in the source record
    pub source: String,
    /// Type of the source value
    pub source_type: FieldType,
    /// Field name in the output record
    pub target: String,
    /// Type of the output value
    pub target_type: FieldType,
}

impl FieldMapping {
    /// Create a mapping entry
    pub fn new(
        source: impl Into<String>,
        source_type: FieldType,
        target: impl Into<String>,
        target_type: FieldType,
    ) -> Self {
        Self {
            source: source.into(),
            source_type,
            target: target.into(),
            target_type,
        }
    }

    /// Keep the name, cast text to `target_type`
    pub fn cast(name: impl Into<String>, target_type: FieldType) -> Self {
        let name = name.into();
        Self::new(name.clone(), FieldType::String, name, target_type)
    }
}

/// Accepted YAML shapes for a mapping entry
#[derive(Deserialize)]
#[serde(untagged)]
enum MappingSpec {
    Tuple(String, FieldType, String, FieldType),
    Named {
        source: String,
        #[serde(default = "string_type")]
        source_type: FieldType,
        #[serde(default)]
        target: Option<String>,
        target_type: FieldType,
    },
}

fn string_type() -> FieldType {
    FieldType::String
}

impl TryFrom<MappingSpec> for FieldMapping {
    type Error = Error;

    fn try_from(spec: MappingSpec) -> Result<Self> {
        let mapping = match spec {
            MappingSpec::Tuple(source, source_type, target, target_type) => {
                Self::new(source, source_type, target, target_type)
            }
            MappingSpec::Named {
                source,
                source_type,
                target,
                target_type,
            } => {
                let target = target.unwrap_or_else(|| source.clone());
                Self::new(source, source_type, target, target_type)
            }
        };
        Ok(mapping)
    }
}

// ============================================================================
// Typed Values
// ============================================================================

/// A coerced value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum TypedValue {
    /// Text
    String(String),
    /// 64-bit signed integer
    BigInt(i64),
    /// Boolean
    Boolean(bool),
}

impl TypedValue {
    /// Type of this value
    pub fn field_type(&self) -> FieldType {
        match self {
            TypedValue::String(_) => FieldType::String,
            TypedValue::BigInt(_) => FieldType::BigInt,
            TypedValue::Boolean(_) => FieldType::Boolean,
        }
    }

    /// Text value, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TypedValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer value, if this is a bigint
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            TypedValue::BigInt(v) => Some(*v),
            _ => None,
        }
    }

    /// Boolean value, if this is a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TypedValue::Boolean(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedValue::String(s) => f.write_str(s),
            TypedValue::BigInt(v) => write!(f, "{v}"),
            TypedValue::Boolean(v) => write!(f, "{v}"),
        }
    }
}

/// An output record: values in mapping table order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedRecord {
    values: Vec<TypedValue>,
}

impl TypedRecord {
    /// Create from values in table order
    pub fn new(values: Vec<TypedValue>) -> Self {
        Self { values }
    }

    /// Value at a column position
    pub fn get(&self, index: usize) -> Option<&TypedValue> {
        self.values.get(index)
    }

    /// All values
    pub fn values(&self) -> &[TypedValue] {
        &self.values
    }

    /// Number of values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if there are no values
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// ============================================================================
// Mapping Table
// ============================================================================

/// Ordered, validated mapping table
#[derive(Debug, Clone)]
pub struct MappingTable {
    entries: Vec<FieldMapping>,
    schema: SchemaRef,
}

impl MappingTable {
    /// Validate entries and build the output schema
    pub fn new(entries: Vec<FieldMapping>) -> Result<Self> {
        if entries.is_empty() {
            return Err(Error::config("Mapping table must have at least one entry"));
        }

        let mut targets = HashSet::new();
        for entry in &entries {
            if entry.source.trim().is_empty() || entry.target.trim().is_empty() {
                return Err(Error::config("Mapping field names cannot be empty"));
            }
            if entry.source_type != FieldType::String {
                return Err(Error::invalid_value(
                    entry.source.clone(),
                    format!(
                        "source type must be string for delimited input, got {}",
                        entry.source_type
                    ),
                ));
            }
            if !targets.insert(entry.target.as_str()) {
                return Err(Error::config(format!(
                    "Duplicate target field '{}' in mapping table",
                    entry.target
                )));
            }
        }

        let fields: Vec<Field> = entries
            .iter()
            .map(|e| Field::new(&e.target, e.target_type.data_type(), false))
            .collect();

        Ok(Self {
            entries,
            schema: Arc::new(Schema::new(fields)),
        })
    }

    /// Entries in declared order
    pub fn entries(&self) -> &[FieldMapping] {
        &self.entries
    }

    /// Arrow schema of the output records
    pub fn schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    /// Column position of a target field
    pub fn index_of(&self, target: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.target == target)
    }

    /// Number of output fields
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Map one record; the first missing or uncoercible field fails the record
    pub fn apply<R: FieldLookup + ?Sized>(&self, record: &R) -> Result<TypedRecord> {
        let values = self
            .entries
            .iter()
            .map(|entry| {
                let raw = record
                    .field(&entry.source)
                    .ok_or_else(|| Error::missing_field(&entry.source))?;
                coerce(&entry.source, raw, entry.target_type)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(TypedRecord::new(values))
    }

    /// Output record as a JSON object keyed by target names
    pub fn to_json(&self, record: &TypedRecord) -> Value {
        let mut obj = Map::new();
        for (entry, value) in self.entries.iter().zip(record.values()) {
            obj.insert(
                entry.target.clone(),
                serde_json::to_value(value).unwrap_or(Value::Null),
            );
        }
        Value::Object(obj)
    }
}
