//! Common types used throughout the ETL job
//!
//! Closed sets of tags shared by the loader, mapper and writer:
//! field types, compression codecs and the data-quality error policy.

use crate::error::{Error, Result};
use arrow::datatypes::DataType;
use parquet::basic::{BrotliLevel, Compression, GzipLevel, ZstdLevel};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Field Type
// ============================================================================

/// Declared type of a mapped field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FieldType {
    /// UTF-8 text
    String,
    /// 64-bit signed integer
    BigInt,
    /// true / false
    Boolean,
}

impl FieldType {
    /// Canonical tag used in job definitions
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::BigInt => "bigint",
            FieldType::Boolean => "boolean",
        }
    }

    /// Arrow type this field is stored as
    pub fn data_type(&self) -> DataType {
        match self {
            FieldType::String => DataType::Utf8,
            FieldType::BigInt => DataType::Int64,
            FieldType::Boolean => DataType::Boolean,
        }
    }

    /// Map an Arrow type back to a field type, if it is one we write
    pub fn from_data_type(data_type: &DataType) -> Option<Self> {
        match data_type {
            DataType::Utf8 | DataType::LargeUtf8 => Some(FieldType::String),
            DataType::Int64 => Some(FieldType::BigInt),
            DataType::Boolean => Some(FieldType::Boolean),
            _ => None,
        }
    }
}

impl FromStr for FieldType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "string" | "str" | "utf8" => Ok(FieldType::String),
            "bigint" | "long" | "int64" | "integer" | "int" => Ok(FieldType::BigInt),
            "boolean" | "bool" => Ok(FieldType::Boolean),
            other => Err(Error::invalid_value(
                "type",
                format!("unknown field type '{other}' (expected string, bigint or boolean)"),
            )),
        }
    }
}

impl TryFrom<String> for FieldType {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<FieldType> for String {
    fn from(value: FieldType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Compression Codec
// ============================================================================

/// Block compression applied to every Parquet column chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionCodec {
    /// No compression
    #[serde(alias = "none")]
    Uncompressed,
    /// Snappy (default)
    #[default]
    Snappy,
    /// GZIP
    Gzip,
    /// Zstandard
    Zstd,
    /// LZ4 (raw block format)
    Lz4,
    /// Brotli
    Brotli,
}

impl CompressionCodec {
    /// Parquet compression setting for this codec
    pub fn to_parquet(self) -> Compression {
        match self {
            CompressionCodec::Uncompressed => Compression::UNCOMPRESSED,
            CompressionCodec::Snappy => Compression::SNAPPY,
            CompressionCodec::Gzip => Compression::GZIP(GzipLevel::default()),
            CompressionCodec::Zstd => Compression::ZSTD(ZstdLevel::default()),
            CompressionCodec::Lz4 => Compression::LZ4_RAW,
            CompressionCodec::Brotli => Compression::BROTLI(BrotliLevel::default()),
        }
    }

    /// Infix used in data file names (`part-00000-run.snappy.parquet`)
    pub fn file_suffix(self) -> Option<&'static str> {
        match self {
            CompressionCodec::Uncompressed => None,
            CompressionCodec::Snappy => Some("snappy"),
            CompressionCodec::Gzip => Some("gz"),
            CompressionCodec::Zstd => Some("zstd"),
            CompressionCodec::Lz4 => Some("lz4"),
            CompressionCodec::Brotli => Some("br"),
        }
    }
}

impl FromStr for CompressionCodec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uncompressed" | "none" => Ok(CompressionCodec::Uncompressed),
            "snappy" => Ok(CompressionCodec::Snappy),
            "gzip" => Ok(CompressionCodec::Gzip),
            "zstd" => Ok(CompressionCodec::Zstd),
            "lz4" => Ok(CompressionCodec::Lz4),
            "brotli" => Ok(CompressionCodec::Brotli),
            other => Err(Error::invalid_value(
                "compression",
                format!("unsupported codec '{other}'"),
            )),
        }
    }
}

// ============================================================================
// Error Policy
// ============================================================================

/// How data-quality errors are handled
///
/// No `Default`: every job definition states its policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Abort the run on the first bad record
    Strict,
    /// Send bad records to quarantine and keep going
    Lenient,
}

impl ErrorPolicy {
    /// Label used in logs and reports
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorPolicy::Strict => "strict",
            ErrorPolicy::Lenient => "lenient",
        }
    }
}
