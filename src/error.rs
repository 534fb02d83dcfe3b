//! Error types for the trending ETL job
//!
//! This module defines the error hierarchy for the whole pipeline.
//! All public APIs return `Result<T, Error>` where Error is defined here.
//!
//! Data-quality errors (`ReadParse`, `MissingField`, `TypeCoercion`,
//! `MissingPartitionKey`) are routed through the job's [`ErrorPolicy`];
//! everything else aborts the run.
//!
//! [`ErrorPolicy`]: crate::types::ErrorPolicy

use thiserror::Error;

/// The main error type for the ETL job
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid config value for '{field}': {message}")]
    InvalidConfigValue { field: String, message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ============================================================================
    // Data Quality Errors
    // ============================================================================
    #[error("Malformed row in {source_file} at line {line}: {message}")]
    ReadParse {
        source_file: String,
        line: u64,
        message: String,
    },

    #[error("Field '{field}' is missing from the source record")]
    MissingField { field: String },

    #[error("Cannot coerce field '{field}' value {value:?} to {target}: {message}")]
    TypeCoercion {
        field: String,
        value: String,
        target: String,
        message: String,
    },

    #[error("Partition key '{field}' is null or empty")]
    MissingPartitionKey { field: String },

    // ============================================================================
    // Storage Errors
    // ============================================================================
    #[error("Write failed for {path}: {message}")]
    Write { path: String, message: String },

    #[error("Read failed for {path}: {message}")]
    Read { path: String, message: String },

    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("Commit failed: {message}")]
    Commit { message: String },

    // ============================================================================
    // Arrow/Parquet Errors
    // ============================================================================
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Output error: {message}")]
    Output { message: String },

    // ============================================================================
    // I/O Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid config value error
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfigValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a read parse error for a source row
    pub fn read_parse(source_file: impl Into<String>, line: u64, message: impl Into<String>) -> Self {
        Self::ReadParse {
            source_file: source_file.into(),
            line,
            message: message.into(),
        }
    }

    /// Create a missing field error
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Create a type coercion error
    pub fn coercion(
        field: impl Into<String>,
        value: impl Into<String>,
        target: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::TypeCoercion {
            field: field.into(),
            value: value.into(),
            target: target.into(),
            message: message.into(),
        }
    }

    /// Create a missing partition key error
    pub fn missing_partition_key(field: impl Into<String>) -> Self {
        Self::MissingPartitionKey {
            field: field.into(),
        }
    }

    /// Create a write error
    pub fn write(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Write {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a read error
    pub fn read(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Read {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a commit error
    pub fn commit(message: impl Into<String>) -> Self {
        Self::Commit {
            message: message.into(),
        }
    }

    /// Create an output error
    pub fn output(message: impl Into<String>) -> Self {
        Self::Output {
            message: message.into(),
        }
    }

    /// Check if this error is a data-quality error subject to the error policy
    pub fn is_data_quality(&self) -> bool {
        matches!(
            self,
            Error::ReadParse { .. }
                | Error::MissingField { .. }
                | Error::TypeCoercion { .. }
                | Error::MissingPartitionKey { .. }
        )
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Write { .. } | Error::Read { .. } => true,
            Error::ObjectStore(e) => is_retryable_store_error(e),
            _ => false,
        }
    }

    /// Short, stable label for the error category
    pub fn kind(&self) -> &'static str {
        match self {
            Error::ReadParse { .. } => "read_parse",
            Error::MissingField { .. } => "missing_field",
            Error::TypeCoercion { .. } => "type_coercion",
            Error::MissingPartitionKey { .. } => "missing_partition_key",
            Error::Write { .. } | Error::ObjectStore(_) => "write",
            Error::Read { .. } => "read",
            Error::Commit { .. } => "commit",
            Error::Config { .. }
            | Error::InvalidConfigValue { .. }
            | Error::YamlParse(_)
            | Error::JsonParse(_)
            | Error::InvalidUrl(_) => "config",
            Error::Arrow(_) | Error::Parquet(_) | Error::Output { .. } => "output",
            Error::Csv(_) => "csv",
            Error::Io(_) => "io",
            Error::Other(_) | Error::Anyhow(_) => "other",
        }
    }
}

/// Store errors that describe the request rather than the transport are final
fn is_retryable_store_error(err: &object_store::Error) -> bool {
    !matches!(
        err,
        object_store::Error::NotFound { .. }
            | object_store::Error::InvalidPath { .. }
            | object_store::Error::NotSupported { .. }
            | object_store::Error::AlreadyExists { .. }
            | object_store::Error::Precondition { .. }
            | object_store::Error::NotImplemented
            | object_store::Error::UnknownConfigurationKey { .. }
    )
}

/// Result type alias for the ETL job
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", message.into(), inner))
        })
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", f(), inner))
        })
    }
}
