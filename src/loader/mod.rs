//! YAML Loader module
//!
//! Parse job definitions from YAML files.
//!
//! # Overview
//!
//! The loader module provides:
//! - `JobDefinition` - Declarative source, mapping, sink and policy of a job
//! - `JobOverrides` - Command-line replacements for paths and policy
//! - YAML parsing with validation

mod parser;
mod types;

pub use parser::{load_job, load_job_from_str, validate_job, JobOverrides};
pub use types::{
    ExecutionDefinition, JobDefinition, SinkDefinition, SinkFormat, SourceDefinition,
    SourceFormat,
};
