//! CLI module
//!
//! Command-line interface for running jobs.
//!
//! # Commands
//!
//! - `run` - Read, map, partition and publish a dataset
//! - `validate` - Check a job definition
//! - `schema` - Show the output schema
//! - `inspect` - Summarize a published dataset
//! - `list` - List built-in jobs

mod commands;
mod runner;

pub use commands::{Cli, Commands, OutputFormat};
pub use runner::Runner;
