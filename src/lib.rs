//! # Trending ETL
//!
//! A batch job that turns delimited video trending statistics into a
//! region-partitioned Parquet dataset.
//!
//! ## Features
//!
//! - **Delimited input**: CSV files under any `s3://`, `gs://`, `az://` or local prefix
//! - **Typed mapping**: Declarative rename and cast table loaded from YAML
//! - **Explicit error policy**: `strict` aborts, `lenient` quarantines rejected records
//! - **Partitioned Parquet output**: Hive-style `region=US/` directories
//! - **Atomic publish**: Files are staged and only become visible on commit
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use trending_etl::{engine::Pipeline, load_job, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // Built-in job, with local paths
//!     let mut job = load_job("youtube-statistics")?;
//!     job.source.path = "data/raw".into();
//!     job.sink.path = "data/clean".into();
//!
//!     let pipeline = Pipeline::new(job)?;
//!     let staged = pipeline.execute().await?;
//!     let report = staged.commit().await?;
//!     println!("{} records written", report.stats.records_written);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌─────────────┐   ┌──────────┐   ┌──────────┐
//! │  Source  │──►│ Mapping  │──►│ Partitioner │──►│  Writer  │──►│  Stage   │
//! │ CSV split│   │ coerce   │   │ region=US   │   │ Parquet  │   │ commit / │
//! │ per file │   │ rename   │   │             │   │ + codec  │   │ abort    │
//! └──────────┘   └────┬─────┘   └──────┬──────┘   └──────────┘   └──────────┘
//!                     │                │
//!                     └──── rejected ──┴──► Quarantine (lenient only)
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types
pub mod error;

/// Common types: field types, codecs, error policy
pub mod types;

/// Object storage access with retry
pub mod storage;

/// Delimited text source
pub mod source;

/// Typed field mapping
pub mod mapping;

/// Arrow/Parquet output, partitioning and staging
pub mod output;

/// Rejected record collection
pub mod quarantine;

/// Main execution engine
pub mod engine;

/// YAML loader for job definitions
pub mod loader;

/// Built-in job definitions
pub mod jobs;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

// Re-export commonly used types
pub use engine::{Pipeline, RunReport, StagedRun};
pub use loader::{load_job, load_job_from_str, JobDefinition};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
