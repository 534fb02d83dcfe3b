//! YAML parser for job definitions
//!
//! Parses and validates job YAML files.
//! Supports both built-in jobs (by name) and custom YAML files (by path).

use crate::error::{Error, Result};
use crate::jobs;
use crate::loader::types::JobDefinition;
use crate::mapping::MappingTable;
use crate::output::Partitioner;
use crate::types::ErrorPolicy;
use std::fs;
use std::path::Path;

/// Load a job definition from a name or file path
///
/// Built-in job names (e.g. `youtube-statistics`) are checked first,
/// then the input is read as a path.
///
/// # Examples
///
/// ```ignore
/// let job = load_job("youtube-statistics")?;
/// let job = load_job("./jobs/my-job.yaml")?;
/// ```
pub fn load_job(path: impl AsRef<Path>) -> Result<JobDefinition> {
    let path = path.as_ref();
    let path_str = path.to_string_lossy();

    if !path_str.contains('/')
        && !path_str.contains('\\')
        && !path_str.ends_with(".yaml")
        && !path_str.ends_with(".yml")
    {
        if let Some(yaml) = jobs::get_builtin(&path_str) {
            return load_job_from_str(yaml);
        }
    }

    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::config(format!(
                "Job '{}' not found. Built-in jobs: {}. Or provide a path to a YAML file.",
                path.display(),
                jobs::list_builtin().join(", ")
            ))
        } else {
            Error::config(format!(
                "Failed to read job file '{}': {e}",
                path.display()
            ))
        }
    })?;
    load_job_from_str(&content)
}

/// Load a job definition from a YAML string
pub fn load_job_from_str(yaml: &str) -> Result<JobDefinition> {
    let job: JobDefinition = serde_yaml::from_str(yaml)
        .map_err(|e| Error::config(format!("Failed to parse job YAML: {e}")))?;

    validate_job(&job)?;
    Ok(job)
}

/// Validate a job definition
pub fn validate_job(job: &JobDefinition) -> Result<()> {
    if job.name.trim().is_empty() {
        return Err(Error::config("Job name cannot be empty"));
    }

    if job.source.path.trim().is_empty() {
        return Err(Error::invalid_value("source.path", "cannot be empty"));
    }
    job.source.options.validate()?;

    if job.sink.path.trim().is_empty() {
        return Err(Error::invalid_value("sink.path", "cannot be empty"));
    }
    if same_location(&job.source.path, &job.sink.path) {
        return Err(Error::invalid_value(
            "sink.path",
            "must differ from the source path",
        ));
    }
    if job.sink.row_group_size == 0 {
        return Err(Error::invalid_value("sink.row_group_size", "must be positive"));
    }
    if job.sink.max_rows_per_file == Some(0) {
        return Err(Error::invalid_value(
            "sink.max_rows_per_file",
            "must be positive",
        ));
    }

    let table = MappingTable::new(job.mappings.clone())?;
    Partitioner::new(&table, &job.sink.partition_keys)?;

    match (&job.policy, job.quarantine.as_deref()) {
        (ErrorPolicy::Lenient, None) => {
            return Err(Error::invalid_value(
                "quarantine",
                "a quarantine location is required with the lenient policy",
            ));
        }
        (_, Some(quarantine)) if quarantine.trim().is_empty() => {
            return Err(Error::invalid_value("quarantine", "cannot be empty"));
        }
        (_, Some(quarantine)) if same_location(quarantine, &job.sink.path) => {
            return Err(Error::invalid_value(
                "quarantine",
                "must differ from the sink path",
            ));
        }
        _ => {}
    }

    if job.execution.concurrency == Some(0) {
        return Err(Error::invalid_value(
            "execution.concurrency",
            "must be positive",
        ));
    }

    Ok(())
}

fn same_location(a: &str, b: &str) -> bool {
    a.trim().trim_end_matches('/') == b.trim().trim_end_matches('/')
}

/// Command-line overrides applied on top of a loaded definition
#[derive(Debug, Clone, Default)]
pub struct JobOverrides {
    /// Replace the source path
    pub source: Option<String>,
    /// Replace the sink path
    pub destination: Option<String>,
    /// Replace the error policy
    pub policy: Option<ErrorPolicy>,
    /// Replace the quarantine location
    pub quarantine: Option<String>,
    /// Replace the concurrency
    pub concurrency: Option<usize>,
}

impl JobOverrides {
    /// Check if no override is set
    pub fn is_empty(&self) -> bool {
        self.source.is_none()
            && self.destination.is_none()
            && self.policy.is_none()
            && self.quarantine.is_none()
            && self.concurrency.is_none()
    }

    /// Apply the overrides and re-validate
    pub fn apply(self, mut job: JobDefinition) -> Result<JobDefinition> {
        if let Some(source) = self.source {
            job.source.path = source;
        }
        if let Some(destination) = self.destination {
            job.sink.path = destination;
        }
        if let Some(policy) = self.policy {
            job.policy = policy;
        }
        if let Some(quarantine) = self.quarantine {
            job.quarantine = Some(quarantine);
        }
        if let Some(concurrency) = self.concurrency {
            job.execution.concurrency = Some(concurrency);
        }

        validate_job(&job)?;
        Ok(job)
    }
}
