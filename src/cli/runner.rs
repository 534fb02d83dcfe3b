//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands, OutputFormat};
use crate::engine::{Pipeline, RunReport};
use crate::error::Result;
use crate::jobs::{get_builtin, list_builtin};
use crate::loader::{load_job, load_job_from_str, JobDefinition, JobOverrides};
use crate::mapping::MappingTable;
use crate::output::{batch_to_json, is_committed, read_dataset, DatasetPartition};
use crate::storage::StorageLocation;
use crate::types::ErrorPolicy;
use serde_json::{json, Value};
use tracing::Instrument;

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        match &self.cli.command {
            Commands::Run {
                job_name,
                source,
                destination,
                policy,
                quarantine,
                concurrency,
                no_commit,
            } => {
                let overrides = JobOverrides {
                    source: source.clone(),
                    destination: destination.clone(),
                    policy: *policy,
                    quarantine: quarantine.clone(),
                    concurrency: *concurrency,
                };
                self.run_job(job_name, overrides, !*no_commit).await
            }
            Commands::Validate => self.validate(),
            Commands::Schema => self.schema(),
            Commands::Inspect { path, rows } => self.inspect(path, *rows).await,
            Commands::List => self.list_jobs(),
        }
    }

    /// Load the job definition named by `--job-def`
    fn load_job(&self) -> Result<JobDefinition> {
        load_job(&self.cli.job_def)
    }

    /// Run the job, then commit or abort
    async fn run_job(&self, job_name: &str, overrides: JobOverrides, commit: bool) -> Result<()> {
        let mut job = self.load_job()?;
        if !overrides.is_empty() {
            job = overrides.apply(job)?;
        }
        if job.policy == ErrorPolicy::Lenient {
            tracing::warn!("Lenient policy: invalid records will be quarantined, not fail the run");
        }

        let pipeline = Pipeline::new(job)?;
        let span = tracing::info_span!("run", job_name = %job_name, run_id = %pipeline.run_id());

        self.output_message(&json!({
            "type": "LOG",
            "log": {
                "level": "INFO",
                "message": format!(
                    "Running job '{}' as '{job_name}' from {} to {}",
                    pipeline.job().name,
                    pipeline.job().source.path,
                    pipeline.job().sink.path
                )
            }
        }));

        let report = pipeline.run(commit).instrument(span).await?;
        self.output_message(&report_message(&report));
        Ok(())
    }

    /// Validate job definition
    fn validate(&self) -> Result<()> {
        let job = self.load_job()?;

        self.output_message(&json!({
            "type": "LOG",
            "log": {
                "level": "INFO",
                "message": format!(
                    "Job '{}' is valid with {} mappings, partitioned by [{}], policy {}",
                    job.name,
                    job.mappings.len(),
                    job.sink.partition_keys.join(", "),
                    job.policy.as_str()
                )
            }
        }));

        Ok(())
    }

    /// Show the output schema
    fn schema(&self) -> Result<()> {
        let job = self.load_job()?;
        let table = MappingTable::new(job.mappings.clone())?;
        self.output_message(&schema_message(&job, &table));
        Ok(())
    }

    /// Summarize a published dataset
    async fn inspect(&self, path: &str, rows: usize) -> Result<()> {
        let location = StorageLocation::parse(path)?;
        let committed = is_committed(&location).await?;
        if !committed {
            tracing::warn!("{} has no _SUCCESS marker", location.url());
        }

        let partitions = read_dataset(&location).await?;
        let summaries = partitions
            .iter()
            .map(|partition| partition_message(partition, rows))
            .collect::<Result<Vec<_>>>()?;
        let total: usize = partitions.iter().map(DatasetPartition::num_rows).sum();

        self.output_message(&json!({
            "type": "DATASET",
            "dataset": {
                "location": location.url(),
                "committed": committed,
                "rows": total,
                "partitions": summaries
            }
        }));

        Ok(())
    }

    /// List built-in jobs
    fn list_jobs(&self) -> Result<()> {
        let jobs = list_builtin()
            .into_iter()
            .filter_map(|name| {
                let job = load_job_from_str(get_builtin(name)?).ok()?;
                Some(json!({
                    "name": name,
                    "source": job.source.path,
                    "destination": job.sink.path,
                    "partition_keys": job.sink.partition_keys,
                    "policy": job.policy.as_str()
                }))
            })
            .collect::<Vec<_>>();

        self.output_message(&json!({
            "type": "JOBS",
            "jobs": jobs
        }));

        Ok(())
    }

    /// Output a message
    fn output_message(&self, msg: &Value) {
        match self.cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string(msg).unwrap_or_default());
            }
            OutputFormat::Pretty => {
                println!("{}", serde_json::to_string_pretty(msg).unwrap_or_default());
            }
        }
    }
}

fn report_message(report: &RunReport) -> Value {
    json!({
        "type": "REPORT",
        "report": report
    })
}

fn schema_message(job: &JobDefinition, table: &MappingTable) -> Value {
    let fields: Vec<Value> = table
        .entries()
        .iter()
        .map(|mapping| {
            json!({
                "name": mapping.target,
                "type": mapping.target_type.as_str(),
                "source": mapping.source,
                "source_type": mapping.source_type.as_str(),
                "partition": job.sink.partition_keys.contains(&mapping.target)
            })
        })
        .collect();

    json!({
        "type": "SCHEMA",
        "job": job.name,
        "schema": {
            "fields": fields,
            "arrow": format!("{:?}", table.schema().fields())
        }
    })
}

fn partition_message(partition: &DatasetPartition, rows: usize) -> Result<Value> {
    let mut sample = Vec::new();
    for batch in &partition.batches {
        if sample.len() >= rows {
            break;
        }
        let take = (rows - sample.len()).min(batch.num_rows());
        sample.extend(batch_to_json(&batch.slice(0, take))?);
    }

    let values: serde_json::Map<String, Value> = partition
        .values
        .iter()
        .map(|(key, value)| (key.clone(), Value::String(value.clone())))
        .collect();

    let mut message = json!({
        "path": partition.path,
        "values": values,
        "files": partition.files.len(),
        "rows": partition.num_rows()
    });
    if rows > 0 {
        message["sample"] = Value::Array(sample);
    }
    Ok(message)
}
