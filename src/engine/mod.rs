//! Execution engine module
//!
//! Runs a job definition end to end.
//!
//! # Overview
//!
//! The engine module provides:
//! - `Pipeline` - Reads, maps, partitions and stages a job's output
//! - `StagedRun` - A fully staged run that is either committed or aborted
//! - `RunReport` - Counters and timings of a finished run
//!
//! ```text
//! Reading ──► Mapping ──► Writing ──► Staged ──► Committed
//!    │           │           │          │
//!    └───────────┴───────────┴──► Failed └──► Aborted
//! ```
//!
//! Input files are fetched and mapped concurrently but reassembled in file
//! order, so the same input always yields the same partitions and rows.
//! Every run gets a fresh run id, which output file names embed, so a
//! rerun into the same destination adds files next to the earlier ones.
//! Nothing becomes visible at the destination before `StagedRun::commit`.

mod types;

pub use types::{JobState, JobStats, PartitionSummary, RunReport};

use crate::error::{Error, Result};
use crate::loader::{validate_job, JobDefinition};
use crate::mapping::{MappingTable, TypedRecord};
use crate::output::{
    encode_parquet, part_file_name, project_schema, records_to_batch, PartitionGroups,
    Partitioner, Stage, StagedFile, SUCCESS_MARKER,
};
use crate::quarantine::{quarantine_file_name, Quarantine, RejectedRecord};
use crate::source::{CsvSource, RecordOrigin, SplitData};
use crate::storage::StorageLocation;
use crate::types::ErrorPolicy;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{instrument, Instrument};

/// A mapped record and the row it came from
type Mapped = (RecordOrigin, TypedRecord);

/// Result of mapping one input file
#[derive(Default)]
struct SplitOutcome {
    records: Vec<Mapped>,
    rejected: Quarantine,
    rows: usize,
    bytes: usize,
}

/// Executes one job definition
pub struct Pipeline {
    job: JobDefinition,
    table: Arc<MappingTable>,
    partitioner: Partitioner,
    run_id: String,
}

impl Pipeline {
    /// Validate the definition and prepare the mapping table
    pub fn new(job: JobDefinition) -> Result<Self> {
        validate_job(&job)?;
        let table = MappingTable::new(job.mappings.clone())?;
        let partitioner = Partitioner::new(&table, &job.sink.partition_keys)?;
        let run_id = job.new_run_id();

        Ok(Self {
            job,
            table: Arc::new(table),
            partitioner,
            run_id,
        })
    }

    /// The job being executed
    pub fn job(&self) -> &JobDefinition {
        &self.job
    }

    /// The validated mapping table
    pub fn table(&self) -> &MappingTable {
        &self.table
    }

    /// Run identifier used for staging and file names
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Execute and then commit, or abort when `commit` is false
    pub async fn run(&self, commit: bool) -> Result<RunReport> {
        let staged = self.execute().await?;
        if commit {
            staged.commit().await
        } else {
            staged.abort().await
        }
    }

    /// Read, map and stage the output without publishing anything
    pub async fn execute(&self) -> Result<StagedRun> {
        let started_at = Utc::now();
        let started = Instant::now();

        tracing::info!(
            "Starting job '{}' (run {}, policy {})",
            self.job.name,
            self.run_id,
            self.job.policy.as_str()
        );

        match self.stage_all(started_at, started).await {
            Ok(run) => {
                tracing::info!(
                    "Job '{}' {}: {} records in {} file(s), {} rejected",
                    self.job.name,
                    JobState::Staged,
                    run.stats.records_written,
                    run.stats.files_written,
                    run.stats.records_rejected
                );
                Ok(run)
            }
            Err(e) => {
                tracing::error!("Job '{}' {}: {e}", self.job.name, JobState::Failed);
                Err(e)
            }
        }
    }

    async fn stage_all(&self, started_at: DateTime<Utc>, started: Instant) -> Result<StagedRun> {
        let retry = self.job.execution.retry_policy();
        let source = StorageLocation::parse(&self.job.source.path)?.with_retry(retry);
        let destination = StorageLocation::parse_for_write(&self.job.sink.path)?.with_retry(retry);
        let quarantine_location = match (self.job.policy, self.job.quarantine.as_deref()) {
            (ErrorPolicy::Lenient, Some(path)) => {
                Some(StorageLocation::parse_for_write(path)?.with_retry(retry))
            }
            _ => None,
        };

        let mut stats = JobStats::new();
        let mut records = Vec::new();
        let mut rejected = Quarantine::new();

        for outcome in self.read(&source).await? {
            stats.add_file_read(outcome.bytes);
            stats.records_read += outcome.rows;
            records.extend(outcome.records);
            rejected.extend(outcome.rejected);
        }

        let (data, partitions) = self.write(records, &mut rejected, &destination).await?;
        for file in data.files() {
            stats.add_file_written(file.rows, file.bytes);
        }
        stats.partitions = partitions.len();
        stats.records_rejected = rejected.len();

        let quarantine = match self.stage_quarantine(quarantine_location, &rejected).await {
            Ok(stage) => stage,
            Err(e) => {
                discard_quietly(&data).await;
                return Err(e);
            }
        };

        Ok(StagedRun {
            job: self.job.name.clone(),
            ctx: self.job.sink.ctx.clone(),
            policy: self.job.policy,
            source: source.url(),
            data,
            quarantine,
            rejected,
            stats,
            partitions,
            started_at,
            started,
        })
    }

    /// Discover, fetch and map the input files, in path order
    ///
    /// Fetch and map run as one step per file, so at most `concurrency`
    /// files are held in memory and each file's bytes are released once
    /// it is mapped.
    #[instrument(skip_all, fields(job = %self.job.name, ctx = self.job.source.ctx.as_deref().unwrap_or_default()))]
    async fn read(&self, source: &StorageLocation) -> Result<Vec<SplitOutcome>> {
        tracing::debug!("{} {}", JobState::Reading, source.url());

        let reader = CsvSource::new(source.clone(), self.job.source.options)?;
        let splits = reader.discover().await?;
        if splits.is_empty() {
            tracing::warn!("No input files found under {}", source.url());
        }

        let mapping = tracing::info_span!(
            "map",
            job = %self.job.name,
            ctx = self.job.mapping_ctx.as_deref().unwrap_or_default()
        );
        tracing::debug!("{} {} file(s)", JobState::Mapping, splits.len());

        let policy = self.job.policy;
        stream::iter(splits.into_iter().map(|split| {
            let table = Arc::clone(&self.table);
            let span = mapping.clone();
            async move {
                let data = split.fetch().await?;
                let bytes = data.len();
                let mut outcome = tokio::task::spawn_blocking(move || {
                    span.in_scope(|| map_split(&data, &table, policy))
                })
                .await
                .map_err(|e| Error::Other(format!("Mapping task failed: {e}")))??;
                outcome.bytes = bytes;
                Ok::<_, Error>(outcome)
            }
        }))
        .buffered(self.job.execution.concurrency())
        .try_collect()
        .await
    }

    /// Partition records and stage one or more Parquet files per partition
    #[instrument(skip_all, fields(job = %self.job.name, ctx = self.job.sink.ctx.as_deref().unwrap_or_default()))]
    async fn write(
        &self,
        records: Vec<Mapped>,
        rejected: &mut Quarantine,
        destination: &StorageLocation,
    ) -> Result<(Stage, Vec<PartitionSummary>)> {
        tracing::debug!("{} {} records", JobState::Writing, records.len());

        let mut groups = PartitionGroups::new();
        for (origin, record) in records {
            match self.partitioner.partition_path(&record) {
                Ok(path) => groups.insert(path, record),
                Err(e) => reject(self.job.policy, e, rejected, |e| {
                    RejectedRecord::new(&origin, e, self.table.to_json(&record))
                })?,
            }
        }

        let mut stage = Stage::new(destination.clone(), &self.run_id);
        stage.sweep_abandoned(&self.job.run_prefix()).await?;

        let columns = self
            .partitioner
            .data_columns(self.table.len(), self.job.sink.keep_partition_columns);
        let schema = project_schema(&self.table.schema(), &columns)?;
        let columns = Arc::new(columns);
        let config = self.job.sink.writer_config();
        let max_rows = self.job.sink.max_rows_per_file.unwrap_or(usize::MAX);

        let mut partitions = Vec::with_capacity(groups.len());
        let mut tasks = Vec::new();
        for (path, records) in groups {
            let rows = records.len();
            let chunks = split_chunks(records, max_rows);
            partitions.push(PartitionSummary {
                path: path.clone(),
                rows,
                files: chunks.len(),
            });
            for (index, chunk) in chunks.into_iter().enumerate() {
                let name = part_file_name(index, &self.run_id, config.codec());
                let relative = if path.is_empty() {
                    name
                } else {
                    format!("{path}/{name}")
                };
                tasks.push((relative, chunk));
            }
        }

        let staging = &stage;
        let written: Result<Vec<StagedFile>> = stream::iter(tasks.into_iter().map(
            |(relative, chunk)| {
                let schema = Arc::clone(&schema);
                let columns = Arc::clone(&columns);
                let config = config.clone();
                async move {
                    let rows = chunk.len();
                    let bytes = tokio::task::spawn_blocking(move || {
                        let batch = records_to_batch(&schema, &columns, &chunk)?;
                        encode_parquet(schema, &[batch], &config)
                    })
                    .await
                    .map_err(|e| Error::Other(format!("Encoding task failed: {e}")))??;
                    staging.write(&relative, bytes, rows).await
                }
            },
        ))
        .buffer_unordered(self.job.execution.concurrency())
        .try_collect()
        .await;

        let files = match written {
            Ok(files) => files,
            Err(e) => {
                discard_quietly(&stage).await;
                return Err(e);
            }
        };

        for file in files {
            stage.push(file);
        }
        stage.sort();
        Ok((stage, partitions))
    }

    /// Stage the rejected records next to the data, if there are any
    async fn stage_quarantine(
        &self,
        location: Option<StorageLocation>,
        rejected: &Quarantine,
    ) -> Result<Option<Stage>> {
        let Some(location) = location else {
            return Ok(None);
        };
        if rejected.is_empty() {
            return Ok(None);
        }

        let mut stage = Stage::new(location, &self.run_id);
        stage.sweep_abandoned(&self.job.run_prefix()).await?;
        let file = stage
            .write(
                &quarantine_file_name(&self.run_id),
                rejected.to_jsonl()?,
                rejected.len(),
            )
            .await?;
        stage.push(file);

        tracing::warn!(
            "{} record(s) quarantined to {}",
            rejected.len(),
            stage.location().url()
        );
        Ok(Some(stage))
    }
}

/// Map all rows of one file
fn map_split(data: &SplitData, table: &MappingTable, policy: ErrorPolicy) -> Result<SplitOutcome> {
    let mut outcome = SplitOutcome::default();

    for row in data.records() {
        outcome.rows += 1;
        let raw = match row {
            Ok(raw) => raw,
            Err(e) => {
                reject(policy, e, &mut outcome.rejected, RejectedRecord::unparsed)?;
                continue;
            }
        };

        match table.apply(&raw) {
            Ok(record) => outcome.records.push((raw.origin().clone(), record)),
            Err(e) => reject(policy, e, &mut outcome.rejected, |e| {
                RejectedRecord::new(raw.origin(), e, raw.to_json())
            })?,
        }
    }

    tracing::debug!(
        "Mapped {} of {} rows from {}",
        outcome.records.len(),
        outcome.rows,
        data.source()
    );
    Ok(outcome)
}

/// Apply the error policy to a failed record
///
/// Data-quality errors are quarantined under the lenient policy; anything
/// else, or any error under the strict policy, fails the run.
fn reject(
    policy: ErrorPolicy,
    error: Error,
    rejected: &mut Quarantine,
    describe: impl FnOnce(&Error) -> RejectedRecord,
) -> Result<()> {
    if !error.is_data_quality() {
        return Err(error);
    }

    let record = describe(&error);
    match policy {
        ErrorPolicy::Strict => {
            tracing::error!(
                "Record {}:{} rejected under strict policy",
                record.source,
                record.line
            );
            Err(error)
        }
        ErrorPolicy::Lenient => {
            tracing::debug!("Quarantined {}:{}: {error}", record.source, record.line);
            rejected.push(record);
            Ok(())
        }
    }
}

/// Split a partition into files of at most `max_rows` records
fn split_chunks(mut records: Vec<TypedRecord>, max_rows: usize) -> Vec<Vec<TypedRecord>> {
    let max_rows = max_rows.max(1);
    let mut chunks = Vec::new();
    while records.len() > max_rows {
        let rest = records.split_off(max_rows);
        chunks.push(records);
        records = rest;
    }
    chunks.push(records);
    chunks
}

async fn discard_quietly(stage: &Stage) {
    if let Err(e) = stage.discard().await {
        tracing::warn!("Failed to clean up {}: {e}", stage.staging_dir());
    }
}

/// A run whose files are staged but not yet visible
///
/// Dropping it without calling [`StagedRun::commit`] or [`StagedRun::abort`]
/// leaves the staging directory behind; the next run of the same job into the
/// same destination removes it.
#[must_use = "a staged run publishes nothing until it is committed"]
pub struct StagedRun {
    job: String,
    ctx: Option<String>,
    policy: ErrorPolicy,
    source: String,
    data: Stage,
    quarantine: Option<Stage>,
    rejected: Quarantine,
    stats: JobStats,
    partitions: Vec<PartitionSummary>,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl StagedRun {
    /// Current state, always `Staged`
    pub fn state(&self) -> JobState {
        JobState::Staged
    }

    /// Run identifier
    pub fn run_id(&self) -> &str {
        self.data.run_id()
    }

    /// Counters so far
    pub fn stats(&self) -> &JobStats {
        &self.stats
    }

    /// Staged data files, in path order
    pub fn files(&self) -> &[StagedFile] {
        self.data.files()
    }

    /// Per-partition summary, in path order
    pub fn partitions(&self) -> &[PartitionSummary] {
        &self.partitions
    }

    /// Rejected records
    pub fn rejected(&self) -> &Quarantine {
        &self.rejected
    }

    /// Publish the staged files and write the `_SUCCESS` marker
    ///
    /// An existing marker is removed before the first file is moved. On
    /// failure everything already published by this call is removed again
    /// and the marker of an earlier commit is put back; files of earlier
    /// runs are never touched.
    pub async fn commit(self) -> Result<RunReport> {
        let span = tracing::info_span!(
            "commit",
            job = %self.job,
            ctx = self.ctx.as_deref().unwrap_or_default()
        );
        async move {
            if let Err(e) = self.publish().await {
                self.cleanup().await;
                tracing::error!("Job '{}' {}: {e}", self.job, JobState::Failed);
                return Err(e);
            }
            self.cleanup().await;

            tracing::info!(
                "Job '{}' {}: {} records in {} partition(s) at {}",
                self.job,
                JobState::Committed,
                self.stats.records_written,
                self.stats.partitions,
                self.data.location().url()
            );
            Ok(self.into_report(JobState::Committed))
        }
        .instrument(span)
        .await
    }

    async fn publish(&self) -> Result<()> {
        let was_committed = self.data.clear_success().await?;
        let result = self.promote_and_mark().await;
        if result.is_err() && was_committed {
            if let Err(e) = self.data.mark_success().await {
                tracing::warn!(
                    "Failed to restore {SUCCESS_MARKER} at {}: {e}",
                    self.data.location().url()
                );
            }
        }
        result
    }

    async fn promote_and_mark(&self) -> Result<()> {
        self.data.promote().await?;

        if let Some(quarantine) = &self.quarantine {
            if let Err(e) = quarantine.promote().await {
                self.data.unpublish().await;
                return Err(e);
            }
        }

        if let Err(e) = self.data.mark_success().await {
            self.data.unpublish().await;
            if let Some(quarantine) = &self.quarantine {
                quarantine.unpublish().await;
            }
            return Err(Error::commit(format!("Failed to write success marker: {e}")));
        }
        Ok(())
    }

    /// Discard the staged files; the destination is left untouched
    pub async fn abort(self) -> Result<RunReport> {
        self.cleanup().await;
        tracing::info!(
            "Job '{}' {}: staged output discarded",
            self.job,
            JobState::Aborted
        );
        Ok(self.into_report(JobState::Aborted))
    }

    async fn cleanup(&self) {
        discard_quietly(&self.data).await;
        if let Some(quarantine) = &self.quarantine {
            discard_quietly(quarantine).await;
        }
    }

    fn into_report(self, state: JobState) -> RunReport {
        RunReport {
            run_id: self.data.run_id().to_string(),
            job: self.job,
            state,
            source: self.source,
            destination: self.data.location().url(),
            quarantine: self.quarantine.as_ref().map(|q| q.location().url()),
            policy: self.policy.as_str().to_string(),
            rejected_by_kind: self.rejected.count_by_kind(),
            stats: self.stats,
            partitions: self.partitions,
            started_at: self.started_at,
            finished_at: Utc::now(),
            duration_ms: self.started.elapsed().as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests;
