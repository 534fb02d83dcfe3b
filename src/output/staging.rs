//! Staged writes and atomic publish
//!
//! Files are first written under `<base>/_temporary/<run_id>/` and only
//! moved to their final paths on commit. A `_SUCCESS` marker at the base
//! signals a complete dataset.
//!
//! Run ids have the form `<prefix>-<YYYYMMDDTHHMMSSZ>-<8 hex digits>`, where
//! the prefix is derived from the job name.

use crate::error::{Error, Result};
use crate::storage::StorageLocation;
use crate::types::CompressionCodec;
use bytes::Bytes;
use std::collections::BTreeSet;

/// Directory holding in-flight runs
pub const STAGING_DIR: &str = "_temporary";

/// Marker written after a successful commit
pub const SUCCESS_MARKER: &str = "_SUCCESS";

/// Data file name for the `index`-th file of a partition
pub fn part_file_name(index: usize, run_id: &str, codec: CompressionCodec) -> String {
    match codec.file_suffix() {
        Some(suffix) => format!("part-{index:05}-{run_id}.{suffix}.parquet"),
        None => format!("part-{index:05}-{run_id}.parquet"),
    }
}

/// A file written to the staging area
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    /// Final path relative to the base location
    pub relative: String,
    /// Records in the file
    pub rows: usize,
    /// Encoded size
    pub bytes: usize,
}

/// Staging area of one run under a base location
#[derive(Debug, Clone)]
pub struct Stage {
    location: StorageLocation,
    run_id: String,
    files: Vec<StagedFile>,
}

impl Stage {
    /// Create the staging area for `run_id`
    pub fn new(location: StorageLocation, run_id: impl Into<String>) -> Self {
        Self {
            location,
            run_id: run_id.into(),
            files: Vec::new(),
        }
    }

    /// Base location files are published to
    pub fn location(&self) -> &StorageLocation {
        &self.location
    }

    /// Run identifier
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Staging directory relative to the base
    pub fn staging_dir(&self) -> String {
        format!("{STAGING_DIR}/{}", self.run_id)
    }

    fn staged_path(&self, relative: &str) -> String {
        format!("{}/{relative}", self.staging_dir())
    }

    /// Upload one file into staging; the caller records it with [`Stage::push`]
    pub async fn write(&self, relative: &str, data: Bytes, rows: usize) -> Result<StagedFile> {
        let bytes = data.len();
        let path = self.location.path(&self.staged_path(relative));
        self.location.put(&path, data).await?;

        tracing::debug!(
            "Staged {} ({rows} rows, {bytes} bytes)",
            self.location.display(&path)
        );

        Ok(StagedFile {
            relative: relative.to_string(),
            rows,
            bytes,
        })
    }

    /// Record a staged file
    pub fn push(&mut self, file: StagedFile) {
        self.files.push(file);
    }

    /// Staged files, in the order they were recorded
    pub fn files(&self) -> &[StagedFile] {
        &self.files
    }

    /// Sort staged files by path
    pub fn sort(&mut self) {
        self.files.sort_by(|a, b| a.relative.cmp(&b.relative));
    }

    /// Total records across staged files
    pub fn rows(&self) -> usize {
        self.files.iter().map(|f| f.rows).sum()
    }

    /// Move every staged file to its final path
    ///
    /// If any move fails the files already published are removed again
    /// and the error is returned.
    pub async fn promote(&self) -> Result<()> {
        let mut promoted: Vec<&str> = Vec::with_capacity(self.files.len());

        for file in &self.files {
            let from = self.location.path(&self.staged_path(&file.relative));
            let to = self.location.path(&file.relative);

            if let Err(e) = self.location.rename(&from, &to).await {
                tracing::error!(
                    "Promotion of {} failed, rolling back {} file(s): {e}",
                    file.relative,
                    promoted.len()
                );
                self.remove_published(promoted.iter().copied()).await;
                return Err(Error::commit(format!(
                    "Failed to publish {}: {e}",
                    self.location.display(&to)
                )));
            }
            promoted.push(&file.relative);
        }

        tracing::debug!(
            "Published {} file(s) to {}",
            promoted.len(),
            self.location.url()
        );
        Ok(())
    }

    /// Remove all published files of this stage from their final paths
    pub async fn unpublish(&self) {
        self.remove_published(self.files.iter().map(|f| f.relative.as_str()))
            .await;
    }

    async fn remove_published<'a>(&self, files: impl Iterator<Item = &'a str>) {
        for relative in files {
            if let Err(e) = self.location.delete(&self.location.path(relative)).await {
                tracing::warn!("Failed to remove {relative} during rollback: {e}");
            }
        }
    }

    /// Write the `_SUCCESS` marker at the base
    pub async fn mark_success(&self) -> Result<()> {
        let path = self.location.path(SUCCESS_MARKER);
        self.location.put(&path, Bytes::new()).await
    }

    /// Remove the `_SUCCESS` marker, returning whether one was present
    pub async fn clear_success(&self) -> Result<bool> {
        let path = self.location.path(SUCCESS_MARKER);
        if self.location.head(&path).await?.is_none() {
            return Ok(false);
        }
        self.location.delete(&path).await.map_err(|e| {
            Error::commit(format!(
                "Failed to remove {}: {e}",
                self.location.display(&path)
            ))
        })?;
        Ok(true)
    }

    /// Remove staging directories that earlier runs with the same `prefix` left behind
    ///
    /// Returns the number of objects deleted. Staging of other jobs is kept.
    pub async fn sweep_abandoned(&self, prefix: &str) -> Result<usize> {
        let runs: BTreeSet<String> = self
            .location
            .list(STAGING_DIR, true)
            .await?
            .iter()
            .filter_map(|meta| self.location.relative(&meta.location))
            .filter_map(|relative| relative.strip_prefix(STAGING_DIR)?.strip_prefix('/'))
            .filter_map(|rest| rest.split_once('/').map(|(run, _)| run))
            .filter(|run| *run != self.run_id && is_run_of(run, prefix))
            .map(str::to_string)
            .collect();

        let mut removed = 0;
        for run in runs {
            let count = self
                .location
                .delete_prefix(&format!("{STAGING_DIR}/{run}"))
                .await?;
            tracing::warn!("Removed {count} leftover file(s) of abandoned run {run}");
            removed += count;
        }
        Ok(removed)
    }

    /// Remove this run's staging directory, returning the number of objects deleted
    ///
    /// The shared `_temporary` directory is removed too once no other run uses it.
    pub async fn discard(&self) -> Result<usize> {
        let removed = self.location.delete_prefix(&self.staging_dir()).await?;
        if self.location.list(STAGING_DIR, true).await?.is_empty() {
            self.location.delete_prefix(STAGING_DIR).await?;
        }
        Ok(removed)
    }
}

/// Whether `run_id` was generated for a job with run prefix `prefix`
fn is_run_of(run_id: &str, prefix: &str) -> bool {
    let Some(rest) = run_id
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('-'))
    else {
        return false;
    };
    match rest.split_once('-') {
        Some((stamp, random)) => {
            stamp.len() == 16
                && stamp.ends_with('Z')
                && random.len() == 8
                && random.bytes().all(|b| b.is_ascii_hexdigit())
        }
        None => false,
    }
}
