//! Tests for engine module

use super::*;
use crate::mapping::TypedValue;
use crate::types::{CompressionCodec, ErrorPolicy};
use crate::output::{is_committed, read_dataset, STAGING_DIR, SUCCESS_MARKER};
use pretty_assertions::assert_eq;
use test_case::test_case;
use std::path::Path;
use tempfile::TempDir;

const HEADER: &str = "video_id,trending_date,title,channel_title,category_id,publish_time,tags,views,likes,dislikes,comment_count,thumbnail_link,comments_disabled,ratings_disabled,description,region";

const SAMPLE_ROW: &str = "abc123,18.01.01,Title,Chan,10,2018-01-01T00:00:00Z,tag1|tag2,1000,50,2,5,http://x,False,False,desc,US";

fn row(id: &str, views: &str, region: &str) -> String {
    format!("{id},18.01.01,T,C,10,2018-01-01T00:00:00Z,t,{views},1,0,0,http://x,false,True,d,{region}")
}

struct Dirs {
    _root: TempDir,
    input: std::path::PathBuf,
    output: std::path::PathBuf,
    rejected: std::path::PathBuf,
}

fn dirs() -> Dirs {
    let root = tempfile::tempdir().unwrap();
    let input = root.path().join("raw");
    let output = root.path().join("clean");
    let rejected = root.path().join("rejected");
    std::fs::create_dir_all(&input).unwrap();
    Dirs {
        _root: root,
        input,
        output,
        rejected,
    }
}

fn write_csv(dir: &Path, name: &str, rows: &[String]) {
    let mut body = format!("{HEADER}\n");
    for row in rows {
        body.push_str(row);
        body.push('\n');
    }
    let path = dir.join(name);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, body).unwrap();
}

fn job(dirs: &Dirs, policy: ErrorPolicy) -> JobDefinition {
    let mut job = crate::loader::load_job("youtube-statistics").unwrap();
    job.name = "test-job".into();
    job.source.path = dirs.input.to_string_lossy().into_owned();
    job.sink.path = dirs.output.to_string_lossy().into_owned();
    job.policy = policy;
    if policy == ErrorPolicy::Lenient {
        job.quarantine = Some(dirs.rejected.to_string_lossy().into_owned());
    }
    job
}

fn pipeline(dirs: &Dirs, policy: ErrorPolicy) -> Pipeline {
    Pipeline::new(job(dirs, policy)).unwrap()
}

/// Files under a directory outside of staging, relative and sorted
fn visible_files(root: &Path) -> Vec<String> {
    fn walk(root: &Path, dir: &Path, out: &mut Vec<String>) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries {
            let path = entry.unwrap().path();
            if path.ends_with(STAGING_DIR) {
                continue;
            }
            if path.is_dir() {
                walk(root, &path, out);
            } else {
                out.push(
                    path.strip_prefix(root)
                        .unwrap()
                        .to_string_lossy()
                        .into_owned(),
                );
            }
        }
    }
    let mut out = Vec::new();
    walk(root, root, &mut out);
    out.sort();
    out
}

// ============================================================================
// State Tests
// ============================================================================

#[test]
fn test_job_state_labels() {
    assert_eq!(JobState::Staged.to_string(), "staged");
    assert_eq!(JobState::Committed.as_str(), "committed");
    assert!(JobState::Aborted.is_terminal());
    assert!(JobState::Failed.is_terminal());
    assert!(!JobState::Writing.is_terminal());
    assert_eq!(
        serde_json::to_value(JobState::Mapping).unwrap(),
        serde_json::json!("mapping")
    );
}

#[test]
fn test_split_chunks() {
    let records: Vec<TypedRecord> = (0..5)
        .map(|i| TypedRecord::new(vec![TypedValue::BigInt(i)]))
        .collect();

    let chunks = split_chunks(records.clone(), 2);
    let sizes: Vec<usize> = chunks.iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![2, 2, 1]);
    assert_eq!(chunks.concat(), records);

    assert_eq!(split_chunks(records.clone(), usize::MAX).len(), 1);
    assert_eq!(split_chunks(records, 5).len(), 1);
}

#[test]
fn test_pipeline_rejects_invalid_job() {
    let dirs = dirs();
    let mut job = job(&dirs, ErrorPolicy::Strict);
    job.sink.partition_keys = vec!["country".into()];
    assert!(Pipeline::new(job).is_err());
}

// ============================================================================
// End-to-End Tests
// ============================================================================

#[tokio::test]
async fn test_sample_row_end_to_end() {
    let dirs = dirs();
    write_csv(&dirs.input, "US_videos.csv", &[SAMPLE_ROW.to_string()]);

    let pipeline = pipeline(&dirs, ErrorPolicy::Strict);
    let staged = pipeline.execute().await.unwrap();
    let file = format!("region=US/part-00000-{}.snappy.parquet", pipeline.run_id());
    assert_eq!(staged.state(), JobState::Staged);
    assert_eq!(staged.run_id(), pipeline.run_id());
    assert_eq!(staged.files().len(), 1);
    assert_eq!(staged.files()[0].relative, file);
    // Nothing visible before commit
    assert!(visible_files(&dirs.output).is_empty());

    let report = staged.commit().await.unwrap();
    assert_eq!(report.state, JobState::Committed);
    assert_eq!(report.stats.records_read, 1);
    assert_eq!(report.stats.records_written, 1);
    assert_eq!(report.stats.partitions, 1);
    assert_eq!(report.run_id, pipeline.run_id());
    assert!(report.run_id.starts_with("test-job-"));
    assert!(report.finished_at >= report.started_at);

    assert_eq!(
        visible_files(&dirs.output),
        vec![SUCCESS_MARKER.to_string(), file]
    );
    assert!(!dirs.output.join(STAGING_DIR).exists());

    let location = StorageLocation::parse(dirs.output.to_str().unwrap()).unwrap();
    assert!(is_committed(&location).await.unwrap());
    let partitions = read_dataset(&location).await.unwrap();
    assert_eq!(partitions.len(), 1);
    assert_eq!(partitions[0].value("region"), Some("US"));

    let records = partitions[0].records().unwrap();
    let table = pipeline.table();
    let get = |name: &str| records[0].get(table.index_of(name).unwrap()).unwrap().clone();
    assert_eq!(get("category_id"), TypedValue::BigInt(10));
    assert_eq!(get("views"), TypedValue::BigInt(1000));
    assert_eq!(get("likes"), TypedValue::BigInt(50));
    assert_eq!(get("dislikes"), TypedValue::BigInt(2));
    assert_eq!(get("comment_count"), TypedValue::BigInt(5));
    assert_eq!(get("comments_disabled"), TypedValue::Boolean(false));
    assert_eq!(get("ratings_disabled"), TypedValue::Boolean(false));
    assert_eq!(get("region"), TypedValue::String("US".into()));
}

#[tokio::test]
async fn test_partition_correctness_across_files() {
    let dirs = dirs();
    write_csv(
        &dirs.input,
        "US_videos.csv",
        &[row("a", "1", "US"), row("b", "2", "CA")],
    );
    write_csv(
        &dirs.input,
        "nested/GB_videos.csv",
        &[row("c", "3", "GB"), row("d", "4", "US")],
    );

    let report = pipeline(&dirs, ErrorPolicy::Strict).run(true).await.unwrap();
    assert_eq!(report.stats.files_read, 2);
    assert_eq!(report.stats.records_written, 4);

    let paths: Vec<(&str, usize)> = report
        .partitions
        .iter()
        .map(|p| (p.path.as_str(), p.rows))
        .collect();
    assert_eq!(
        paths,
        vec![("region=CA", 1), ("region=GB", 1), ("region=US", 2)]
    );

    let location = StorageLocation::parse(dirs.output.to_str().unwrap()).unwrap();
    let region = pipeline(&dirs, ErrorPolicy::Strict)
        .table()
        .index_of("region")
        .unwrap();
    for partition in read_dataset(&location).await.unwrap() {
        let expected = partition.value("region").unwrap().to_string();
        for record in partition.records().unwrap() {
            assert_eq!(record.get(region), Some(&TypedValue::String(expected.clone())));
        }
    }
}

#[tokio::test]
async fn test_max_rows_per_file_and_dropped_partition_column() {
    let dirs = dirs();
    let rows: Vec<String> = (0..5).map(|i| row(&format!("v{i}"), "1", "US")).collect();
    write_csv(&dirs.input, "US.csv", &rows);

    let mut job = job(&dirs, ErrorPolicy::Strict);
    job.sink.max_rows_per_file = Some(2);
    job.sink.keep_partition_columns = false;
    job.sink.compression = CompressionCodec::Uncompressed;
    let staged = Pipeline::new(job).unwrap().execute().await.unwrap();
    let run_id = staged.run_id().to_string();
    let names: Vec<&str> = staged.files().iter().map(|f| f.relative.as_str()).collect();
    assert_eq!(
        names,
        vec![
            format!("region=US/part-00000-{run_id}.parquet"),
            format!("region=US/part-00001-{run_id}.parquet"),
            format!("region=US/part-00002-{run_id}.parquet"),
        ]
    );
    staged.commit().await.unwrap();

    let location = StorageLocation::parse(dirs.output.to_str().unwrap()).unwrap();
    let partitions = read_dataset(&location).await.unwrap();
    assert_eq!(partitions[0].num_rows(), 5);
    let schema = partitions[0].schema().unwrap();
    assert_eq!(schema.fields().len(), 15);
    assert!(schema.field_with_name("region").is_err());
}

#[test_case(1 ; "one file at a time")]
#[test_case(8 ; "many files at once")]
#[tokio::test]
async fn test_read_keeps_file_order_and_counts_bytes(concurrency: usize) {
    let dirs = dirs();
    let mut expected = Vec::new();
    let mut bytes = 0;
    for file in 0..6 {
        let rows: Vec<String> = (0..3)
            .map(|i| row(&format!("f{file}r{i}"), "1", "US"))
            .collect();
        let name = format!("part{file}.csv");
        write_csv(&dirs.input, &name, &rows);
        bytes += std::fs::metadata(dirs.input.join(&name)).unwrap().len() as usize;
        expected.extend((0..3).map(|i| format!("f{file}r{i}")));
    }

    let mut job = job(&dirs, ErrorPolicy::Strict);
    job.execution.concurrency = Some(concurrency);
    let pipeline = Pipeline::new(job).unwrap();
    let report = pipeline.run(true).await.unwrap();
    assert_eq!(report.stats.files_read, 6);
    assert_eq!(report.stats.bytes_read, bytes);
    assert_eq!(report.stats.records_read, 18);

    let location = StorageLocation::parse(dirs.output.to_str().unwrap()).unwrap();
    let partitions = read_dataset(&location).await.unwrap();
    let video_id = pipeline.table().index_of("video_id").unwrap();
    let ids: Vec<String> = partitions[0]
        .records()
        .unwrap()
        .iter()
        .map(|r| match r.get(video_id) {
            Some(TypedValue::String(id)) => id.clone(),
            other => panic!("unexpected video_id {other:?}"),
        })
        .collect();
    assert_eq!(ids, expected);
}

// ============================================================================
// Error Policy Tests
// ============================================================================

#[tokio::test]
async fn test_strict_coercion_failure_publishes_nothing() {
    let dirs = dirs();
    write_csv(
        &dirs.input,
        "US.csv",
        &[row("a", "1", "US"), row("b", "", "US")],
    );

    let err = pipeline(&dirs, ErrorPolicy::Strict).execute().await.err().unwrap();
    assert!(matches!(err, Error::TypeCoercion { ref field, .. } if field == "views"));
    assert!(visible_files(&dirs.output).is_empty());
    assert!(!dirs.output.join(STAGING_DIR).exists());
}

#[tokio::test]
async fn test_strict_empty_region_fails() {
    let dirs = dirs();
    write_csv(&dirs.input, "US.csv", &[row("a", "1", "")]);

    let err = pipeline(&dirs, ErrorPolicy::Strict).execute().await.err().unwrap();
    assert!(matches!(err, Error::MissingPartitionKey { .. }));
    assert!(visible_files(&dirs.output).is_empty());
}

#[tokio::test]
async fn test_strict_malformed_row_fails() {
    let dirs = dirs();
    let mut rows = vec![row("a", "1", "US")];
    rows.push("only,three,fields".to_string());
    write_csv(&dirs.input, "US.csv", &rows);

    let err = pipeline(&dirs, ErrorPolicy::Strict).execute().await.err().unwrap();
    assert!(matches!(err, Error::ReadParse { line: 3, .. }));
}

#[tokio::test]
async fn test_lenient_quarantines_and_continues() {
    let dirs = dirs();
    write_csv(
        &dirs.input,
        "US.csv",
        &[
            row("good1", "1", "US"),
            row("bad_views", "lots", "US"),
            row("no_region", "2", " "),
            "short,row".to_string(),
            row("good2", "3", "CA"),
        ],
    );

    let staged = pipeline(&dirs, ErrorPolicy::Lenient).execute().await.unwrap();
    assert_eq!(staged.stats().records_read, 5);
    assert_eq!(staged.stats().records_written, 2);
    assert_eq!(staged.stats().records_rejected, 3);
    assert_eq!(staged.rejected().len(), 3);

    let report = staged.commit().await.unwrap();
    assert_eq!(report.rejected_by_kind.get("type_coercion"), Some(&1));
    assert_eq!(report.rejected_by_kind.get("missing_partition_key"), Some(&1));
    assert_eq!(report.rejected_by_kind.get("read_parse"), Some(&1));
    assert!(report.quarantine.is_some());

    let run_id = report.run_id.clone();
    let body = std::fs::read_to_string(dirs.rejected.join(format!("rejected-{run_id}.jsonl")))
        .unwrap();
    let lines: Vec<serde_json::Value> = body
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 3);

    // Mapping rejections come first (file order), partition rejections after
    assert_eq!(lines[0]["error"], "type_coercion");
    assert_eq!(lines[0]["line"], 3);
    assert_eq!(lines[0]["record"]["views"], "lots");
    assert_eq!(lines[1]["error"], "read_parse");
    assert_eq!(lines[1]["line"], 5);
    assert_eq!(lines[2]["error"], "missing_partition_key");
    assert_eq!(lines[2]["record"]["video_id"], "no_region");

    assert_eq!(
        visible_files(&dirs.output),
        vec![
            SUCCESS_MARKER.to_string(),
            format!("region=CA/part-00000-{run_id}.snappy.parquet"),
            format!("region=US/part-00000-{run_id}.snappy.parquet"),
        ]
    );
}

#[tokio::test]
async fn test_lenient_without_rejections_writes_no_quarantine() {
    let dirs = dirs();
    write_csv(&dirs.input, "US.csv", &[row("a", "1", "US")]);

    let report = pipeline(&dirs, ErrorPolicy::Lenient).run(true).await.unwrap();
    assert!(report.quarantine.is_none());
    assert!(visible_files(&dirs.rejected).is_empty());
}

// ============================================================================
// Commit / Abort Tests
// ============================================================================

#[tokio::test]
async fn test_abort_leaves_destination_untouched() {
    let dirs = dirs();
    write_csv(&dirs.input, "US.csv", &[row("a", "1", "US")]);

    let staged = pipeline(&dirs, ErrorPolicy::Strict).execute().await.unwrap();
    let run_id = staged.run_id().to_string();
    assert!(dirs
        .output
        .join(format!(
            "_temporary/{run_id}/region=US/part-00000-{run_id}.snappy.parquet"
        ))
        .exists());

    let report = staged.abort().await.unwrap();
    assert_eq!(report.state, JobState::Aborted);
    assert!(visible_files(&dirs.output).is_empty());
    assert!(!dirs.output.join(STAGING_DIR).exists());
}

#[tokio::test]
async fn test_dry_run_via_run_false() {
    let dirs = dirs();
    write_csv(&dirs.input, "US.csv", &[row("a", "1", "US")]);

    let report = pipeline(&dirs, ErrorPolicy::Strict).run(false).await.unwrap();
    assert_eq!(report.state, JobState::Aborted);
    assert_eq!(report.stats.records_written, 1);
    assert!(visible_files(&dirs.output).is_empty());
}

#[tokio::test]
async fn test_abandoned_staging_of_same_job_is_removed() {
    let dirs = dirs();
    write_csv(&dirs.input, "US.csv", &[row("a", "1", "US")]);
    let staging = dirs.output.join(STAGING_DIR);
    let leftover = staging.join("test-job-20200101T000000Z-deadbeef/region=XX/stale.parquet");
    let foreign = staging.join("other-job-20200101T000000Z-deadbeef/region=XX/live.parquet");
    for path in [&leftover, &foreign] {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "staged").unwrap();
    }

    pipeline(&dirs, ErrorPolicy::Strict).run(true).await.unwrap();
    assert!(!dirs.output.join("region=XX").exists());
    assert!(!leftover.exists());
    assert!(foreign.exists());
}

#[tokio::test]
async fn test_each_pipeline_gets_its_own_run_id() {
    let dirs = dirs();
    let first = pipeline(&dirs, ErrorPolicy::Strict);
    let second = pipeline(&dirs, ErrorPolicy::Strict);
    assert_ne!(first.run_id(), second.run_id());
    assert!(first.run_id().starts_with("test-job-"));
}

#[tokio::test]
async fn test_rerun_appends_to_existing_dataset() {
    let dirs = dirs();
    let rows: Vec<String> = (0..3).map(|i| row(&format!("v{i}"), "1", "US")).collect();
    write_csv(&dirs.input, "US.csv", &rows);
    let mut first = job(&dirs, ErrorPolicy::Strict);
    first.sink.max_rows_per_file = Some(1);
    let first = Pipeline::new(first).unwrap().run(true).await.unwrap();
    assert_eq!(first.stats.files_written, 3);

    write_csv(&dirs.input, "US.csv", &[row("v9", "9", "US")]);
    let second = pipeline(&dirs, ErrorPolicy::Strict).run(true).await.unwrap();
    assert_eq!(second.stats.records_written, 1);
    assert_ne!(first.run_id, second.run_id);

    // Earlier files are neither overwritten nor removed
    let files = visible_files(&dirs.output);
    assert_eq!(files.len(), 5);
    assert_eq!(
        files.iter().filter(|f| f.contains(&first.run_id)).count(),
        3
    );
    assert_eq!(
        files.iter().filter(|f| f.contains(&second.run_id)).count(),
        1
    );

    let location = StorageLocation::parse(dirs.output.to_str().unwrap()).unwrap();
    let partitions = read_dataset(&location).await.unwrap();
    assert_eq!(partitions.len(), 1);
    assert_eq!(partitions[0].num_rows(), 4);
    assert!(is_committed(&location).await.unwrap());
}

#[tokio::test]
async fn test_failed_commit_keeps_earlier_dataset() {
    let dirs = dirs();
    write_csv(&dirs.input, "CA.csv", &[row("a", "1", "CA")]);
    pipeline(&dirs, ErrorPolicy::Strict).run(true).await.unwrap();
    let before = visible_files(&dirs.output);
    assert_eq!(before.len(), 2);

    write_csv(&dirs.input, "CA.csv", &[row("b", "2", "CA"), row("c", "3", "US")]);
    let mut job = job(&dirs, ErrorPolicy::Strict);
    job.execution.max_retries = Some(0);
    let staged = Pipeline::new(job).unwrap().execute().await.unwrap();
    let names: Vec<String> = staged.files().iter().map(|f| f.relative.clone()).collect();
    assert_eq!(names.len(), 2);
    assert!(names[1].starts_with("region=US/"));

    // A directory in the way of the US file makes its promotion fail
    // after the CA file has already been moved
    std::fs::create_dir_all(dirs.output.join(&names[1])).unwrap();

    let err = staged.commit().await.unwrap_err();
    assert!(matches!(err, Error::Commit { .. }));

    for file in &before {
        assert!(dirs.output.join(file).is_file(), "{file} was removed");
    }
    assert!(dirs.output.join(SUCCESS_MARKER).exists());
    assert!(!dirs.output.join(&names[0]).exists());
    assert!(!dirs.output.join(STAGING_DIR).exists());

    let location = StorageLocation::parse(dirs.output.to_str().unwrap()).unwrap();
    std::fs::remove_dir_all(dirs.output.join("region=US")).unwrap();
    let partitions = read_dataset(&location).await.unwrap();
    assert_eq!(partitions.len(), 1);
    assert_eq!(partitions[0].num_rows(), 1);
}

#[tokio::test]
async fn test_empty_input_commits_marker_only() {
    let dirs = dirs();

    let report = pipeline(&dirs, ErrorPolicy::Strict).run(true).await.unwrap();
    assert_eq!(report.stats.files_read, 0);
    assert_eq!(report.stats.files_written, 0);
    assert_eq!(visible_files(&dirs.output), vec![SUCCESS_MARKER.to_string()]);
}

#[tokio::test]
async fn test_determinism_across_destinations() {
    let dirs = dirs();
    write_csv(
        &dirs.input,
        "a.csv",
        &[row("a", "1", "US"), row("b", "2", "CA"), row("c", "3", "US")],
    );
    write_csv(&dirs.input, "b.csv", &[row("d", "4", "GB")]);
    let second = dirs._root.path().join("clean2");

    pipeline(&dirs, ErrorPolicy::Strict).run(true).await.unwrap();
    let mut job = job(&dirs, ErrorPolicy::Strict);
    job.sink.path = second.to_string_lossy().into_owned();
    Pipeline::new(job).unwrap().run(true).await.unwrap();

    // Same layout, file names differ only by run id
    let layout = |root: &Path| -> Vec<String> {
        visible_files(root)
            .into_iter()
            .map(|f| match f.rsplit_once("part-") {
                Some((dir, name)) => format!("{dir}part-{}", &name[..5]),
                None => f,
            })
            .collect()
    };
    assert_eq!(layout(&dirs.output), layout(&second));

    let first = read_dataset(&StorageLocation::parse(dirs.output.to_str().unwrap()).unwrap())
        .await
        .unwrap();
    let other = read_dataset(&StorageLocation::parse(second.to_str().unwrap()).unwrap())
        .await
        .unwrap();
    assert_eq!(first.len(), other.len());
    for (a, b) in first.iter().zip(&other) {
        assert_eq!(a.path, b.path);
        assert_eq!(a.records().unwrap(), b.records().unwrap());
    }
}
