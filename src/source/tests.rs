//! Tests for source module

use super::*;
use crate::error::Error;
use crate::storage::StorageLocation;
use bytes::Bytes;
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use test_case::test_case;

fn split(body: &'static str, options: CsvOptions) -> SplitData {
    SplitData::new("mem://test.csv", Bytes::from_static(body.as_bytes()), options)
}

// ============================================================================
// Options Tests
// ============================================================================

#[test]
fn test_options_default() {
    let options = CsvOptions::default();
    assert_eq!(options.separator, ',');
    assert_eq!(options.quote_char, '"');
    assert!(options.with_header);
    assert!(options.recurse);
    assert!(options.validate().is_ok());
}

#[test]
fn test_options_reject_non_ascii_separator() {
    let options = CsvOptions::default().with_separator('§');
    assert!(options.validate().is_err());
}

#[test]
fn test_options_reject_same_quote_and_separator() {
    let options = CsvOptions::default().with_separator('"');
    let err = options.validate().unwrap_err();
    assert!(err.to_string().contains("must differ from the separator"));
}

#[test]
fn test_options_from_yaml_defaults() {
    let options: CsvOptions = serde_yaml::from_str("separator: ';'").unwrap();
    assert_eq!(options.separator, ';');
    assert_eq!(options.quote_char, '"');
    assert!(options.with_header);
}

// ============================================================================
// Record Parsing Tests
// ============================================================================

#[test]
fn test_header_names_fields() {
    let data = split("video_id,views\nabc,10\ndef,20\n", CsvOptions::default());
    let records: Vec<RawRecord> = data.records().map(Result::unwrap).collect();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].get("video_id"), Some("abc"));
    assert_eq!(records[1].get("views"), Some("20"));
    assert_eq!(records[0].get("missing"), None);
    assert_eq!(records[0].headers().names(), &["video_id", "views"]);
}

#[test]
fn test_line_numbers_follow_file() {
    let data = split("a,b\n1,2\n3,4\n", CsvOptions::default());
    let lines: Vec<u64> = data
        .records()
        .map(|r| r.unwrap().origin().line)
        .collect();
    assert_eq!(lines, vec![2, 3]);
}

#[test]
fn test_quoted_field_embeds_separator_and_newline() {
    let body = "title,tags\n\"Hello, world\",\"a|b\"\n\"multi\nline\",\"say \"\"hi\"\"\"\n";
    let data = split(body, CsvOptions::default());
    let records: Vec<RawRecord> = data.records().map(Result::unwrap).collect();

    assert_eq!(records[0].get("title"), Some("Hello, world"));
    assert_eq!(records[1].get("title"), Some("multi\nline"));
    assert_eq!(records[1].get("tags"), Some("say \"hi\""));
}

#[test]
fn test_custom_separator_and_quote() {
    let options = CsvOptions::default()
        .with_separator(';')
        .with_quote_char('\'');
    let data = split("a;b\n'x;y';z\n", options);
    let record = data.records().next().unwrap().unwrap();
    assert_eq!(record.get("a"), Some("x;y"));
    assert_eq!(record.get("b"), Some("z"));
}

#[test]
fn test_headerless_generates_names() {
    let options = CsvOptions::default().with_header(false);
    let data = split("abc,10\ndef,20\n", options);
    let records: Vec<RawRecord> = data.records().map(Result::unwrap).collect();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].get("col0"), Some("abc"));
    assert_eq!(records[1].get("col1"), Some("20"));
}

#[test]
fn test_byte_order_mark_stripped_from_header() {
    let data = split("\u{feff}video_id,views\nabc,1\n", CsvOptions::default());
    let record = data.records().next().unwrap().unwrap();
    assert_eq!(record.get("video_id"), Some("abc"));
}

#[test]
fn test_column_count_mismatch_is_read_parse_error() {
    let data = split("a,b,c\n1,2,3\n4,5\n6,7,8\n", CsvOptions::default());
    let results: Vec<_> = data.records().collect();

    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    match &results[1] {
        Err(Error::ReadParse {
            source_file,
            line,
            message,
        }) => {
            assert_eq!(source_file, "mem://test.csv");
            assert_eq!(*line, 3);
            assert_eq!(message, "found 2 fields, expected 3");
        }
        other => panic!("expected ReadParse, got {other:?}"),
    }
    // Reading continues past the bad row
    assert_eq!(results[2].as_ref().unwrap().get("a"), Some("6"));
}

#[test]
fn test_unterminated_quote_is_read_parse_error() {
    let data = split("a,b\n1,2\n3,\"never closed\n", CsvOptions::default());
    let results: Vec<_> = data.records().collect();

    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    match &results[1] {
        Err(Error::ReadParse { line, message, .. }) => {
            assert_eq!(*line, 3);
            assert_eq!(message, "unterminated quoted field");
        }
        other => panic!("expected ReadParse, got {other:?}"),
    }
}

#[test]
fn test_unterminated_quote_does_not_swallow_following_rows() {
    let data = split("a,b\n1,\"open\n2,3\n4,5\n", CsvOptions::default());
    let results: Vec<_> = data.records().collect();

    assert_eq!(results.len(), 1);
    match &results[0] {
        Err(Error::ReadParse { line, message, .. }) => {
            assert_eq!(*line, 2);
            assert_eq!(message, "unterminated quoted field");
        }
        other => panic!("expected ReadParse, got {other:?}"),
    }
}

#[test_case("a,b\n1,\"x\"\n" ; "closed quote at end")]
#[test_case("a,b\n1,\"say \"\"hi\"\"\"" ; "doubled quotes without newline")]
#[test_case("a,b\n1,ab\"c\n" ; "literal quote inside unquoted field")]
fn test_closed_quotes_at_end_of_input_are_fine(body: &'static str) {
    let data = split(body, CsvOptions::default());
    let results: Vec<_> = data.records().collect();
    assert_eq!(results.len(), 1);
    assert!(results[0].is_ok(), "{:?}", results[0]);
}

#[test]
fn test_last_row_without_newline_is_fine() {
    let data = split("a,b\n1,\"x\"", CsvOptions::default());
    let record = data.records().next().unwrap().unwrap();
    assert_eq!(record.get("b"), Some("x"));
}

#[test]
fn test_invalid_utf8_is_read_parse_error() {
    let data = SplitData::new(
        "mem://bad.csv",
        Bytes::from_static(b"a,b\n\xff\xfe,2\n"),
        CsvOptions::default(),
    );
    let result = data.records().next().unwrap();
    assert!(matches!(result, Err(Error::ReadParse { .. })));
}

#[test]
fn test_records_is_restartable() {
    let data = split("a\n1\n2\n3\n", CsvOptions::default());
    let first: Vec<String> = data
        .records()
        .map(|r| r.unwrap().get("a").unwrap().to_string())
        .collect();
    let second: Vec<String> = data
        .records()
        .map(|r| r.unwrap().get("a").unwrap().to_string())
        .collect();
    assert_eq!(first, vec!["1", "2", "3"]);
    assert_eq!(first, second);
}

#[test]
fn test_empty_file_has_no_records() {
    let data = split("", CsvOptions::default());
    assert!(data.is_empty());
    assert_eq!(data.records().count(), 0);

    let header_only = split("a,b\n", CsvOptions::default());
    assert_eq!(header_only.records().count(), 0);
}

// ============================================================================
// RawRecord Tests
// ============================================================================

#[test]
fn test_raw_record_from_pairs_and_json() {
    let record = RawRecord::from_pairs(
        RecordOrigin::new("inline", 1),
        &[("video_id", "abc"), ("views", "")],
    );
    assert_eq!(record.len(), 2);
    assert_eq!(record.field("views"), Some(""));
    assert_eq!(
        record.to_json(),
        serde_json::json!({"video_id": "abc", "views": ""})
    );
}

#[test]
fn test_duplicate_header_first_wins() {
    let headers = Headers::new(vec!["a".into(), "b".into(), "a".into()]);
    assert_eq!(headers.position("a"), Some(0));
    assert_eq!(headers.len(), 3);
}

#[test]
fn test_hashmap_field_lookup() {
    let mut map: HashMap<String, String> = HashMap::new();
    map.insert("region".into(), "US".into());
    assert_eq!(map.field("region"), Some("US"));
    assert_eq!(map.field("views"), None);
}

// ============================================================================
// Discovery Tests
// ============================================================================

#[tokio::test]
async fn test_discover_recursive_sorted_and_skips_hidden() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();
    std::fs::create_dir_all(root.join("region=US")).unwrap();
    std::fs::create_dir_all(root.join("_temporary")).unwrap();
    std::fs::write(root.join("b.csv"), "a\n1\n").unwrap();
    std::fs::write(root.join("region=US/a.csv"), "a\n2\n").unwrap();
    std::fs::write(root.join("_SUCCESS"), "").unwrap();
    std::fs::write(root.join(".b.csv.crc"), "x").unwrap();
    std::fs::write(root.join("_temporary/c.csv"), "a\n3\n").unwrap();

    let location = StorageLocation::parse(root.to_str().unwrap()).unwrap();
    let source = CsvSource::new(location, CsvOptions::default()).unwrap();
    let splits = source.discover().await.unwrap();

    let names: Vec<&str> = splits.iter().map(|s| s.path().as_ref()).collect();
    assert_eq!(names, vec!["b.csv", "region=US/a.csv"]);
}

#[tokio::test]
async fn test_discover_non_recursive() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();
    std::fs::create_dir_all(root.join("nested")).unwrap();
    std::fs::write(root.join("top.csv"), "a\n1\n").unwrap();
    std::fs::write(root.join("nested/deep.csv"), "a\n2\n").unwrap();

    let location = StorageLocation::parse(root.to_str().unwrap()).unwrap();
    let source = CsvSource::new(location, CsvOptions::default().with_recurse(false)).unwrap();
    let splits = source.discover().await.unwrap();

    assert_eq!(splits.len(), 1);
    assert_eq!(splits[0].path().as_ref(), "top.csv");
}

#[tokio::test]
async fn test_discover_single_file_and_fetch() {
    let temp_dir = tempfile::tempdir().unwrap();
    let file = temp_dir.path().join("US_videos.csv");
    std::fs::write(&file, "video_id\nabc\n").unwrap();

    let location = StorageLocation::parse(file.to_str().unwrap()).unwrap();
    let source = CsvSource::new(location, CsvOptions::default()).unwrap();
    let splits = source.discover().await.unwrap();
    assert_eq!(splits.len(), 1);
    assert!(splits[0].name().ends_with("US_videos.csv"));

    let data = splits[0].fetch().await.unwrap();
    let record = data.records().next().unwrap().unwrap();
    assert_eq!(record.get("video_id"), Some("abc"));
    assert!(record.origin().source.ends_with("US_videos.csv"));
}
