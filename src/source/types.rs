//! Source types
//!
//! Parsing options and the raw (all-text) record produced by the reader.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Delimited text parsing options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsvOptions {
    /// Field separator
    #[serde(default = "default_separator")]
    pub separator: char,
    /// Quote character; quoted fields may contain the separator
    #[serde(default = "default_quote_char")]
    pub quote_char: char,
    /// Whether the first line of each file is a header
    #[serde(default = "default_true")]
    pub with_header: bool,
    /// Whether to descend into nested directories
    #[serde(default = "default_true")]
    pub recurse: bool,
}

fn default_separator() -> char {
    ','
}

fn default_quote_char() -> char {
    '"'
}

fn default_true() -> bool {
    true
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            separator: default_separator(),
            quote_char: default_quote_char(),
            with_header: true,
            recurse: true,
        }
    }
}

impl CsvOptions {
    /// Set the separator
    #[must_use]
    pub fn with_separator(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }

    /// Set the quote character
    #[must_use]
    pub fn with_quote_char(mut self, quote_char: char) -> Self {
        self.quote_char = quote_char;
        self
    }

    /// Set header presence
    #[must_use]
    pub fn with_header(mut self, with_header: bool) -> Self {
        self.with_header = with_header;
        self
    }

    /// Set recursive traversal
    #[must_use]
    pub fn with_recurse(mut self, recurse: bool) -> Self {
        self.recurse = recurse;
        self
    }

    /// Check that separator and quote are usable single-byte characters
    pub fn validate(&self) -> Result<()> {
        let separator = single_byte("separator", self.separator)?;
        let quote = single_byte("quote_char", self.quote_char)?;
        if separator == quote {
            return Err(Error::invalid_value(
                "quote_char",
                "must differ from the separator",
            ));
        }
        Ok(())
    }

    /// csv reader configured with these options
    pub(crate) fn reader_builder(&self) -> csv::ReaderBuilder {
        let mut builder = csv::ReaderBuilder::new();
        builder
            .delimiter(self.separator as u8)
            .quote(self.quote_char as u8)
            .double_quote(true)
            .has_headers(self.with_header)
            .flexible(false);
        builder
    }
}

fn single_byte(field: &str, c: char) -> Result<u8> {
    if !c.is_ascii() || c == '\n' || c == '\r' {
        return Err(Error::invalid_value(
            field,
            format!("{c:?} must be a single ASCII character other than a line break"),
        ));
    }
    Ok(c as u8)
}

/// Field names of one file, in column order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Headers {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl Headers {
    /// Build from column names; on duplicates the first column wins
    pub fn new(names: Vec<String>) -> Self {
        let mut index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            index.entry(name.clone()).or_insert(i);
        }
        Self { names, index }
    }

    /// Generated names for headerless files: `col0`, `col1`, ...
    pub fn generated(count: usize) -> Self {
        Self::new((0..count).map(|i| format!("col{i}")).collect())
    }

    /// Column position of a field
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Column names
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Check if there are no columns
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Where a record came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOrigin {
    /// Source file
    pub source: Arc<str>,
    /// 1-based line number of the row
    pub line: u64,
}

impl RecordOrigin {
    /// Create an origin
    pub fn new(source: impl Into<Arc<str>>, line: u64) -> Self {
        Self {
            source: source.into(),
            line,
        }
    }
}

/// Lookup of raw text values by field name
pub trait FieldLookup {
    /// Raw value of a field, `None` when the field does not exist
    fn field(&self, name: &str) -> Option<&str>;
}

impl FieldLookup for HashMap<String, String> {
    fn field(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str)
    }
}

impl FieldLookup for HashMap<&str, &str> {
    fn field(&self, name: &str) -> Option<&str> {
        self.get(name).copied()
    }
}

/// One parsed row: header names mapped to raw text
#[derive(Debug, Clone)]
pub struct RawRecord {
    origin: RecordOrigin,
    headers: Arc<Headers>,
    values: csv::StringRecord,
}

impl RawRecord {
    /// Create a raw record
    pub fn new(origin: RecordOrigin, headers: Arc<Headers>, values: csv::StringRecord) -> Self {
        Self {
            origin,
            headers,
            values,
        }
    }

    /// Build a record from name/value pairs
    pub fn from_pairs(origin: RecordOrigin, pairs: &[(&str, &str)]) -> Self {
        let headers = Headers::new(pairs.iter().map(|(k, _)| (*k).to_string()).collect());
        let values = pairs.iter().map(|(_, v)| *v).collect::<csv::StringRecord>();
        Self::new(origin, Arc::new(headers), values)
    }

    /// Raw value of a field
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .position(name)
            .and_then(|i| self.values.get(i))
    }

    /// Where this record came from
    pub fn origin(&self) -> &RecordOrigin {
        &self.origin
    }

    /// Header of the file this record belongs to
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Number of values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the record has no values
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Record as a JSON object of raw strings
    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        for (name, value) in self.headers.names().iter().zip(self.values.iter()) {
            obj.entry(name.clone())
                .or_insert_with(|| Value::String(value.to_string()));
        }
        Value::Object(obj)
    }
}

impl FieldLookup for RawRecord {
    fn field(&self, name: &str) -> Option<&str> {
        self.get(name)
    }
}
