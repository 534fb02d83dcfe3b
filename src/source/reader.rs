//! Delimited file discovery and row parsing

use super::types::{CsvOptions, Headers, RawRecord, RecordOrigin};
use crate::error::{Error, Result};
use crate::storage::{is_hidden, StorageLocation};
use bytes::Bytes;
use object_store::path::Path as ObjectPath;
use std::io::Cursor;
use std::sync::Arc;

/// Files under a storage prefix, read as delimited text
#[derive(Debug, Clone)]
pub struct CsvSource {
    location: StorageLocation,
    options: CsvOptions,
}

impl CsvSource {
    /// Create a source over a location
    pub fn new(location: StorageLocation, options: CsvOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self { location, options })
    }

    /// The location being read
    pub fn location(&self) -> &StorageLocation {
        &self.location
    }

    /// Parsing options
    pub fn options(&self) -> &CsvOptions {
        &self.options
    }

    /// List the files to read, in path order
    ///
    /// Names starting with `_` or `.` (markers, checksums, staging
    /// directories) are skipped. A prefix naming a single object yields that object.
    pub async fn discover(&self) -> Result<Vec<SourceSplit>> {
        let mut objects = self.location.list("", self.options.recurse).await?;
        objects.retain(|meta| {
            self.location
                .relative(&meta.location)
                .is_some_and(|rel| !is_hidden(rel))
        });

        if objects.is_empty() && !self.location.prefix().as_ref().is_empty() {
            if let Some(meta) = self.location.head(self.location.prefix()).await? {
                objects.push(meta);
            }
        }

        tracing::debug!(
            "Discovered {} file(s) under {}",
            objects.len(),
            self.location.url()
        );

        Ok(objects
            .into_iter()
            .map(|meta| SourceSplit {
                location: self.location.clone(),
                path: meta.location,
                size: meta.size as u64,
                options: self.options,
            })
            .collect())
    }
}

/// One source file: an independent unit of work
#[derive(Debug, Clone)]
pub struct SourceSplit {
    location: StorageLocation,
    path: ObjectPath,
    size: u64,
    options: CsvOptions,
}

impl SourceSplit {
    /// Full display path of the file
    pub fn name(&self) -> String {
        self.location.display(&self.path)
    }

    /// Object path within the store
    pub fn path(&self) -> &ObjectPath {
        &self.path
    }

    /// Size in bytes as listed
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Fetch the file contents
    pub async fn fetch(&self) -> Result<SplitData> {
        let bytes = self.location.get(&self.path).await?;
        Ok(SplitData::new(self.name(), bytes, self.options))
    }
}

/// Contents of one fetched file
#[derive(Debug, Clone)]
pub struct SplitData {
    source: Arc<str>,
    bytes: Bytes,
    options: CsvOptions,
}

impl SplitData {
    /// Wrap file contents
    pub fn new(source: impl Into<Arc<str>>, bytes: Bytes, options: CsvOptions) -> Self {
        Self {
            source: source.into(),
            bytes,
            options,
        }
    }

    /// Name of the file
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Size of the contents
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if the file is empty
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Iterate the rows from the start; may be called any number of times
    pub fn records(&self) -> RecordIter {
        RecordIter {
            reader: self
                .options
                .reader_builder()
                .from_reader(Cursor::new(self.bytes.clone())),
            source: Arc::clone(&self.source),
            bytes: self.bytes.clone(),
            delimiter: self.options.separator as u8,
            quote: self.options.quote_char as u8,
            with_header: self.options.with_header,
            headers: None,
            row: csv::StringRecord::new(),
            done: false,
        }
    }
}

/// Iterator over the rows of one file
pub struct RecordIter {
    reader: csv::Reader<Cursor<Bytes>>,
    source: Arc<str>,
    bytes: Bytes,
    delimiter: u8,
    quote: u8,
    with_header: bool,
    headers: Option<Arc<Headers>>,
    row: csv::StringRecord,
    done: bool,
}

impl RecordIter {
    /// Header of the file, reading it if necessary
    fn header_row(&mut self) -> Result<Option<Arc<Headers>>> {
        if self.headers.is_some() || !self.with_header {
            return Ok(self.headers.clone());
        }

        let names: Vec<String> = self
            .reader
            .headers()
            .map_err(|e| parse_error(&self.source, &e))?
            .iter()
            .enumerate()
            .map(|(i, name)| {
                if i == 0 {
                    name.trim_start_matches('\u{feff}').to_string()
                } else {
                    name.to_string()
                }
            })
            .collect();

        let headers = Arc::new(Headers::new(names));
        self.headers = Some(Arc::clone(&headers));
        Ok(Some(headers))
    }

    /// The current row ran to the end of input inside a quoted field
    fn unterminated_quote(&self) -> bool {
        let at_end = self.reader.position().byte() as usize >= self.bytes.len();
        if !at_end {
            return false;
        }
        let start = self.row.position().map_or(0, |p| p.byte() as usize);
        self.bytes
            .get(start..)
            .is_some_and(|tail| ends_inside_quotes(tail, self.delimiter, self.quote))
    }
}

/// Scan one record's bytes and report whether a quoted field is still open at the end
fn ends_inside_quotes(bytes: &[u8], delimiter: u8, quote: u8) -> bool {
    let mut quoted = false;
    let mut field_start = true;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if quoted {
            if b == quote {
                if bytes.get(i + 1) == Some(&quote) {
                    i += 1;
                } else {
                    quoted = false;
                }
            }
        } else if field_start && b == quote {
            quoted = true;
            field_start = false;
        } else {
            field_start = b == delimiter || b == b'\n' || b == b'\r';
        }
        i += 1;
    }
    quoted
}

impl Iterator for RecordIter {
    type Item = Result<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let headers = match self.header_row() {
            Ok(headers) => headers,
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };

        match self.reader.read_record(&mut self.row) {
            Ok(true) => {
                let line = self.row.position().map_or(0, csv::Position::line);
                if self.unterminated_quote() {
                    self.done = true;
                    return Some(Err(Error::read_parse(
                        self.source.as_ref(),
                        line,
                        "unterminated quoted field",
                    )));
                }
                let headers = match headers {
                    Some(headers) => headers,
                    None => {
                        let generated = Arc::new(Headers::generated(self.row.len()));
                        self.headers = Some(Arc::clone(&generated));
                        generated
                    }
                };
                let origin = RecordOrigin::new(Arc::clone(&self.source), line);
                Some(Ok(RawRecord::new(origin, headers, self.row.clone())))
            }
            Ok(false) => {
                self.done = true;
                None
            }
            Err(e) => {
                if e.is_io_error() {
                    self.done = true;
                }
                Some(Err(parse_error(&self.source, &e)))
            }
        }
    }
}

/// Turn a csv error into a `ReadParse` error for the given file
fn parse_error(source: &str, err: &csv::Error) -> Error {
    let line = err.position().map_or(0, csv::Position::line);
    let message = match err.kind() {
        csv::ErrorKind::UnequalLengths {
            expected_len, len, ..
        } => format!("found {len} fields, expected {expected_len}"),
        csv::ErrorKind::Utf8 { err, .. } => format!("invalid UTF-8: {err}"),
        _ => err.to_string(),
    };
    Error::read_parse(source, line, message)
}
