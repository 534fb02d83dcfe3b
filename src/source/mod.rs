//! Source reader module
//!
//! Reads delimited text files under a storage prefix into raw records.
//!
//! # Overview
//!
//! - `CsvSource` discovers files (splits) under a prefix, optionally recursively
//! - `SourceSplit` fetches one file; `SplitData::records()` is a restartable,
//!   finite iterator over its rows
//! - `RawRecord` maps header names to raw text; no type interpretation happens here

mod reader;
mod types;

pub use reader::{CsvSource, RecordIter, SourceSplit, SplitData};
pub use types::{CsvOptions, FieldLookup, Headers, RawRecord, RecordOrigin};

#[cfg(test)]
mod tests;
