//! Storage module
//!
//! Object store access shared by the source reader and the partitioned writer.
//!
//! # Overview
//!
//! - `StorageLocation` - a URL prefix (`s3://`, `gs://`, `az://`, `file://` or a
//!   local path) resolved to an object store plus a key prefix
//! - `RetryPolicy` - bounded exponential backoff for transient storage errors

mod location;
mod retry;

pub use location::{is_hidden, StorageLocation};
pub use retry::RetryPolicy;
