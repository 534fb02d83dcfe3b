//! Schema mapping module
//!
//! Renames fields and coerces their raw text to declared types.
//!
//! # Overview
//!
//! - `FieldMapping` - one (source field, source type, target field, target type) entry
//! - `MappingTable` - the ordered table; its order is the output column order
//! - `coerce` - pure coercion of one raw value to a `FieldType`
//!
//! Applying a table is all-or-nothing per record: the first field that cannot
//! be found or coerced fails the whole record.

mod coerce;
mod types;

pub use coerce::coerce;
pub use types::{FieldMapping, MappingTable, TypedRecord, TypedValue};
