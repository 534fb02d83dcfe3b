//! Text to typed value coercion

use super::types::TypedValue;
use crate::error::{Error, Result};
use crate::types::FieldType;
use std::num::IntErrorKind;

/// Coerce the raw text of `field` to `target`
///
/// - `string`: passthrough, no validation
/// - `bigint`: surrounding whitespace trimmed, base-10 with optional sign
/// - `boolean`: `true` / `false`, case-insensitive, nothing else
pub fn coerce(field: &str, value: &str, target: FieldType) -> Result<TypedValue> {
    match target {
        FieldType::String => Ok(TypedValue::String(value.to_string())),
        FieldType::BigInt => parse_bigint(field, value).map(TypedValue::BigInt),
        FieldType::Boolean => parse_boolean(field, value).map(TypedValue::Boolean),
    }
}

fn parse_bigint(field: &str, value: &str) -> Result<i64> {
    value.trim().parse::<i64>().map_err(|e| {
        let message = match e.kind() {
            IntErrorKind::Empty => "empty value",
            IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => "out of range for bigint",
            _ => "not a base-10 integer",
        };
        Error::coercion(field, value, FieldType::BigInt.as_str(), message)
    })
}

fn parse_boolean(field: &str, value: &str) -> Result<bool> {
    if value.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if value.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(Error::coercion(
            field,
            value,
            FieldType::Boolean.as_str(),
            "expected true or false",
        ))
    }
}
