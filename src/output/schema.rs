//! Typed records to Arrow and back

use crate::error::{Error, Result};
use crate::mapping::{TypedRecord, TypedValue};
use arrow::array::{
    Array, ArrayRef, AsArray, BooleanBuilder, Int64Builder, StringBuilder,
};
use arrow::datatypes::{DataType, Int64Type, SchemaRef};
use arrow::record_batch::RecordBatch;
use serde_json::Value;
use std::sync::Arc;

/// Restrict a schema to the given column positions, in order
pub fn project_schema(schema: &SchemaRef, columns: &[usize]) -> Result<SchemaRef> {
    Ok(Arc::new(schema.project(columns)?))
}

/// Build a batch from records, taking `columns` (positions in the full record)
///
/// `schema` must already be projected to those columns.
pub fn records_to_batch<'a, I>(schema: &SchemaRef, columns: &[usize], records: I) -> Result<RecordBatch>
where
    I: IntoIterator<Item = &'a TypedRecord>,
    I::IntoIter: Clone,
{
    if schema.fields().len() != columns.len() {
        return Err(Error::output(format!(
            "Schema has {} fields but {} columns were selected",
            schema.fields().len(),
            columns.len()
        )));
    }

    let records = records.into_iter();
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(columns.len());

    for (field, &column) in schema.fields().iter().zip(columns) {
        let values = records.clone().map(|record| {
            record.get(column).ok_or_else(|| {
                Error::output(format!("Record has no value for column '{}'", field.name()))
            })
        });

        let array: ArrayRef = match field.data_type() {
            DataType::Utf8 => {
                let mut builder = StringBuilder::new();
                for value in values {
                    match value? {
                        TypedValue::String(s) => builder.append_value(s),
                        other => return Err(mismatch(field.name(), other)),
                    }
                }
                Arc::new(builder.finish())
            }
            DataType::Int64 => {
                let mut builder = Int64Builder::new();
                for value in values {
                    match value? {
                        TypedValue::BigInt(v) => builder.append_value(*v),
                        other => return Err(mismatch(field.name(), other)),
                    }
                }
                Arc::new(builder.finish())
            }
            DataType::Boolean => {
                let mut builder = BooleanBuilder::new();
                for value in values {
                    match value? {
                        TypedValue::Boolean(v) => builder.append_value(*v),
                        other => return Err(mismatch(field.name(), other)),
                    }
                }
                Arc::new(builder.finish())
            }
            other => {
                return Err(Error::output(format!(
                    "Unsupported column type {other} for '{}'",
                    field.name()
                )))
            }
        };
        arrays.push(array);
    }

    Ok(RecordBatch::try_new(Arc::clone(schema), arrays)?)
}

fn mismatch(column: &str, value: &TypedValue) -> Error {
    Error::output(format!(
        "Column '{column}' cannot hold a {} value",
        value.field_type()
    ))
}

/// Convert a batch read back from Parquet into typed records
pub fn batch_to_records(batch: &RecordBatch) -> Result<Vec<TypedRecord>> {
    let mut rows: Vec<Vec<TypedValue>> = (0..batch.num_rows())
        .map(|_| Vec::with_capacity(batch.num_columns()))
        .collect();

    for (field, column) in batch.schema().fields().iter().zip(batch.columns()) {
        if column.null_count() > 0 {
            return Err(Error::output(format!(
                "Column '{}' contains nulls",
                field.name()
            )));
        }

        match column.data_type() {
            DataType::Utf8 => {
                let array = column.as_string::<i32>();
                for (row, value) in rows.iter_mut().zip(array.iter()) {
                    row.push(TypedValue::String(value.unwrap_or_default().to_string()));
                }
            }
            DataType::Int64 => {
                let array = column.as_primitive::<Int64Type>();
                for (row, value) in rows.iter_mut().zip(array.values().iter()) {
                    row.push(TypedValue::BigInt(*value));
                }
            }
            DataType::Boolean => {
                let array = column.as_boolean();
                for (row, value) in rows.iter_mut().zip(array.iter()) {
                    row.push(TypedValue::Boolean(value.unwrap_or_default()));
                }
            }
            other => {
                return Err(Error::output(format!(
                    "Unsupported column type {other} for '{}'",
                    field.name()
                )))
            }
        }
    }

    Ok(rows.into_iter().map(TypedRecord::new).collect())
}

/// Convert a batch to JSON objects, one per row
pub fn batch_to_json(batch: &RecordBatch) -> Result<Vec<Value>> {
    if batch.num_rows() == 0 {
        return Ok(Vec::new());
    }

    let mut writer = arrow::json::ArrayWriter::new(Vec::new());
    writer.write(batch)?;
    writer.finish()?;
    let buf = writer.into_inner();

    match serde_json::from_slice(&buf)? {
        Value::Array(rows) => Ok(rows),
        other => Ok(vec![other]),
    }
}
