//! Parquet data-file reader.
//!
//! Columns are matched to schema fields by Iceberg field id, never by name
//! or position, so a file whose physical column order is permuted reads
//! identically. Rows are yielded lazily; dropping the stream cancels the
//! read at the next yield point.

use crate::error::{Error, Result};
use crate::row::{CellValue, Row};
use crate::schema::{LogicalType, TableSchema};
use crate::type_mapper::arrow_field_id;
use arrow::array::{
    Array, ArrayRef, BinaryArray, BooleanArray, Date32Array, FixedSizeBinaryArray, Float32Array,
    Float64Array, Int32Array, Int64Array, StringArray, TimestampMicrosecondArray,
};
use arrow::record_batch::RecordBatch;
use async_stream::try_stream;
use futures::Stream;
use futures::StreamExt;
use parquet::arrow::ParquetRecordBatchStreamBuilder;
use std::path::PathBuf;

/// Stream the rows of one Parquet file in the order of `expected` fields.
pub fn stream_parquet_rows(
    path: PathBuf,
    expected: TableSchema,
) -> impl Stream<Item = Result<Row>> + Send {
    try_stream! {
        let file = tokio::fs::File::open(&path).await?;
        let builder = ParquetRecordBatchStreamBuilder::new(file).await?;
        let file_schema = builder.schema().clone();
        let projection = resolve_projection(&expected, &file_schema, &path)?;
        let mut batches = builder.build()?;

        while let Some(batch) = batches.next().await {
            let batch = batch?;
            // All columns of the batch are materialised; transpose to rows
            // in schema field order.
            for row_idx in 0..batch.num_rows() {
                yield transpose_row(&batch, &projection, &expected, row_idx)?;
            }
        }
    }
}

/// For each expected field, the file column index holding its field id.
fn resolve_projection(
    expected: &TableSchema,
    file_schema: &arrow_schema::Schema,
    path: &std::path::Path,
) -> Result<Vec<usize>> {
    let mut projection = Vec::with_capacity(expected.fields.len());
    for field in &expected.fields {
        let index = file_schema
            .fields()
            .iter()
            .position(|file_field| arrow_field_id(file_field.as_ref()) == Some(field.id))
            .ok_or_else(|| {
                Error::SchemaMismatch(format!(
                    "field id {} (`{}`) not present in {}",
                    field.id,
                    field.name,
                    path.display()
                ))
            })?;
        projection.push(index);
    }
    Ok(projection)
}

fn transpose_row(
    batch: &RecordBatch,
    projection: &[usize],
    expected: &TableSchema,
    row_idx: usize,
) -> Result<Row> {
    let mut values = Vec::with_capacity(projection.len());
    for (column_idx, field) in projection.iter().zip(expected.fields.iter()) {
        let column = batch.column(*column_idx);
        values.push(cell_from_column(column, field.field_type, row_idx, &field.name)?);
    }
    Ok(Row::new(values))
}

fn cell_from_column(
    column: &ArrayRef,
    logical: LogicalType,
    row_idx: usize,
    field_name: &str,
) -> Result<CellValue> {
    if column.is_null(row_idx) {
        return Ok(CellValue::Null);
    }
    let mismatch = || {
        Error::SchemaMismatch(format!(
            "column `{field_name}` has physical type {:?}, expected {logical}",
            column.data_type()
        ))
    };
    let value = match logical {
        LogicalType::Boolean => CellValue::Bool(
            column
                .as_any()
                .downcast_ref::<BooleanArray>()
                .ok_or_else(mismatch)?
                .value(row_idx),
        ),
        LogicalType::Int => CellValue::Int32(
            column
                .as_any()
                .downcast_ref::<Int32Array>()
                .ok_or_else(mismatch)?
                .value(row_idx),
        ),
        LogicalType::Long => CellValue::Int64(
            column
                .as_any()
                .downcast_ref::<Int64Array>()
                .ok_or_else(mismatch)?
                .value(row_idx),
        ),
        LogicalType::Float => CellValue::Float32(
            column
                .as_any()
                .downcast_ref::<Float32Array>()
                .ok_or_else(mismatch)?
                .value(row_idx),
        ),
        LogicalType::Double => CellValue::Float64(
            column
                .as_any()
                .downcast_ref::<Float64Array>()
                .ok_or_else(mismatch)?
                .value(row_idx),
        ),
        LogicalType::String => CellValue::String(
            column
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(mismatch)?
                .value(row_idx)
                .to_string(),
        ),
        LogicalType::Date => CellValue::Date32(
            column
                .as_any()
                .downcast_ref::<Date32Array>()
                .ok_or_else(mismatch)?
                .value(row_idx),
        ),
        LogicalType::Timestamp | LogicalType::Timestamptz => CellValue::TimestampMicros(
            column
                .as_any()
                .downcast_ref::<TimestampMicrosecondArray>()
                .ok_or_else(mismatch)?
                .value(row_idx),
        ),
        LogicalType::Binary => CellValue::Bytes(
            column
                .as_any()
                .downcast_ref::<BinaryArray>()
                .ok_or_else(mismatch)?
                .value(row_idx)
                .to_vec(),
        ),
        LogicalType::Uuid => {
            let raw = column
                .as_any()
                .downcast_ref::<FixedSizeBinaryArray>()
                .ok_or_else(mismatch)?
                .value(row_idx);
            let bytes: [u8; 16] = raw.try_into().map_err(|_| mismatch())?;
            CellValue::Uuid(bytes)
        }
    };
    Ok(value)
}
