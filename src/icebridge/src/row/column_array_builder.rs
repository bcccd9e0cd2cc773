use crate::error::{Error, Result};
use crate::row::CellValue;
use arrow::array::builder::{BinaryBuilder, BooleanBuilder, PrimitiveBuilder, StringBuilder};
use arrow::array::types::{
    Date32Type, Float32Type, Float64Type, Int32Type, Int64Type, TimestampMicrosecondType,
};
use arrow::array::{ArrayRef, FixedSizeBinaryBuilder};
use arrow::datatypes::DataType;
use std::sync::Arc;

/// A column array builder that can handle each supported physical type.
pub(crate) enum ColumnArrayBuilder {
    Boolean(BooleanBuilder),
    Int32(PrimitiveBuilder<Int32Type>),
    Int64(PrimitiveBuilder<Int64Type>),
    Float32(PrimitiveBuilder<Float32Type>),
    Float64(PrimitiveBuilder<Float64Type>),
    Utf8(StringBuilder),
    Date32(PrimitiveBuilder<Date32Type>),
    TimestampMicros(PrimitiveBuilder<TimestampMicrosecondType>, Option<Arc<str>>),
    Binary(BinaryBuilder),
    FixedSizeBinary(FixedSizeBinaryBuilder),
}

impl ColumnArrayBuilder {
    /// Create a new column array builder for a specific data type.
    pub(crate) fn new(data_type: &DataType, capacity: usize) -> Self {
        match data_type {
            DataType::Boolean => {
                ColumnArrayBuilder::Boolean(BooleanBuilder::with_capacity(capacity))
            }
            DataType::Int32 => {
                ColumnArrayBuilder::Int32(PrimitiveBuilder::<Int32Type>::with_capacity(capacity))
            }
            DataType::Int64 => {
                ColumnArrayBuilder::Int64(PrimitiveBuilder::<Int64Type>::with_capacity(capacity))
            }
            DataType::Float32 => ColumnArrayBuilder::Float32(
                PrimitiveBuilder::<Float32Type>::with_capacity(capacity),
            ),
            DataType::Float64 => ColumnArrayBuilder::Float64(
                PrimitiveBuilder::<Float64Type>::with_capacity(capacity),
            ),
            DataType::Utf8 => {
                ColumnArrayBuilder::Utf8(StringBuilder::with_capacity(capacity, capacity * 10))
            }
            DataType::Date32 => {
                ColumnArrayBuilder::Date32(PrimitiveBuilder::<Date32Type>::with_capacity(capacity))
            }
            DataType::Timestamp(_, tz) => ColumnArrayBuilder::TimestampMicros(
                PrimitiveBuilder::<TimestampMicrosecondType>::with_capacity(capacity),
                tz.clone(),
            ),
            DataType::Binary => {
                ColumnArrayBuilder::Binary(BinaryBuilder::with_capacity(capacity, capacity * 10))
            }
            DataType::FixedSizeBinary(size) => {
                debug_assert_eq!(*size, 16);
                ColumnArrayBuilder::FixedSizeBinary(FixedSizeBinaryBuilder::with_capacity(
                    capacity, 16,
                ))
            }
            other => unreachable!("unsupported arrow data type: {other:?}"),
        }
    }

    /// Append a value to this builder. Callers validate rows first, so a
    /// type mismatch here is reported, never panicked on.
    pub(crate) fn append_value(&mut self, value: &CellValue) -> Result<()> {
        match self {
            ColumnArrayBuilder::Boolean(builder) => match value {
                CellValue::Bool(v) => builder.append_value(*v),
                CellValue::Null => builder.append_null(),
                other => return Err(type_error("boolean", other)),
            },
            ColumnArrayBuilder::Int32(builder) => match value {
                CellValue::Int32(v) => builder.append_value(*v),
                CellValue::Null => builder.append_null(),
                other => return Err(type_error("int32", other)),
            },
            ColumnArrayBuilder::Int64(builder) => match value {
                CellValue::Int64(v) => builder.append_value(*v),
                CellValue::Null => builder.append_null(),
                other => return Err(type_error("int64", other)),
            },
            ColumnArrayBuilder::Float32(builder) => match value {
                CellValue::Float32(v) => builder.append_value(*v),
                CellValue::Null => builder.append_null(),
                other => return Err(type_error("float32", other)),
            },
            ColumnArrayBuilder::Float64(builder) => match value {
                CellValue::Float64(v) => builder.append_value(*v),
                CellValue::Null => builder.append_null(),
                other => return Err(type_error("float64", other)),
            },
            ColumnArrayBuilder::Utf8(builder) => match value {
                CellValue::String(v) => builder.append_value(v),
                CellValue::Null => builder.append_null(),
                other => return Err(type_error("utf8", other)),
            },
            ColumnArrayBuilder::Date32(builder) => match value {
                CellValue::Date32(v) => builder.append_value(*v),
                CellValue::Null => builder.append_null(),
                other => return Err(type_error("date32", other)),
            },
            ColumnArrayBuilder::TimestampMicros(builder, _) => match value {
                CellValue::TimestampMicros(v) => builder.append_value(*v),
                CellValue::Null => builder.append_null(),
                other => return Err(type_error("timestamp", other)),
            },
            ColumnArrayBuilder::Binary(builder) => match value {
                CellValue::Bytes(v) => builder.append_value(v),
                CellValue::Null => builder.append_null(),
                other => return Err(type_error("binary", other)),
            },
            ColumnArrayBuilder::FixedSizeBinary(builder) => match value {
                CellValue::Uuid(v) => builder
                    .append_value(v)
                    .map_err(|e| Error::InvalidRow(format!("bad fixed-size value: {e}")))?,
                CellValue::Null => builder.append_null(),
                other => return Err(type_error("fixed-size binary", other)),
            },
        }
        Ok(())
    }

    /// Finish and reset this builder, producing an array of the target type.
    pub(crate) fn finish(&mut self) -> ArrayRef {
        match self {
            ColumnArrayBuilder::Boolean(builder) => Arc::new(builder.finish()),
            ColumnArrayBuilder::Int32(builder) => Arc::new(builder.finish()),
            ColumnArrayBuilder::Int64(builder) => Arc::new(builder.finish()),
            ColumnArrayBuilder::Float32(builder) => Arc::new(builder.finish()),
            ColumnArrayBuilder::Float64(builder) => Arc::new(builder.finish()),
            ColumnArrayBuilder::Utf8(builder) => Arc::new(builder.finish()),
            ColumnArrayBuilder::Date32(builder) => Arc::new(builder.finish()),
            ColumnArrayBuilder::TimestampMicros(builder, tz) => {
                Arc::new(builder.finish().with_timezone_opt(tz.clone()))
            }
            ColumnArrayBuilder::Binary(builder) => Arc::new(builder.finish()),
            ColumnArrayBuilder::FixedSizeBinary(builder) => Arc::new(builder.finish()),
        }
    }
}

fn type_error(expected: &str, got: &CellValue) -> Error {
    Error::InvalidRow(format!("expected {expected} value, got {got:?}"))
}
