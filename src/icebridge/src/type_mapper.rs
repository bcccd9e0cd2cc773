use crate::schema::{LogicalType, SchemaField, TableSchema};
use arrow_schema::{DataType, Field as ArrowField, Schema as ArrowSchema, TimeUnit};
use std::collections::HashMap;
use std::sync::Arc;

/// Metadata key carrying the Iceberg field id on every Parquet/Arrow column.
pub const PARQUET_FIELD_ID_KEY: &str = "PARQUET:field_id";

/// The relational column types the extraction side can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationalType {
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    Real,
    DoublePrecision,
    /// Widened to `double`; the precision loss is a documented trade-off.
    Numeric,
    Char,
    VarChar,
    Text,
    Date,
    Timestamp,
    TimestampTz,
    Bytea,
    Uuid,
}

/// Total mapping from the declared relational type set to logical types.
pub fn relational_to_logical(relational: RelationalType) -> LogicalType {
    match relational {
        RelationalType::Boolean => LogicalType::Boolean,
        RelationalType::SmallInt | RelationalType::Integer => LogicalType::Int,
        RelationalType::BigInt => LogicalType::Long,
        RelationalType::Real => LogicalType::Float,
        RelationalType::DoublePrecision => LogicalType::Double,
        RelationalType::Numeric => LogicalType::Double,
        RelationalType::Char | RelationalType::VarChar | RelationalType::Text => {
            LogicalType::String
        }
        RelationalType::Date => LogicalType::Date,
        RelationalType::Timestamp => LogicalType::Timestamp,
        RelationalType::TimestampTz => LogicalType::Timestamptz,
        RelationalType::Bytea => LogicalType::Binary,
        RelationalType::Uuid => LogicalType::Uuid,
    }
}

/// Physical Arrow type backing each logical type.
pub fn logical_to_arrow(logical: LogicalType) -> DataType {
    match logical {
        LogicalType::Boolean => DataType::Boolean,
        LogicalType::Int => DataType::Int32,
        LogicalType::Long => DataType::Int64,
        LogicalType::Float => DataType::Float32,
        LogicalType::Double => DataType::Float64,
        LogicalType::String => DataType::Utf8,
        LogicalType::Date => DataType::Date32,
        LogicalType::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, None),
        LogicalType::Timestamptz => {
            DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into()))
        }
        LogicalType::Binary => DataType::Binary,
        LogicalType::Uuid => DataType::FixedSizeBinary(16),
    }
}

/// Arrow field for a schema field, tagged with its Iceberg field id.
pub fn field_to_arrow(field: &SchemaField) -> ArrowField {
    let metadata = HashMap::from([(PARQUET_FIELD_ID_KEY.to_string(), field.id.to_string())]);
    ArrowField::new(
        field.name.clone(),
        logical_to_arrow(field.field_type),
        !field.required,
    )
    .with_metadata(metadata)
}

/// Arrow schema for a table schema, preserving field order and ids.
pub fn schema_to_arrow(schema: &TableSchema) -> Arc<ArrowSchema> {
    let fields: Vec<ArrowField> = schema.fields.iter().map(field_to_arrow).collect();
    Arc::new(ArrowSchema::new(fields))
}

/// Field id carried in an Arrow field's metadata, if any.
pub fn arrow_field_id(field: &ArrowField) -> Option<i32> {
    field
        .metadata()
        .get(PARQUET_FIELD_ID_KEY)
        .and_then(|raw| raw.parse::<i32>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relational_mapping_is_total() {
        let cases = [
            (RelationalType::Boolean, LogicalType::Boolean),
            (RelationalType::SmallInt, LogicalType::Int),
            (RelationalType::Integer, LogicalType::Int),
            (RelationalType::BigInt, LogicalType::Long),
            (RelationalType::Real, LogicalType::Float),
            (RelationalType::DoublePrecision, LogicalType::Double),
            (RelationalType::Numeric, LogicalType::Double),
            (RelationalType::Char, LogicalType::String),
            (RelationalType::VarChar, LogicalType::String),
            (RelationalType::Text, LogicalType::String),
            (RelationalType::Date, LogicalType::Date),
            (RelationalType::Timestamp, LogicalType::Timestamp),
            (RelationalType::TimestampTz, LogicalType::Timestamptz),
            (RelationalType::Bytea, LogicalType::Binary),
            (RelationalType::Uuid, LogicalType::Uuid),
        ];
        for (relational, logical) in cases {
            assert_eq!(relational_to_logical(relational), logical);
        }
    }

    #[test]
    fn test_arrow_field_carries_field_id() {
        let field = SchemaField::optional(7, "amount", LogicalType::Double);
        let arrow_field = field_to_arrow(&field);
        assert_eq!(arrow_field_id(&arrow_field), Some(7));
        assert!(arrow_field.is_nullable());
        assert_eq!(arrow_field.data_type(), &DataType::Float64);
    }

    #[test]
    fn test_timestamptz_arrow_type_is_utc() {
        match logical_to_arrow(LogicalType::Timestamptz) {
            DataType::Timestamp(TimeUnit::Microsecond, Some(tz)) => assert_eq!(tz.as_ref(), "UTC"),
            other => panic!("unexpected arrow type {other:?}"),
        }
    }
}
