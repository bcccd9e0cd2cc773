use crate::schema::LogicalType;

/// One column value of a row. Null is an explicit marker, so a null string
/// is never conflated with the empty string.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    String(String),
    /// Days since 1970-01-01.
    Date32(i32),
    /// Microseconds since epoch.
    TimestampMicros(i64),
    Bytes(Vec<u8>),
    Uuid([u8; 16]),
    #[default]
    Null,
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Whether this value can be stored under the given logical type.
    pub fn matches(&self, logical: LogicalType) -> bool {
        matches!(
            (self, logical),
            (CellValue::Bool(_), LogicalType::Boolean)
                | (CellValue::Int32(_), LogicalType::Int)
                | (CellValue::Int64(_), LogicalType::Long)
                | (CellValue::Float32(_), LogicalType::Float)
                | (CellValue::Float64(_), LogicalType::Double)
                | (CellValue::String(_), LogicalType::String)
                | (CellValue::Date32(_), LogicalType::Date)
                | (CellValue::TimestampMicros(_), LogicalType::Timestamp)
                | (CellValue::TimestampMicros(_), LogicalType::Timestamptz)
                | (CellValue::Bytes(_), LogicalType::Binary)
                | (CellValue::Uuid(_), LogicalType::Uuid)
                | (CellValue::Null, _)
        )
    }

    /// Rough in-memory footprint, used for row-group byte accounting.
    pub(crate) fn estimated_size(&self) -> usize {
        match self {
            CellValue::Bool(_) => 1,
            CellValue::Int32(_) | CellValue::Date32(_) | CellValue::Float32(_) => 4,
            CellValue::Int64(_) | CellValue::TimestampMicros(_) | CellValue::Float64(_) => 8,
            CellValue::String(s) => s.len(),
            CellValue::Bytes(b) => b.len(),
            CellValue::Uuid(_) => 16,
            CellValue::Null => 1,
        }
    }
}
