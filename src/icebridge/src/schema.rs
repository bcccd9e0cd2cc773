use crate::error::{Error, Result};
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// The closed set of logical column types the engine supports.
///
/// Serialized in table metadata as the plain lowercase Iceberg type string
/// (`"long"`, `"timestamptz"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalType {
    Boolean,
    /// 32-bit signed integer.
    Int,
    /// 64-bit signed integer.
    Long,
    Float,
    Double,
    String,
    /// Days since 1970-01-01.
    Date,
    /// Microseconds since epoch, no offset.
    Timestamp,
    /// Microseconds since epoch, UTC.
    Timestamptz,
    Binary,
    /// 16-byte fixed.
    Uuid,
}

impl LogicalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogicalType::Boolean => "boolean",
            LogicalType::Int => "int",
            LogicalType::Long => "long",
            LogicalType::Float => "float",
            LogicalType::Double => "double",
            LogicalType::String => "string",
            LogicalType::Date => "date",
            LogicalType::Timestamp => "timestamp",
            LogicalType::Timestamptz => "timestamptz",
            LogicalType::Binary => "binary",
            LogicalType::Uuid => "uuid",
        }
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogicalType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "boolean" => Ok(LogicalType::Boolean),
            "int" => Ok(LogicalType::Int),
            "long" => Ok(LogicalType::Long),
            "float" => Ok(LogicalType::Float),
            "double" => Ok(LogicalType::Double),
            "string" => Ok(LogicalType::String),
            "date" => Ok(LogicalType::Date),
            "timestamp" => Ok(LogicalType::Timestamp),
            "timestamptz" => Ok(LogicalType::Timestamptz),
            "binary" => Ok(LogicalType::Binary),
            "uuid" => Ok(LogicalType::Uuid),
            other => Err(Error::SchemaMismatch(format!(
                "unknown logical type `{other}`"
            ))),
        }
    }
}

impl Serialize for LogicalType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for LogicalType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        LogicalType::from_str(&s).map_err(de::Error::custom)
    }
}

/// A single named column with its stable field id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    /// Stable numeric identity; crosses the Parquet boundary, never reused.
    pub id: i32,
    pub name: String,
    pub required: bool,
    #[serde(rename = "type")]
    pub field_type: LogicalType,
}

impl SchemaField {
    pub fn required(id: i32, name: impl Into<String>, field_type: LogicalType) -> Self {
        Self {
            id,
            name: name.into(),
            required: true,
            field_type,
        }
    }

    pub fn optional(id: i32, name: impl Into<String>, field_type: LogicalType) -> Self {
        Self {
            id,
            name: name.into(),
            required: false,
            field_type,
        }
    }
}

fn struct_literal() -> String {
    "struct".to_string()
}

/// Ordered list of fields plus the schema id, as embedded in table metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TableSchema {
    pub schema_id: i32,
    #[serde(rename = "type", default = "struct_literal")]
    struct_kind: String,
    pub fields: Vec<SchemaField>,
}

impl TableSchema {
    /// Builds a schema, validating field-id and name uniqueness.
    pub fn new(schema_id: i32, fields: Vec<SchemaField>) -> Result<Self> {
        if fields.is_empty() {
            return Err(Error::SchemaMismatch(
                "schema must contain at least one field".to_string(),
            ));
        }
        let mut ids = HashSet::new();
        let mut names = HashSet::new();
        for field in &fields {
            if field.id <= 0 {
                return Err(Error::SchemaMismatch(format!(
                    "field `{}` has non-positive field id {}",
                    field.name, field.id
                )));
            }
            if !ids.insert(field.id) {
                return Err(Error::SchemaMismatch(format!(
                    "duplicate field id {} in schema",
                    field.id
                )));
            }
            if !names.insert(field.name.as_str()) {
                return Err(Error::SchemaMismatch(format!(
                    "duplicate field name `{}` in schema",
                    field.name
                )));
            }
        }
        Ok(Self {
            schema_id,
            struct_kind: struct_literal(),
            fields,
        })
    }

    pub fn field_by_id(&self, id: i32) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.id == id)
    }

    pub fn field_by_name(&self, name: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Highest field id assigned in this schema.
    pub fn max_field_id(&self) -> i32 {
        self.fields.iter().map(|f| f.id).max().unwrap_or(0)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Structural equality check used by the appender: same ids, names,
    /// types and nullability in the same order.
    pub fn ensure_matches(&self, other: &TableSchema) -> Result<()> {
        if self.fields.len() != other.fields.len() {
            return Err(Error::SchemaMismatch(format!(
                "field count differs: {} vs {}",
                self.fields.len(),
                other.fields.len()
            )));
        }
        for (a, b) in self.fields.iter().zip(other.fields.iter()) {
            if a.id != b.id || a.name != b.name || a.field_type != b.field_type
                || a.required != b.required
            {
                return Err(Error::SchemaMismatch(format!(
                    "field `{}` (id {}) does not match `{}` (id {})",
                    a.name, a.id, b.name, b.id
                )));
            }
        }
        Ok(())
    }
}
