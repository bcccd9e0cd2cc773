mod cell_value;
mod column_array_builder;

pub use cell_value::CellValue;
pub(crate) use column_array_builder::ColumnArrayBuilder;

use crate::error::{Error, Result};
use crate::schema::TableSchema;

/// A single record, positionally aligned with the schema field order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub values: Vec<CellValue>,
}

impl Row {
    pub fn new(values: Vec<CellValue>) -> Self {
        Self { values }
    }

    /// Checks arity, required-null and value/type agreement against a schema.
    pub fn validate(&self, schema: &TableSchema) -> Result<()> {
        if self.values.len() != schema.fields.len() {
            return Err(Error::SchemaMismatch(format!(
                "row has {} values but schema has {} fields",
                self.values.len(),
                schema.fields.len()
            )));
        }
        for (value, field) in self.values.iter().zip(schema.fields.iter()) {
            if value.is_null() {
                if field.required {
                    return Err(Error::InvalidRow(format!(
                        "required field `{}` (id {}) is null",
                        field.name, field.id
                    )));
                }
                continue;
            }
            if !value.matches(field.field_type) {
                return Err(Error::InvalidRow(format!(
                    "value {:?} does not fit field `{}` of type {}",
                    value, field.name, field.field_type
                )));
            }
        }
        Ok(())
    }
}
