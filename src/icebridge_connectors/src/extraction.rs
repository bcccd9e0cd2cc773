//! Watermark-driven change extraction queries.
//!
//! The first run of a table has no watermark and extracts everything;
//! subsequent runs select only rows whose watermark column moved past the
//! recorded boundary. The watermark value is always a bound parameter,
//! never interpolated.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};

/// Longest identifier accepted for tables and columns.
const MAX_IDENTIFIER_LEN: usize = 128;

/// Reject identifiers that could smuggle SQL into an interpolated position.
/// Accepted set: `[A-Za-z_][A-Za-z0-9_$]*`, at most 128 bytes.
pub fn validate_identifier(identifier: &str) -> Result<()> {
    let mut chars = identifier.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        }
        None => false,
    };
    if !valid || identifier.len() > MAX_IDENTIFIER_LEN {
        return Err(Error::Configuration(format!(
            "invalid identifier `{identifier}`"
        )));
    }
    Ok(())
}

/// A built extraction query: rendered per dialect by the source session.
#[derive(Debug, Clone)]
pub struct ExtractionQuery {
    pub table: String,
    pub watermark_column: String,
    /// Bound as the single query parameter when present.
    pub since: Option<DateTime<Utc>>,
}

impl ExtractionQuery {
    /// SQL text with the given positional placeholder for the watermark.
    pub fn sql(&self, placeholder: &str) -> String {
        match self.since {
            None => format!("SELECT * FROM {}", self.table),
            Some(_) => format!(
                "SELECT * FROM {} WHERE {} > {placeholder}",
                self.table, self.watermark_column
            ),
        }
    }
}

/// Builds extraction queries for one watermark column.
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    watermark_column: String,
}

impl ChangeDetector {
    pub fn new(watermark_column: impl Into<String>) -> Result<Self> {
        let watermark_column = watermark_column.into();
        validate_identifier(&watermark_column)?;
        Ok(Self { watermark_column })
    }

    pub fn build(
        &self,
        table: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<ExtractionQuery> {
        validate_identifier(table)?;
        Ok(ExtractionQuery {
            table: table.to_string(),
            watermark_column: self.watermark_column.clone(),
            since,
        })
    }
}
