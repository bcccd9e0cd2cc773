//! SQLite source/target sessions over a single sqlx connection.
//!
//! Used both as an embedded production backend and as the hermetic backend
//! for the test suites; transactions are driven with plain BEGIN/COMMIT so
//! the session trait stays object-safe.

use crate::convert::{date32_to_naive, micros_to_naive_datetime, naive_datetime_to_micros, naive_to_date32};
use crate::error::{Error, Result};
use crate::extraction::ExtractionQuery;
use crate::session::{ColumnInfo, Dialect, ExtractedRows, SourceSession, TargetSession};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use icebridge::type_mapper::RelationalType;
use icebridge::{CellValue, LogicalType, Row};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Column, Connection, Executor, Row as SqlxRow, TypeInfo};
use std::path::Path;

/// Keep bound parameters per statement well under SQLite's limit.
const MAX_PARAMS_PER_STATEMENT: usize = 30_000;

/// Canonical SQLite datetime text form.
fn format_datetime(value: NaiveDateTime) -> String {
    value.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

pub struct SqliteSession {
    conn: SqliteConnection,
}

impl SqliteSession {
    /// Open (creating if missing) a database file.
    pub async fn connect(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let conn = SqliteConnection::connect_with(&options).await?;
        Ok(Self { conn })
    }

    /// Raw statement access for fixtures and tests.
    pub async fn execute_raw(&mut self, sql: &str) -> Result<u64> {
        Ok(self.conn.execute(sql).await?.rows_affected())
    }
}

fn declared_type_to_relational(column: &str, type_name: &str) -> Result<RelationalType> {
    let relational = match type_name.to_ascii_uppercase().as_str() {
        "BOOLEAN" => RelationalType::Boolean,
        "INTEGER" | "INT8" | "BIGINT" => RelationalType::BigInt,
        // SQLite numeric affinity stores integers or reals; surface as double.
        "REAL" | "NUMERIC" => RelationalType::DoublePrecision,
        "TEXT" => RelationalType::Text,
        "BLOB" => RelationalType::Bytea,
        "DATE" => RelationalType::Date,
        "DATETIME" => RelationalType::Timestamp,
        other => {
            return Err(Error::UnsupportedColumnType {
                column: column.to_string(),
                type_name: other.to_string(),
            })
        }
    };
    Ok(relational)
}

fn decode_cell(row: &SqliteRow, idx: usize, relational: RelationalType) -> Result<CellValue> {
    let value = match relational {
        RelationalType::Boolean => row
            .try_get::<Option<bool>, _>(idx)?
            .map_or(CellValue::Null, CellValue::Bool),
        RelationalType::BigInt => row
            .try_get::<Option<i64>, _>(idx)?
            .map_or(CellValue::Null, CellValue::Int64),
        RelationalType::DoublePrecision => row
            .try_get::<Option<f64>, _>(idx)?
            .map_or(CellValue::Null, CellValue::Float64),
        RelationalType::Text => row
            .try_get::<Option<String>, _>(idx)?
            .map_or(CellValue::Null, CellValue::String),
        RelationalType::Bytea => row
            .try_get::<Option<Vec<u8>>, _>(idx)?
            .map_or(CellValue::Null, CellValue::Bytes),
        RelationalType::Date => row
            .try_get::<Option<NaiveDate>, _>(idx)?
            .map_or(CellValue::Null, |d| CellValue::Date32(naive_to_date32(d))),
        RelationalType::Timestamp => row
            .try_get::<Option<NaiveDateTime>, _>(idx)?
            .map_or(CellValue::Null, |ts| {
                CellValue::TimestampMicros(naive_datetime_to_micros(ts))
            }),
        other => {
            return Err(Error::decode(
                format!("column {idx}"),
                format!("relational type {other:?} is not produced by the sqlite backend"),
            ))
        }
    };
    Ok(value)
}

#[async_trait]
impl SourceSession for SqliteSession {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn extract(&mut self, query: &ExtractionQuery) -> Result<ExtractedRows> {
        let sql = query.sql(Dialect::Sqlite.placeholder());

        // Column names, declared types and nullability come from the
        // statement description so an empty delta still yields metadata.
        let describe = self.conn.describe(&sql).await?;
        let mut columns = Vec::with_capacity(describe.columns().len());
        for (idx, column) in describe.columns().iter().enumerate() {
            columns.push(ColumnInfo {
                name: column.name().to_string(),
                relational_type: declared_type_to_relational(
                    column.name(),
                    column.type_info().name(),
                )?,
                nullable: describe.nullable(idx).unwrap_or(true),
            });
        }

        let fetched = match query.since {
            None => sqlx::query(&sql).fetch_all(&mut self.conn).await?,
            // Bind the watermark as canonical SQLite datetime text so the
            // comparison stays lexicographically consistent with stored
            // values.
            Some(since) => {
                sqlx::query(&sql)
                    .bind(format_datetime(since.naive_utc()))
                    .fetch_all(&mut self.conn)
                    .await?
            }
        };
        let mut rows = Vec::with_capacity(fetched.len());
        for fetched_row in &fetched {
            let mut values = Vec::with_capacity(columns.len());
            for (idx, column) in columns.iter().enumerate() {
                values.push(decode_cell(fetched_row, idx, column.relational_type)?);
            }
            rows.push(Row::new(values));
        }
        Ok(ExtractedRows { columns, rows })
    }
}

#[async_trait]
impl TargetSession for SqliteSession {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn execute(&mut self, sql: &str) -> Result<u64> {
        Ok(self.conn.execute(sql).await?.rows_affected())
    }

    async fn query_count(&mut self, sql: &str) -> Result<i64> {
        Ok(sqlx::query_scalar::<_, i64>(sql)
            .fetch_one(&mut self.conn)
            .await?)
    }

    async fn bulk_insert(
        &mut self,
        table: &str,
        columns: &[(String, LogicalType)],
        rows: &[Row],
    ) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let column_list = columns
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let rows_per_statement = (MAX_PARAMS_PER_STATEMENT / columns.len().max(1)).max(1);

        let mut inserted = 0u64;
        for chunk in rows.chunks(rows_per_statement) {
            let mut builder = sqlx::QueryBuilder::<sqlx::Sqlite>::new(format!(
                "INSERT INTO {table} ({column_list}) "
            ));
            builder.push_values(chunk, |mut bindings, row| {
                for value in &row.values {
                    push_cell(&mut bindings, value);
                }
            });
            inserted += builder.build().execute(&mut self.conn).await?.rows_affected();
        }
        Ok(inserted)
    }

    async fn begin(&mut self) -> Result<()> {
        self.conn.execute("BEGIN").await?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.conn.execute("COMMIT").await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.conn.execute("ROLLBACK").await?;
        Ok(())
    }
}

fn push_cell(
    bindings: &mut sqlx::query_builder::Separated<'_, '_, sqlx::Sqlite, &'static str>,
    value: &CellValue,
) {
    match value {
        CellValue::Bool(v) => {
            bindings.push_bind(*v);
        }
        CellValue::Int32(v) => {
            bindings.push_bind(*v);
        }
        CellValue::Int64(v) => {
            bindings.push_bind(*v);
        }
        CellValue::Float32(v) => {
            bindings.push_bind(*v as f64);
        }
        CellValue::Float64(v) => {
            bindings.push_bind(*v);
        }
        CellValue::String(v) => {
            bindings.push_bind(v.clone());
        }
        CellValue::Date32(days) => {
            bindings.push_bind(date32_to_naive(*days).map(|d| d.format("%Y-%m-%d").to_string()));
        }
        // SQLite has no timezone-aware storage; timestamps are UTC text in
        // the same canonical format the watermark binds with.
        CellValue::TimestampMicros(micros) => {
            bindings.push_bind(micros_to_naive_datetime(*micros).map(format_datetime));
        }
        CellValue::Bytes(v) => {
            bindings.push_bind(v.clone());
        }
        CellValue::Uuid(v) => {
            bindings.push_bind(uuid::Uuid::from_bytes(*v));
        }
        CellValue::Null => {
            bindings.push_bind(None::<i64>);
        }
    }
}
