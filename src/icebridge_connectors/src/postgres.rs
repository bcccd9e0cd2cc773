//! Postgres source/target sessions over tokio-postgres.
//!
//! The connection future is driven on a spawned task to keep the event
//! loop alive. Bulk loads go through text-format COPY so the server parses
//! values against the staging table's own column types.

mod numeric;

use crate::convert::{date32_to_naive, micros_to_naive_datetime, naive_to_date32, utc_to_micros};
use crate::error::{Error, Result};
use crate::extraction::ExtractionQuery;
use crate::session::{ColumnInfo, Dialect, ExtractedRows, SourceSession, TargetSession};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use futures::{pin_mut, SinkExt};
use icebridge::type_mapper::RelationalType;
use icebridge::{CellValue, LogicalType, Row};
use native_tls::TlsConnector;
use numeric::PgNumeric;
use postgres_native_tls::MakeTlsConnector;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::Client;
use tracing::warn;

pub struct PostgresSession {
    client: Client,
    /// Connection driver task, cancelled at destruction.
    _connection: tokio::task::JoinHandle<()>,
}

impl PostgresSession {
    pub async fn connect(uri: &str) -> Result<Self> {
        let tls_connector = TlsConnector::new()
            .map_err(|e| Error::Configuration(format!("TLS initialisation failed: {e}")))?;
        let tls = MakeTlsConnector::new(tls_connector);
        let (client, connection) = tokio_postgres::connect(uri, tls).await?;

        // Drive the connection in the background to keep the event loop alive.
        let _connection = tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!("postgres connection error: {e}");
            }
        });

        Ok(Self {
            client,
            _connection,
        })
    }

    /// Raw statement access for fixtures and tests.
    pub async fn execute_raw(&mut self, sql: &str) -> Result<u64> {
        Ok(self.client.execute(sql, &[]).await?)
    }
}

fn pg_type_to_relational(column: &str, ty: &Type) -> Result<RelationalType> {
    let relational = match *ty {
        Type::BOOL => RelationalType::Boolean,
        Type::INT2 => RelationalType::SmallInt,
        Type::INT4 => RelationalType::Integer,
        Type::INT8 => RelationalType::BigInt,
        Type::FLOAT4 => RelationalType::Real,
        Type::FLOAT8 => RelationalType::DoublePrecision,
        Type::NUMERIC => RelationalType::Numeric,
        Type::BPCHAR | Type::CHAR => RelationalType::Char,
        Type::VARCHAR => RelationalType::VarChar,
        Type::TEXT | Type::NAME => RelationalType::Text,
        Type::DATE => RelationalType::Date,
        Type::TIMESTAMP => RelationalType::Timestamp,
        Type::TIMESTAMPTZ => RelationalType::TimestampTz,
        Type::BYTEA => RelationalType::Bytea,
        Type::UUID => RelationalType::Uuid,
        ref other => {
            return Err(Error::UnsupportedColumnType {
                column: column.to_string(),
                type_name: other.to_string(),
            })
        }
    };
    Ok(relational)
}

fn decode_cell(
    row: &tokio_postgres::Row,
    idx: usize,
    relational: RelationalType,
) -> Result<CellValue> {
    let value = match relational {
        RelationalType::Boolean => row
            .try_get::<_, Option<bool>>(idx)?
            .map_or(CellValue::Null, CellValue::Bool),
        RelationalType::SmallInt => row
            .try_get::<_, Option<i16>>(idx)?
            .map_or(CellValue::Null, |v| CellValue::Int32(v as i32)),
        RelationalType::Integer => row
            .try_get::<_, Option<i32>>(idx)?
            .map_or(CellValue::Null, CellValue::Int32),
        RelationalType::BigInt => row
            .try_get::<_, Option<i64>>(idx)?
            .map_or(CellValue::Null, CellValue::Int64),
        RelationalType::Real => row
            .try_get::<_, Option<f32>>(idx)?
            .map_or(CellValue::Null, CellValue::Float32),
        RelationalType::DoublePrecision => row
            .try_get::<_, Option<f64>>(idx)?
            .map_or(CellValue::Null, CellValue::Float64),
        RelationalType::Numeric => row
            .try_get::<_, Option<PgNumeric>>(idx)?
            .map_or(CellValue::Null, |v| CellValue::Float64(v.0)),
        RelationalType::Char | RelationalType::VarChar | RelationalType::Text => row
            .try_get::<_, Option<String>>(idx)?
            .map_or(CellValue::Null, CellValue::String),
        RelationalType::Date => row
            .try_get::<_, Option<NaiveDate>>(idx)?
            .map_or(CellValue::Null, |d| CellValue::Date32(naive_to_date32(d))),
        RelationalType::Timestamp => row
            .try_get::<_, Option<NaiveDateTime>>(idx)?
            .map_or(CellValue::Null, |ts| {
                CellValue::TimestampMicros(ts.and_utc().timestamp_micros())
            }),
        RelationalType::TimestampTz => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)?
            .map_or(CellValue::Null, |ts| {
                CellValue::TimestampMicros(utc_to_micros(ts))
            }),
        RelationalType::Bytea => row
            .try_get::<_, Option<Vec<u8>>>(idx)?
            .map_or(CellValue::Null, CellValue::Bytes),
        RelationalType::Uuid => row
            .try_get::<_, Option<uuid::Uuid>>(idx)?
            .map_or(CellValue::Null, |u| CellValue::Uuid(*u.as_bytes())),
    };
    Ok(value)
}

#[async_trait]
impl SourceSession for PostgresSession {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn extract(&mut self, query: &ExtractionQuery) -> Result<ExtractedRows> {
        let sql = query.sql(Dialect::Postgres.placeholder());
        let statement = self.client.prepare(&sql).await?;

        let columns: Vec<ColumnInfo> = statement
            .columns()
            .iter()
            .map(|column| {
                Ok(ColumnInfo {
                    name: column.name().to_string(),
                    relational_type: pg_type_to_relational(column.name(), column.type_())?,
                    // The wire protocol does not expose result nullability.
                    nullable: true,
                })
            })
            .collect::<Result<_>>()?;

        let fetched = match query.since {
            None => self.client.query(&statement, &[]).await?,
            Some(since) => {
                // Bind with whatever temporal type the server inferred for
                // the watermark comparison.
                let naive = since.naive_utc();
                let param: &(dyn ToSql + Sync) = match statement.params().first() {
                    Some(ty) if *ty == Type::TIMESTAMP => &naive,
                    _ => &since,
                };
                self.client.query(&statement, &[param]).await?
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
impl TargetSession for PostgresSession {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn execute(&mut self, sql: &str) -> Result<u64> {
        Ok(self.client.execute(sql, &[]).await?)
    }

    async fn query_count(&mut self, sql: &str) -> Result<i64> {
        let row = self.client.query_one(sql, &[]).await?;
        Ok(row.try_get(0)?)
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
        let sink = self
            .client
            .copy_in(&format!("COPY {table} ({column_list}) FROM STDIN"))
            .await?;
        pin_mut!(sink);

        let mut buffer = String::new();
        for row in rows {
            encode_copy_row(&mut buffer, row)?;
            if buffer.len() >= 64 * 1024 {
                sink.send(Bytes::from(std::mem::take(&mut buffer)))
                    .await?;
            }
        }
        if !buffer.is_empty() {
            sink.send(Bytes::from(buffer)).await?;
        }
        Ok(sink.finish().await?)
    }

    async fn begin(&mut self) -> Result<()> {
        self.client.batch_execute("BEGIN").await?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.client.batch_execute("COMMIT").await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.client.batch_execute("ROLLBACK").await?;
        Ok(())
    }
}

/// Append one row in COPY text format: tab-delimited, `\N` for null,
/// backslash escapes in strings.
fn encode_copy_row(buffer: &mut String, row: &Row) -> Result<()> {
    for (idx, value) in row.values.iter().enumerate() {
        if idx > 0 {
            buffer.push('\t');
        }
        match value {
            CellValue::Null => buffer.push_str("\\N"),
            CellValue::Bool(v) => buffer.push_str(if *v { "t" } else { "f" }),
            CellValue::Int32(v) => buffer.push_str(&v.to_string()),
            CellValue::Int64(v) => buffer.push_str(&v.to_string()),
            CellValue::Float32(v) => buffer.push_str(&v.to_string()),
            CellValue::Float64(v) => buffer.push_str(&v.to_string()),
            CellValue::String(v) => push_escaped(buffer, v),
            CellValue::Date32(days) => {
                let date = date32_to_naive(*days)
                    .ok_or_else(|| Error::decode(format!("column {idx}"), "date out of range"))?;
                buffer.push_str(&date.format("%Y-%m-%d").to_string());
            }
            CellValue::TimestampMicros(micros) => {
                let ts = micros_to_naive_datetime(*micros).ok_or_else(|| {
                    Error::decode(format!("column {idx}"), "timestamp out of range")
                })?;
                buffer.push_str(&ts.format("%Y-%m-%d %H:%M:%S%.6f").to_string());
            }
            CellValue::Bytes(v) => {
                // Literal `\x<hex>` needs its backslash escaped in COPY text.
                buffer.push_str("\\\\x");
                for byte in v {
                    buffer.push_str(&format!("{byte:02x}"));
                }
            }
            CellValue::Uuid(v) => {
                buffer.push_str(&uuid::Uuid::from_bytes(*v).to_string());
            }
        }
    }
    buffer.push('\n');
    Ok(())
}

fn push_escaped(buffer: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '\\' => buffer.push_str("\\\\"),
            '\t' => buffer.push_str("\\t"),
            '\n' => buffer.push_str("\\n"),
            '\r' => buffer.push_str("\\r"),
            other => buffer.push(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_row_encoding() {
        let mut buffer = String::new();
        encode_copy_row(
            &mut buffer,
            &Row::new(vec![
                CellValue::Int32(7),
                CellValue::Null,
                CellValue::String("a\tb\\c".to_string()),
                CellValue::Bool(true),
                CellValue::Bytes(vec![0xab, 0x01]),
            ]),
        )
        .unwrap();
        assert_eq!(buffer, "7\t\\N\ta\\tb\\\\c\tt\t\\\\xab01\n");
    }

    #[test]
    fn test_copy_row_temporal_encoding() {
        let mut buffer = String::new();
        encode_copy_row(
            &mut buffer,
            &Row::new(vec![
                CellValue::Date32(19_724), // 2024-01-02
                CellValue::TimestampMicros(1_704_153_600_123_456),
            ]),
        )
        .unwrap();
        assert_eq!(buffer, "2024-01-02\t2024-01-02 00:00:00.123456\n");
    }

    #[test]
    fn test_unsupported_pg_type_is_reported() {
        let result = pg_type_to_relational("payload", &Type::JSONB);
        assert!(matches!(result, Err(Error::UnsupportedColumnType { .. })));
    }
}
