//! Stage-and-merge strategies against the target database.
//!
//! Every strategy shares the same outer contract: bulk-load the row stream
//! into a session-scoped staging table, then finalise with a single
//! strategy-specific statement inside one transaction. The staging table is
//! dropped on exit regardless of outcome.

use crate::error::{Error, Result};
use crate::extraction::validate_identifier;
use crate::session::{Dialect, TargetSession};
use futures::{pin_mut, Stream, StreamExt};
use icebridge::{CellValue, LogicalType, Row, TableSchema};
use std::str::FromStr;
use tracing::debug;
use uuid::Uuid;

/// Default bulk-load batch size.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Load ordinal column added to the staging table; later rows win on upsert.
const LOAD_SEQ_COLUMN: &str = "_load_seq";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Insert new primary keys, update existing ones. Requires a declared
    /// primary key.
    Upsert,
    /// Plain insert; primary-key violations surface as failures.
    Append,
    /// Truncate the target and insert, all-or-nothing.
    Replace,
}

impl FromStr for MergeStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "upsert" => Ok(MergeStrategy::Upsert),
            "append" => Ok(MergeStrategy::Append),
            "replace" => Ok(MergeStrategy::Replace),
            other => Err(Error::Configuration(format!(
                "unknown merge strategy `{other}`"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub rows_inserted: u64,
    pub rows_updated: u64,
}

/// Target table, its schema, and the merge parameters.
#[derive(Debug, Clone)]
pub struct MergeRequest<'a> {
    pub target_table: &'a str,
    pub schema: &'a TableSchema,
    /// Column names of the primary key; empty when none was declared.
    pub primary_key: &'a [String],
    pub batch_size: usize,
}

/// Bulk-load `rows` into a staging table and merge into the target.
pub async fn merge_rows<S>(
    session: &mut dyn TargetSession,
    strategy: MergeStrategy,
    request: &MergeRequest<'_>,
    rows: S,
) -> Result<MergeOutcome>
where
    S: Stream<Item = icebridge::Result<Row>>,
{
    validate_identifier(request.target_table)?;
    for field in &request.schema.fields {
        validate_identifier(&field.name)?;
    }
    for key in request.primary_key {
        validate_identifier(key)?;
        if request.schema.field_by_name(key).is_none() {
            return Err(Error::Configuration(format!(
                "primary-key column `{key}` is not part of the schema"
            )));
        }
    }
    if strategy == MergeStrategy::Upsert && request.primary_key.is_empty() {
        return Err(Error::Configuration(
            "upsert merge requires a primary key".to_string(),
        ));
    }
    let batch_size = request.batch_size.max(1);

    let staging = format!(
        "_staging_{}_{}",
        request.target_table,
        &Uuid::new_v4().simple().to_string()[..8]
    );
    session
        .execute(&format!(
            "CREATE TEMPORARY TABLE {staging} AS SELECT * FROM {} WHERE 1 = 0",
            request.target_table
        ))
        .await?;
    session
        .execute(&format!(
            "ALTER TABLE {staging} ADD COLUMN {LOAD_SEQ_COLUMN} BIGINT"
        ))
        .await?;

    let result = load_and_finalize(session, strategy, request, &staging, batch_size, rows).await;
    if result.is_err() {
        // A failed finalisation may leave an open transaction behind.
        let _ = session.rollback().await;
    }
    let _ = session
        .execute(&format!("DROP TABLE IF EXISTS {staging}"))
        .await;
    result
}

async fn load_and_finalize<S>(
    session: &mut dyn TargetSession,
    strategy: MergeStrategy,
    request: &MergeRequest<'_>,
    staging: &str,
    batch_size: usize,
    rows: S,
) -> Result<MergeOutcome>
where
    S: Stream<Item = icebridge::Result<Row>>,
{
    let mut columns: Vec<(String, LogicalType)> = request
        .schema
        .fields
        .iter()
        .map(|f| (f.name.clone(), f.field_type))
        .collect();
    columns.push((LOAD_SEQ_COLUMN.to_string(), LogicalType::Long));

    pin_mut!(rows);
    let mut batch: Vec<Row> = Vec::with_capacity(batch_size);
    let mut staged: u64 = 0;
    let mut seq: i64 = 0;
    while let Some(row) = rows.next().await {
        let mut row = row?;
        row.values.push(CellValue::Int64(seq));
        seq += 1;
        batch.push(row);
        if batch.len() >= batch_size {
            staged += session.bulk_insert(staging, &columns, &batch).await?;
            batch.clear();
        }
    }
    if !batch.is_empty() {
        staged += session.bulk_insert(staging, &columns, &batch).await?;
    }
    debug!(staging, staged, "bulk-loaded staging table");

    let column_list = request
        .schema
        .field_names()
        .join(", ");
    match strategy {
        MergeStrategy::Upsert => {
            finalize_upsert(session, request, staging, &column_list).await
        }
        MergeStrategy::Append => {
            session.begin().await?;
            let inserted = session
                .execute(&format!(
                    "INSERT INTO {} ({column_list}) SELECT {column_list} FROM {staging} \
                     ORDER BY {LOAD_SEQ_COLUMN}",
                    request.target_table
                ))
                .await?;
            session.commit().await?;
            Ok(MergeOutcome {
                rows_inserted: inserted,
                rows_updated: 0,
            })
        }
        MergeStrategy::Replace => {
            let truncate = match session.dialect() {
                Dialect::Postgres => format!("TRUNCATE {}", request.target_table),
                // SQLite has no TRUNCATE statement.
                Dialect::Sqlite => format!("DELETE FROM {}", request.target_table),
            };
            session.begin().await?;
            session.execute(&truncate).await?;
            let inserted = session
                .execute(&format!(
                    "INSERT INTO {} ({column_list}) SELECT {column_list} FROM {staging} \
                     ORDER BY {LOAD_SEQ_COLUMN}",
                    request.target_table
                ))
                .await?;
            session.commit().await?;
            Ok(MergeOutcome {
                rows_inserted: inserted,
                rows_updated: 0,
            })
        }
    }
}

/// `INSERT ... ON CONFLICT (pk) DO UPDATE`, the single-statement MERGE
/// equivalent both supported dialects share.
async fn finalize_upsert(
    session: &mut dyn TargetSession,
    request: &MergeRequest<'_>,
    staging: &str,
    column_list: &str,
) -> Result<MergeOutcome> {
    let pk_list = request.primary_key.join(", ");

    // The staged stream is the cumulative table state, so one primary key
    // can appear several times; keep the last-loaded version of each.
    session
        .execute(&format!(
            "DELETE FROM {staging} WHERE {LOAD_SEQ_COLUMN} NOT IN \
             (SELECT MAX({LOAD_SEQ_COLUMN}) FROM {staging} GROUP BY {pk_list})"
        ))
        .await?;

    // Exact split counts: matched keys become updates, the rest inserts.
    // Single-writer discipline makes this count race-free.
    let match_condition = request
        .primary_key
        .iter()
        .map(|key| format!("s.{key} = t.{key}"))
        .collect::<Vec<_>>()
        .join(" AND ");
    let matched = session
        .query_count(&format!(
            "SELECT COUNT(*) FROM {} t WHERE EXISTS \
             (SELECT 1 FROM {staging} s WHERE {match_condition})",
            request.target_table
        ))
        .await? as u64;

    let non_key_updates = request
        .schema
        .fields
        .iter()
        .filter(|f| !request.primary_key.contains(&f.name))
        .map(|f| format!("{} = excluded.{}", f.name, f.name))
        .collect::<Vec<_>>()
        .join(", ");
    let conflict_action = if non_key_updates.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {non_key_updates}")
    };

    session.begin().await?;
    let affected = session
        .execute(&format!(
            "INSERT INTO {} ({column_list}) SELECT {column_list} FROM {staging} WHERE true \
             ON CONFLICT ({pk_list}) {conflict_action}",
            request.target_table
        ))
        .await?;
    session.commit().await?;

    if non_key_updates.is_empty() {
        Ok(MergeOutcome {
            rows_inserted: affected,
            rows_updated: 0,
        })
    } else {
        Ok(MergeOutcome {
            rows_inserted: affected.saturating_sub(matched),
            rows_updated: matched,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_parsing() {
        assert_eq!(MergeStrategy::from_str("upsert").unwrap(), MergeStrategy::Upsert);
        assert_eq!(MergeStrategy::from_str("append").unwrap(), MergeStrategy::Append);
        assert_eq!(MergeStrategy::from_str("replace").unwrap(), MergeStrategy::Replace);
        assert!(MergeStrategy::from_str("merge").is_err());
    }
}
