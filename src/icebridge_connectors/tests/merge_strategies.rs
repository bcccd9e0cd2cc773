//! Merge-strategy behaviour against a real SQLite target.

#![cfg(feature = "db-sqlite")]

use futures::stream;
use icebridge::{CellValue, LogicalType, Row, SchemaField, TableSchema};
use icebridge_connectors::{
    merge_rows, MergeOutcome, MergeRequest, MergeStrategy, SqliteSession, TargetSession,
};
use tempfile::TempDir;

fn orders_schema() -> TableSchema {
    TableSchema::new(
        0,
        vec![
            SchemaField::required(1, "order_id", LogicalType::Long),
            SchemaField::optional(2, "amount", LogicalType::Double),
            SchemaField::optional(3, "note", LogicalType::String),
        ],
    )
    .unwrap()
}

fn order(order_id: i64, amount: f64, note: Option<&str>) -> Row {
    Row::new(vec![
        CellValue::Int64(order_id),
        CellValue::Float64(amount),
        note.map_or(CellValue::Null, |n| CellValue::String(n.to_string())),
    ])
}

async fn target_session(temp_dir: &TempDir) -> SqliteSession {
    let mut session = SqliteSession::connect(&temp_dir.path().join("target.db"))
        .await
        .unwrap();
    session
        .execute_raw(
            "CREATE TABLE orders (order_id INTEGER PRIMARY KEY, amount REAL, note TEXT)",
        )
        .await
        .unwrap();
    session
}

async fn run_merge(
    session: &mut SqliteSession,
    strategy: MergeStrategy,
    primary_key: &[String],
    rows: Vec<Row>,
) -> icebridge_connectors::Result<MergeOutcome> {
    let schema = orders_schema();
    let request = MergeRequest {
        target_table: "orders",
        schema: &schema,
        primary_key,
        batch_size: 2,
    };
    merge_rows(
        session,
        strategy,
        &request,
        stream::iter(rows.into_iter().map(Ok)),
    )
    .await
}

async fn table_state(session: &mut SqliteSession) -> Vec<(i64, f64)> {
    let count = session
        .query_count("SELECT COUNT(*) FROM orders")
        .await
        .unwrap();
    let mut out = Vec::new();
    for i in 0..count {
        let id = session
            .query_count(&format!(
                "SELECT order_id FROM orders ORDER BY order_id LIMIT 1 OFFSET {i}"
            ))
            .await
            .unwrap();
        let cents = session
            .query_count(&format!(
                "SELECT CAST(amount * 100 AS INTEGER) FROM orders WHERE order_id = {id}"
            ))
            .await
            .unwrap();
        out.push((id, cents as f64 / 100.0));
    }
    out
}

#[tokio::test]
async fn test_upsert_inserts_and_updates_with_split_counts() {
    let temp_dir = TempDir::new().unwrap();
    let mut session = target_session(&temp_dir).await;
    let pk = vec!["order_id".to_string()];

    let outcome = run_merge(
        &mut session,
        MergeStrategy::Upsert,
        &pk,
        vec![order(1, 10.0, Some("a")), order(2, 20.0, None)],
    )
    .await
    .unwrap();
    assert_eq!(
        outcome,
        MergeOutcome {
            rows_inserted: 2,
            rows_updated: 0
        }
    );

    // Cumulative stream: old row 1, its newer version, and a new row 3.
    let outcome = run_merge(
        &mut session,
        MergeStrategy::Upsert,
        &pk,
        vec![
            order(1, 10.0, Some("a")),
            order(2, 20.0, None),
            order(1, 11.0, Some("updated")),
            order(3, 30.0, None),
        ],
    )
    .await
    .unwrap();
    assert_eq!(
        outcome,
        MergeOutcome {
            rows_inserted: 1,
            rows_updated: 2
        }
    );
    assert_eq!(
        table_state(&mut session).await,
        vec![(1, 11.0), (2, 20.0), (3, 30.0)]
    );
}

#[tokio::test]
async fn test_upsert_without_primary_key_is_a_configuration_error() {
    let temp_dir = TempDir::new().unwrap();
    let mut session = target_session(&temp_dir).await;
    let result = run_merge(
        &mut session,
        MergeStrategy::Upsert,
        &[],
        vec![order(1, 10.0, None)],
    )
    .await;
    assert!(matches!(
        result,
        Err(icebridge_connectors::Error::Configuration(_))
    ));
}

#[tokio::test]
async fn test_append_surfaces_primary_key_violations() {
    let temp_dir = TempDir::new().unwrap();
    let mut session = target_session(&temp_dir).await;

    let outcome = run_merge(
        &mut session,
        MergeStrategy::Append,
        &[],
        vec![order(1, 10.0, None), order(2, 20.0, None)],
    )
    .await
    .unwrap();
    assert_eq!(outcome.rows_inserted, 2);

    // Appending the same key again is a failure, not a silent skip.
    let result = run_merge(
        &mut session,
        MergeStrategy::Append,
        &[],
        vec![order(1, 99.0, None)],
    )
    .await;
    assert!(result.is_err());
    // The failed merge left the target untouched.
    assert_eq!(table_state(&mut session).await, vec![(1, 10.0), (2, 20.0)]);
}

#[tokio::test]
async fn test_replace_is_all_or_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let mut session = target_session(&temp_dir).await;
    run_merge(
        &mut session,
        MergeStrategy::Append,
        &[],
        vec![order(1, 10.0, None), order(2, 20.0, None)],
    )
    .await
    .unwrap();

    let outcome = run_merge(
        &mut session,
        MergeStrategy::Replace,
        &[],
        vec![order(7, 70.0, None)],
    )
    .await
    .unwrap();
    assert_eq!(outcome.rows_inserted, 1);
    assert_eq!(table_state(&mut session).await, vec![(7, 70.0)]);
}

#[tokio::test]
async fn test_staging_table_dropped_on_success_and_failure() {
    let temp_dir = TempDir::new().unwrap();
    let mut session = target_session(&temp_dir).await;
    run_merge(
        &mut session,
        MergeStrategy::Append,
        &[],
        vec![order(1, 10.0, None)],
    )
    .await
    .unwrap();
    // A second append of the same key fails mid-merge.
    let _ = run_merge(
        &mut session,
        MergeStrategy::Append,
        &[],
        vec![order(1, 10.0, None)],
    )
    .await;

    let staging_left = session
        .query_count(
            "SELECT COUNT(*) FROM sqlite_temp_master WHERE name LIKE '_staging_orders_%'",
        )
        .await
        .unwrap();
    assert_eq!(staging_left, 0);
}
