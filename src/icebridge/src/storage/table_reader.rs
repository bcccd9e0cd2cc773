//! Stream the rows of a snapshot by walking its manifest list, then each
//! manifest, then each data file.
//!
//! Rows come back in manifest-list order, then manifest-entry order, then
//! row-group and row order within each data file. At most one Parquet file
//! is open at a time; dropping the stream cancels the read at the next
//! data-file boundary or yielded row.

use crate::error::{Error, Result};
use crate::row::Row;
use crate::schema::TableSchema;
use crate::storage::catalog::FileSystemCatalog;
use crate::storage::manifest::{self, STATUS_DELETED};
use crate::storage::metadata::Snapshot;
use crate::storage::parquet_reader::stream_parquet_rows;
use async_stream::try_stream;
use futures::{Stream, StreamExt};
use std::path::PathBuf;
use std::pin::Pin;

pub type RowStream = Pin<Box<dyn Stream<Item = Result<Row>> + Send>>;

/// Stream the current snapshot. A table with no current snapshot yields
/// the empty stream.
pub async fn read_table(catalog: &FileSystemCatalog, table_name: &str) -> Result<RowStream> {
    read_impl(catalog, table_name, None).await
}

/// Stream a named snapshot.
pub async fn read_snapshot(
    catalog: &FileSystemCatalog,
    table_name: &str,
    snapshot_id: i64,
) -> Result<RowStream> {
    read_impl(catalog, table_name, Some(snapshot_id)).await
}

/// The committed snapshot chain, in commit order.
pub async fn snapshots(catalog: &FileSystemCatalog, table_name: &str) -> Result<Vec<Snapshot>> {
    let metadata = catalog
        .load_table(table_name)
        .await?
        .ok_or_else(|| Error::TableNotFound(table_name.to_string()))?;
    Ok(metadata.snapshots)
}

/// Current snapshot, if the table has data.
pub async fn current_snapshot(
    catalog: &FileSystemCatalog,
    table_name: &str,
) -> Result<Option<Snapshot>> {
    let metadata = catalog
        .load_table(table_name)
        .await?
        .ok_or_else(|| Error::TableNotFound(table_name.to_string()))?;
    Ok(metadata.current_snapshot().cloned())
}

/// Total record count of the current snapshot, from manifest statistics.
pub async fn row_count(catalog: &FileSystemCatalog, table_name: &str) -> Result<i64> {
    let metadata = catalog
        .load_table(table_name)
        .await?
        .ok_or_else(|| Error::TableNotFound(table_name.to_string()))?;
    let Some(snapshot) = metadata.current_snapshot() else {
        return Ok(0);
    };
    let files = collect_data_files(catalog, table_name, snapshot).await?;
    Ok(files.iter().map(|(_, count)| count).sum())
}

async fn read_impl(
    catalog: &FileSystemCatalog,
    table_name: &str,
    snapshot_id: Option<i64>,
) -> Result<RowStream> {
    let metadata = catalog
        .load_table(table_name)
        .await?
        .ok_or_else(|| Error::TableNotFound(table_name.to_string()))?;
    let schema = metadata
        .current_schema()
        .ok_or_else(|| {
            Error::SchemaMismatch(format!(
                "table `{table_name}` metadata has no schema {}",
                metadata.current_schema_id
            ))
        })?
        .clone();

    let snapshot = match snapshot_id {
        Some(id) => Some(
            metadata
                .snapshot_by_id(id)
                .ok_or_else(|| Error::SnapshotNotFound {
                    table: table_name.to_string(),
                    snapshot_id: id,
                })?,
        ),
        None => metadata.current_snapshot(),
    };
    let Some(snapshot) = snapshot else {
        return Ok(Box::pin(futures::stream::empty()));
    };

    let files = collect_data_files(catalog, table_name, snapshot).await?;
    Ok(stream_data_files(
        files.into_iter().map(|(path, _)| path).collect(),
        schema,
    ))
}

/// Absolute data-file paths of a snapshot with their record counts, in
/// manifest-list then manifest-entry order.
async fn collect_data_files(
    catalog: &FileSystemCatalog,
    table_name: &str,
    snapshot: &Snapshot,
) -> Result<Vec<(PathBuf, i64)>> {
    let list_bytes = catalog
        .read_table_file(table_name, &snapshot.manifest_list)
        .await?;
    let list_entries = manifest::read_manifest_list(&list_bytes)?;

    let mut files = Vec::new();
    for list_entry in &list_entries {
        let manifest_bytes = catalog
            .read_table_file(table_name, &list_entry.manifest_path)
            .await?;
        for entry in manifest::read_manifest(&manifest_bytes)? {
            if entry.status == STATUS_DELETED {
                continue;
            }
            let path = catalog.resolve(table_name, &entry.data_file.file_path)?;
            files.push((path, entry.data_file.record_count));
        }
    }
    Ok(files)
}

fn stream_data_files(files: Vec<PathBuf>, schema: TableSchema) -> RowStream {
    Box::pin(try_stream! {
        for path in files {
            let rows = stream_parquet_rows(path, schema.clone());
            futures::pin_mut!(rows);
            while let Some(row) = rows.next().await {
                yield row?;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::CellValue;
    use crate::schema::{LogicalType, SchemaField};
    use crate::storage::table_appender::append_rows;
    use crate::storage::table_writer::{write_table, TableWriteConfig};
    use futures::TryStreamExt;
    use tempfile::TempDir;

    fn test_schema() -> TableSchema {
        TableSchema::new(
            0,
            vec![
                SchemaField::required(1, "id", LogicalType::Int),
                SchemaField::optional(2, "note", LogicalType::String),
            ],
        )
        .unwrap()
    }

    fn make_rows(range: std::ops::Range<i32>) -> Vec<Row> {
        range
            .map(|i| {
                Row::new(vec![
                    CellValue::Int32(i),
                    CellValue::String(format!("row-{i}")),
                ])
            })
            .collect()
    }

    fn rows_stream(rows: Vec<Row>) -> impl Stream<Item = Result<Row>> {
        futures::stream::iter(rows.into_iter().map(Ok))
    }

    #[tokio::test]
    async fn test_missing_table_fails() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = FileSystemCatalog::new(temp_dir.path());
        assert!(matches!(
            read_table(&catalog, "missing").await,
            Err(Error::TableNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cumulative_reads_across_appends() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = FileSystemCatalog::new(temp_dir.path());
        let config = TableWriteConfig::default();

        let first_rows = make_rows(0..2);
        let second_rows = make_rows(2..6);
        let created = write_table(
            &catalog,
            "orders",
            &test_schema(),
            rows_stream(first_rows.clone()),
            &config,
        )
        .await
        .unwrap();
        let appended = append_rows(
            &catalog,
            "orders",
            None,
            rows_stream(second_rows.clone()),
            &config,
        )
        .await
        .unwrap();

        // Current snapshot reads as the concatenation of both batches.
        let all: Vec<Row> = read_table(&catalog, "orders")
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        let mut expected = first_rows.clone();
        expected.extend(second_rows);
        assert_eq!(all, expected);

        // The intermediate snapshot still reads as the first batch only.
        let first_again: Vec<Row> =
            read_snapshot(&catalog, "orders", created.snapshot_id)
                .await
                .unwrap()
                .try_collect()
                .await
                .unwrap();
        assert_eq!(first_again, first_rows);

        let second_again: Vec<Row> =
            read_snapshot(&catalog, "orders", appended.snapshot_id.unwrap())
                .await
                .unwrap()
                .try_collect()
                .await
                .unwrap();
        assert_eq!(second_again, expected);

        assert_eq!(row_count(&catalog, "orders").await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_unknown_snapshot_fails() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = FileSystemCatalog::new(temp_dir.path());
        write_table(
            &catalog,
            "orders",
            &test_schema(),
            rows_stream(make_rows(0..1)),
            &TableWriteConfig::default(),
        )
        .await
        .unwrap();
        let result = read_snapshot(&catalog, "orders", 42).await;
        assert!(matches!(result, Err(Error::SnapshotNotFound { .. })));
    }

    #[tokio::test]
    async fn test_multi_file_append_reads_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = FileSystemCatalog::new(temp_dir.path());
        let config = TableWriteConfig {
            max_records_per_file: Some(5),
            ..Default::default()
        };
        write_table(
            &catalog,
            "orders",
            &test_schema(),
            rows_stream(make_rows(0..3)),
            &config,
        )
        .await
        .unwrap();
        let appended = append_rows(
            &catalog,
            "orders",
            None,
            rows_stream(make_rows(3..15)),
            &config,
        )
        .await
        .unwrap();
        // 12 appended rows split at 5 rows per file.
        assert_eq!(appended.files_written, 3);

        let all: Vec<Row> = read_table(&catalog, "orders")
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(all, make_rows(0..15));
    }
}
