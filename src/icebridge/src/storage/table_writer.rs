//! End-to-end initial table write: data files, manifest, manifest list,
//! metadata, commit.
//!
//! Used for a table's first snapshot, or for a full replacement; a
//! replacement commits the next metadata version with a fresh snapshot
//! chain, leaving older versions readable on disk.

use crate::error::{Error, Result};
use crate::row::Row;
use crate::schema::TableSchema;
use crate::storage::catalog::FileSystemCatalog;
use crate::storage::manifest::{self, DataFile, ManifestEntry, ManifestListEntry};
use crate::storage::metadata::{self, SnapshotInput, UNPARTITIONED_SPEC_ID};
use crate::storage::parquet_writer::{ParquetRowWriter, ParquetWriterConfig};
use crate::storage::paths;
use futures::{pin_mut, Stream, StreamExt};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct TableWriteConfig {
    /// Split output into multiple data files at this row boundary.
    pub max_records_per_file: Option<usize>,
    pub parquet: ParquetWriterConfig,
}

/// Summary of one committed write or append.
#[derive(Debug, Clone)]
pub struct TableWriteResult {
    pub snapshot_id: i64,
    pub version: u64,
    pub rows_written: i64,
    pub files_written: usize,
}

/// Write a new table from a row stream and commit its first snapshot.
///
/// Fails with `EmptyInput` rather than creating a zero-row table.
pub async fn write_table<S>(
    catalog: &FileSystemCatalog,
    table_name: &str,
    schema: &TableSchema,
    rows: S,
    config: &TableWriteConfig,
) -> Result<TableWriteResult>
where
    S: Stream<Item = Result<Row>>,
{
    let table_path = catalog.initialize_table(table_name).await?;
    let expected_version = catalog.current_version(table_name).await?;

    let data_files = write_data_files(catalog, table_name, schema, rows, config).await?;
    if data_files.is_empty() {
        return Err(Error::EmptyInput);
    }

    let now_ms = chrono::Utc::now().timestamp_millis();
    let snapshot_id = metadata::allocate_snapshot_id(None, now_ms);

    let manifest_list_path =
        write_manifest_and_list(catalog, table_name, snapshot_id, &data_files, &[]).await?;

    let rows_written: i64 = data_files.iter().map(|f| f.record_count).sum();
    let table_metadata = metadata::create_initial(
        schema,
        Uuid::new_v4().to_string(),
        table_path.to_string_lossy().into_owned(),
        &SnapshotInput {
            snapshot_id,
            manifest_list: manifest_list_path,
            added_data_files: data_files.len() as i64,
            added_records: rows_written,
            timestamp_ms: now_ms,
        },
    );
    let version = catalog
        .commit(table_name, &table_metadata, expected_version)
        .await?;
    info!(
        table_name,
        snapshot_id,
        version,
        rows_written,
        files = data_files.len(),
        "created table snapshot"
    );
    Ok(TableWriteResult {
        snapshot_id,
        version,
        rows_written,
        files_written: data_files.len(),
    })
}

/// Drain a row stream into one or more Parquet files under `data/`,
/// splitting at the configured `max_records_per_file` boundary.
pub(crate) async fn write_data_files<S>(
    catalog: &FileSystemCatalog,
    table_name: &str,
    schema: &TableSchema,
    rows: S,
    config: &TableWriteConfig,
) -> Result<Vec<DataFile>>
where
    S: Stream<Item = Result<Row>>,
{
    pin_mut!(rows);
    let mut data_files = Vec::new();
    let mut current: Option<(String, ParquetRowWriter)> = None;
    let max_records = config
        .max_records_per_file
        .map(|limit| limit.max(1) as i64)
        .unwrap_or(i64::MAX);

    while let Some(row) = rows.next().await {
        let row = row?;
        if current.is_none() {
            let relative = paths::new_data_file_path();
            let absolute = catalog.resolve(table_name, &relative)?;
            let writer =
                ParquetRowWriter::create(&absolute, schema, config.parquet.clone()).await?;
            current = Some((relative, writer));
        }
        let (_, writer) = current.as_mut().unwrap();
        writer.append(&row).await?;
        if writer.rows_written() >= max_records {
            let (relative, writer) = current.take().unwrap();
            let closed = writer.close().await?;
            data_files.push(DataFile::parquet(
                relative,
                closed.record_count,
                closed.file_size_in_bytes,
            ));
        }
    }

    if let Some((relative, writer)) = current.take() {
        let closed = writer.close().await?;
        data_files.push(DataFile::parquet(
            relative,
            closed.record_count,
            closed.file_size_in_bytes,
        ));
    }
    Ok(data_files)
}

/// Write one manifest for `new_files`, then a manifest list containing
/// `carried` entries (from the parent snapshot) plus the new manifest.
pub(crate) async fn write_manifest_and_list(
    catalog: &FileSystemCatalog,
    table_name: &str,
    snapshot_id: i64,
    new_files: &[DataFile],
    carried: &[ManifestListEntry],
) -> Result<String> {
    let manifest_entries: Vec<ManifestEntry> = new_files
        .iter()
        .map(|file| ManifestEntry::added(snapshot_id, file.clone()))
        .collect();
    let manifest_bytes = manifest::write_manifest(&manifest_entries)?;
    let manifest_path = paths::new_manifest_path();
    let manifest_length = catalog
        .write_table_file(table_name, &manifest_path, &manifest_bytes)
        .await?;

    let mut list_entries = carried.to_vec();
    list_entries.push(ManifestListEntry {
        manifest_path,
        manifest_length,
        partition_spec_id: UNPARTITIONED_SPEC_ID,
        added_files_count: new_files.len() as i32,
    });
    let list_bytes = manifest::write_manifest_list(&list_entries)?;
    let manifest_list_path = paths::new_manifest_list_path();
    catalog
        .write_table_file(table_name, &manifest_list_path, &list_bytes)
        .await?;
    Ok(manifest_list_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::CellValue;
    use crate::schema::{LogicalType, SchemaField};
    use futures::stream;
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

    fn rows(count: i32) -> impl Stream<Item = Result<Row>> {
        stream::iter((0..count).map(|i| {
            Ok(Row::new(vec![
                CellValue::Int32(i),
                CellValue::String(format!("row-{i}")),
            ]))
        }))
    }

    #[tokio::test]
    async fn test_first_write_commits_version_one() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = FileSystemCatalog::new(temp_dir.path());
        let result = write_table(
            &catalog,
            "orders",
            &test_schema(),
            rows(3),
            &TableWriteConfig::default(),
        )
        .await
        .unwrap();
        assert_eq!(result.version, 1);
        assert_eq!(result.rows_written, 3);
        assert_eq!(result.files_written, 1);

        let metadata = catalog.load_table("orders").await.unwrap().unwrap();
        assert_eq!(metadata.current_snapshot_id, Some(result.snapshot_id));
        let snapshot = metadata.current_snapshot().unwrap();
        assert_eq!(snapshot.sequence_number, 1);
        assert_eq!(snapshot.summary["added-records"], "3");

        // The manifest list and manifest resolve and agree with the result.
        let list_bytes = catalog
            .read_table_file("orders", &snapshot.manifest_list)
            .await
            .unwrap();
        let list = manifest::read_manifest_list(&list_bytes).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].added_files_count, 1);
        let manifest_bytes = catalog
            .read_table_file("orders", &list[0].manifest_path)
            .await
            .unwrap();
        let entries = manifest::read_manifest(&manifest_bytes).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].snapshot_id, Some(result.snapshot_id));
        assert_eq!(entries[0].data_file.record_count, 3);
    }

    #[tokio::test]
    async fn test_empty_input_is_refused() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = FileSystemCatalog::new(temp_dir.path());
        let result = write_table(
            &catalog,
            "orders",
            &test_schema(),
            rows(0),
            &TableWriteConfig::default(),
        )
        .await;
        assert!(matches!(result, Err(Error::EmptyInput)));
        // No version was published.
        assert!(!catalog.table_exists("orders").await.unwrap());
    }

    #[tokio::test]
    async fn test_max_records_per_file_splits_output() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = FileSystemCatalog::new(temp_dir.path());
        let config = TableWriteConfig {
            max_records_per_file: Some(5),
            parquet: ParquetWriterConfig::default(),
        };
        let result = write_table(&catalog, "orders", &test_schema(), rows(12), &config)
            .await
            .unwrap();
        assert_eq!(result.files_written, 3);
        assert_eq!(result.rows_written, 12);
    }

    #[tokio::test]
    async fn test_rewrite_commits_fresh_chain_at_next_version() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = FileSystemCatalog::new(temp_dir.path());
        let config = TableWriteConfig::default();
        let first = write_table(&catalog, "orders", &test_schema(), rows(2), &config)
            .await
            .unwrap();
        let second = write_table(&catalog, "orders", &test_schema(), rows(4), &config)
            .await
            .unwrap();
        assert_eq!(first.version, 1);
        assert_eq!(second.version, 2);

        let metadata = catalog.load_table("orders").await.unwrap().unwrap();
        // Replacement restarts the chain.
        assert_eq!(metadata.snapshots.len(), 1);
        assert_eq!(metadata.current_snapshot().unwrap().sequence_number, 1);
    }
}
