//! Append a new snapshot so the table reads as the union of all rows
//! ever appended.
//!
//! The new manifest list carries forward every entry of the parent
//! snapshot's manifest list plus exactly one entry for the new manifest.
//! Emitting a delta-only manifest list would make readers see the table
//! truncate to the latest append.

use crate::error::{Error, Result};
use crate::row::Row;
use crate::schema::TableSchema;
use crate::storage::catalog::FileSystemCatalog;
use crate::storage::manifest::{self, ManifestListEntry};
use crate::storage::metadata::{self, SnapshotInput};
use crate::storage::table_writer::{write_data_files, write_manifest_and_list, TableWriteConfig};
use futures::Stream;
use tracing::info;

/// Summary of one append. `snapshot_id` is the previous snapshot when the
/// input was empty and no new snapshot was created.
#[derive(Debug, Clone)]
pub struct AppendResult {
    pub snapshot_id: Option<i64>,
    pub version: u64,
    pub rows_appended: i64,
    pub files_written: usize,
    pub created_snapshot: bool,
}

/// Append a batch of rows to an existing table as exactly one new snapshot.
///
/// When `declared_schema` is given it must structurally match the table's
/// current schema; schema drift fails with `SchemaMismatch`. Empty input is
/// a successful no-op.
pub async fn append_rows<S>(
    catalog: &FileSystemCatalog,
    table_name: &str,
    declared_schema: Option<&TableSchema>,
    rows: S,
    config: &TableWriteConfig,
) -> Result<AppendResult>
where
    S: Stream<Item = Result<Row>>,
{
    let current_version = catalog
        .current_version(table_name)
        .await?
        .ok_or_else(|| Error::TableNotFound(table_name.to_string()))?;
    let table_metadata = catalog
        .load_table(table_name)
        .await?
        .ok_or_else(|| Error::TableNotFound(table_name.to_string()))?;
    let schema = table_metadata
        .current_schema()
        .ok_or_else(|| {
            Error::SchemaMismatch(format!(
                "table `{table_name}` metadata has no schema {}",
                table_metadata.current_schema_id
            ))
        })?
        .clone();
    if let Some(declared) = declared_schema {
        schema.ensure_matches(declared)?;
    }

    let data_files = write_data_files(catalog, table_name, &schema, rows, config).await?;
    if data_files.is_empty() {
        return Ok(AppendResult {
            snapshot_id: table_metadata.current_snapshot_id,
            version: current_version,
            rows_appended: 0,
            files_written: 0,
            created_snapshot: false,
        });
    }

    let now_ms = chrono::Utc::now().timestamp_millis();
    let snapshot_id = metadata::allocate_snapshot_id(Some(&table_metadata), now_ms);

    // Cumulative manifests: every manifest of the parent plus the new one.
    let carried: Vec<ManifestListEntry> = match table_metadata.current_snapshot() {
        Some(snapshot) => {
            let bytes = catalog
                .read_table_file(table_name, &snapshot.manifest_list)
                .await?;
            manifest::read_manifest_list(&bytes)?
        }
        None => vec![],
    };
    let manifest_list_path =
        write_manifest_and_list(catalog, table_name, snapshot_id, &data_files, &carried).await?;

    let rows_appended: i64 = data_files.iter().map(|f| f.record_count).sum();
    let appended_metadata = metadata::append_snapshot(
        &table_metadata,
        &SnapshotInput {
            snapshot_id,
            manifest_list: manifest_list_path,
            added_data_files: data_files.len() as i64,
            added_records: rows_appended,
            timestamp_ms: now_ms,
        },
    );
    let version = catalog
        .commit(table_name, &appended_metadata, Some(current_version))
        .await?;
    info!(
        table_name,
        snapshot_id,
        version,
        rows_appended,
        files = data_files.len(),
        "appended table snapshot"
    );
    Ok(AppendResult {
        snapshot_id: Some(snapshot_id),
        version,
        rows_appended,
        files_written: data_files.len(),
        created_snapshot: true,
    })
}
