//! Read-only maintenance helpers.
//!
//! A failed write can leave orphan files under `data/` and `metadata/`;
//! they are invisible to readers because only the metadata commit publishes
//! files. The audit reports them; deleting is the caller's decision.

use crate::error::Result;
use crate::storage::catalog::FileSystemCatalog;
use crate::storage::manifest;
use crate::storage::metadata::TableMetadata;
use crate::storage::paths;
use std::collections::HashSet;
use std::path::PathBuf;

/// Files under the table directory not reachable from any committed
/// metadata version.
pub async fn find_orphan_files(
    catalog: &FileSystemCatalog,
    table_name: &str,
) -> Result<Vec<PathBuf>> {
    let table_path = catalog.table_path(table_name)?;
    let metadata_dir = table_path.join(paths::METADATA_DIR);

    let mut reachable: HashSet<PathBuf> = HashSet::new();
    reachable.insert(metadata_dir.join(paths::VERSION_HINT_FILE));

    // Every committed metadata version keeps its referenced files live.
    let mut dir = tokio::fs::read_dir(&metadata_dir).await?;
    let mut version_files = Vec::new();
    while let Some(entry) = dir.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('v') && name.ends_with(".metadata.json") {
            version_files.push(entry.path());
        }
    }
    for version_file in &version_files {
        reachable.insert(version_file.clone());
        let bytes = tokio::fs::read(version_file).await?;
        let metadata: TableMetadata = serde_json::from_slice(&bytes)?;
        collect_reachable(catalog, table_name, &metadata, &mut reachable).await?;
    }

    let mut orphans = Vec::new();
    for dir_name in [paths::DATA_DIR, paths::METADATA_DIR] {
        let mut dir = tokio::fs::read_dir(table_path.join(dir_name)).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if !reachable.contains(&path) {
                orphans.push(path);
            }
        }
    }
    orphans.sort();
    Ok(orphans)
}

async fn collect_reachable(
    catalog: &FileSystemCatalog,
    table_name: &str,
    metadata: &TableMetadata,
    reachable: &mut HashSet<PathBuf>,
) -> Result<()> {
    for snapshot in &metadata.snapshots {
        reachable.insert(catalog.resolve(table_name, &snapshot.manifest_list)?);
        let list_bytes = catalog
            .read_table_file(table_name, &snapshot.manifest_list)
            .await?;
        for list_entry in manifest::read_manifest_list(&list_bytes)? {
            reachable.insert(catalog.resolve(table_name, &list_entry.manifest_path)?);
            let manifest_bytes = catalog
                .read_table_file(table_name, &list_entry.manifest_path)
                .await?;
            for entry in manifest::read_manifest(&manifest_bytes)? {
                reachable.insert(catalog.resolve(table_name, &entry.data_file.file_path)?);
            }
        }
    }
    Ok(())
}
