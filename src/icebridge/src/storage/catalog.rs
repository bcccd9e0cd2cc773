//! Filesystem catalog: owns the on-disk layout, resolves table paths, and
//! performs atomic version commits.
//!
//! The rename of `version-hint.txt` is the linearisation point of a commit.
//! Everything else under the table directory is write-once.

use crate::error::{Error, Result};
use crate::storage::metadata::TableMetadata;
use crate::storage::paths;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct FileSystemCatalog {
    warehouse: PathBuf,
}

impl FileSystemCatalog {
    pub fn new(warehouse: impl Into<PathBuf>) -> Self {
        Self {
            warehouse: warehouse.into(),
        }
    }

    pub fn warehouse_path(&self) -> &Path {
        &self.warehouse
    }

    /// Root directory of a table, after validating the name is path-safe.
    pub fn table_path(&self, table_name: &str) -> Result<PathBuf> {
        validate_table_name(table_name)?;
        Ok(self.warehouse.join(table_name))
    }

    /// Absolute path for a table-root-relative path from a metadata file.
    pub fn resolve(&self, table_name: &str, relative: &str) -> Result<PathBuf> {
        if Path::new(relative).is_absolute() || relative.contains("..") {
            return Err(Error::Configuration(format!(
                "refusing non-relative metadata path `{relative}`"
            )));
        }
        Ok(self.table_path(table_name)?.join(relative))
    }

    /// Idempotent creation of the `data/` and `metadata/` directories.
    pub async fn initialize_table(&self, table_name: &str) -> Result<PathBuf> {
        let table_path = self.table_path(table_name)?;
        tokio::fs::create_dir_all(table_path.join(paths::DATA_DIR)).await?;
        tokio::fs::create_dir_all(table_path.join(paths::METADATA_DIR)).await?;
        Ok(table_path)
    }

    pub async fn table_exists(&self, table_name: &str) -> Result<bool> {
        let hint = self.version_hint_path(table_name)?;
        Ok(tokio::fs::try_exists(hint).await?)
    }

    /// Currently committed version, or `None` for an uncommitted table.
    pub async fn current_version(&self, table_name: &str) -> Result<Option<u64>> {
        let hint = self.version_hint_path(table_name)?;
        let raw = match tokio::fs::read_to_string(&hint).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let version = raw.trim().parse::<u64>().map_err(|_| {
            Error::Configuration(format!(
                "corrupt version hint for table `{table_name}`: {raw:?}"
            ))
        })?;
        Ok(Some(version))
    }

    pub async fn next_version(&self, table_name: &str) -> Result<u64> {
        Ok(self.current_version(table_name).await?.unwrap_or(0) + 1)
    }

    /// Load the current metadata document, or `None` if never committed.
    pub async fn load_table(&self, table_name: &str) -> Result<Option<TableMetadata>> {
        let Some(version) = self.current_version(table_name).await? else {
            return Ok(None);
        };
        let path = self
            .metadata_dir(table_name)?
            .join(paths::metadata_file_name(version));
        let bytes = tokio::fs::read(&path).await?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Stage `v{version}.metadata.json` durably (temp file, fsync, rename).
    /// Readers cannot observe it until `publish_version` moves the hint.
    pub async fn write_metadata_version(
        &self,
        table_name: &str,
        version: u64,
        metadata: &TableMetadata,
    ) -> Result<PathBuf> {
        let metadata_dir = self.metadata_dir(table_name)?;
        let final_path = metadata_dir.join(paths::metadata_file_name(version));
        let tmp_path = metadata_dir.join(format!("{}.tmp", paths::metadata_file_name(version)));
        let json = serde_json::to_vec_pretty(metadata)?;

        let mut file = tokio::fs::File::create(&tmp_path).await?;
        file.write_all(&json).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp_path, &final_path).await?;
        Ok(final_path)
    }

    /// Atomically commit a new metadata version.
    ///
    /// `expected_version` is what the caller last observed (`None` for a
    /// fresh table); any other hint value means another writer got there
    /// first and the commit fails with `CommitConflict`.
    pub async fn commit(
        &self,
        table_name: &str,
        metadata: &TableMetadata,
        expected_version: Option<u64>,
    ) -> Result<u64> {
        self.check_version(table_name, expected_version).await?;

        let version = expected_version.unwrap_or(0) + 1;
        self.write_metadata_version(table_name, version, metadata)
            .await?;

        // Re-check immediately before publishing so a racing writer is
        // detected while the new version is still invisible.
        self.check_version(table_name, expected_version).await?;
        self.publish_version(table_name, version).await?;
        debug!(table_name, version, "committed metadata version");
        Ok(version)
    }

    /// Point `version-hint.txt` at `version` via temp file + rename.
    async fn publish_version(&self, table_name: &str, version: u64) -> Result<()> {
        let metadata_dir = self.metadata_dir(table_name)?;
        let tmp_path = metadata_dir.join(format!("{}.tmp", paths::VERSION_HINT_FILE));
        let hint_path = metadata_dir.join(paths::VERSION_HINT_FILE);

        let mut file = tokio::fs::File::create(&tmp_path).await?;
        file.write_all(version.to_string().as_bytes()).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp_path, &hint_path).await?;
        Ok(())
    }

    /// Durably write a table-root-relative file (manifests, manifest lists)
    /// and return its length in bytes.
    pub(crate) async fn write_table_file(
        &self,
        table_name: &str,
        relative: &str,
        bytes: &[u8],
    ) -> Result<i64> {
        let path = self.resolve(table_name, relative)?;
        let mut file = tokio::fs::File::create(&path).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        Ok(bytes.len() as i64)
    }

    /// Read a table-root-relative file written by `write_table_file`.
    pub(crate) async fn read_table_file(&self, table_name: &str, relative: &str) -> Result<Vec<u8>> {
        let path = self.resolve(table_name, relative)?;
        Ok(tokio::fs::read(&path).await?)
    }

    async fn check_version(&self, table_name: &str, expected: Option<u64>) -> Result<()> {
        let found = self.current_version(table_name).await?;
        if found != expected {
            return Err(Error::CommitConflict {
                table: table_name.to_string(),
                expected: expected.unwrap_or(0),
                found: found.unwrap_or(0),
            });
        }
        Ok(())
    }

    fn metadata_dir(&self, table_name: &str) -> Result<PathBuf> {
        Ok(self.table_path(table_name)?.join(paths::METADATA_DIR))
    }

    fn version_hint_path(&self, table_name: &str) -> Result<PathBuf> {
        Ok(self.metadata_dir(table_name)?.join(paths::VERSION_HINT_FILE))
    }
}

fn validate_table_name(table_name: &str) -> Result<()> {
    let mut chars = table_name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if !valid || table_name.len() > 128 {
        return Err(Error::Configuration(format!(
            "invalid table name `{table_name}`"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{LogicalType, SchemaField, TableSchema};
    use crate::storage::metadata::{create_initial, SnapshotInput};
    use tempfile::TempDir;

    fn sample_metadata(location: &str) -> TableMetadata {
        let schema = TableSchema::new(
            0,
            vec![SchemaField::required(1, "id", LogicalType::Long)],
        )
        .unwrap();
        create_initial(
            &schema,
            "uuid-1".to_string(),
            location.to_string(),
            &SnapshotInput {
                snapshot_id: 100,
                manifest_list: "metadata/snap-a.avro".to_string(),
                added_data_files: 1,
                added_records: 1,
                timestamp_ms: 1_700_000_000_000,
            },
        )
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = FileSystemCatalog::new(temp_dir.path());
        let first = catalog.initialize_table("orders").await.unwrap();
        let second = catalog.initialize_table("orders").await.unwrap();
        assert_eq!(first, second);
        assert!(first.join("data").is_dir());
        assert!(first.join("metadata").is_dir());
        assert!(!catalog.table_exists("orders").await.unwrap());
    }

    #[tokio::test]
    async fn test_commit_and_load_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = FileSystemCatalog::new(temp_dir.path());
        catalog.initialize_table("orders").await.unwrap();
        let metadata = sample_metadata(temp_dir.path().join("orders").to_str().unwrap());

        assert!(catalog.load_table("orders").await.unwrap().is_none());
        let version = catalog.commit("orders", &metadata, None).await.unwrap();
        assert_eq!(version, 1);
        assert!(catalog.table_exists("orders").await.unwrap());
        assert_eq!(catalog.current_version("orders").await.unwrap(), Some(1));
        assert_eq!(catalog.next_version("orders").await.unwrap(), 2);

        let loaded = catalog.load_table("orders").await.unwrap().unwrap();
        assert_eq!(loaded, metadata);
    }

    #[tokio::test]
    async fn test_commit_conflict_detected() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = FileSystemCatalog::new(temp_dir.path());
        catalog.initialize_table("orders").await.unwrap();
        let metadata = sample_metadata("loc");
        catalog.commit("orders", &metadata, None).await.unwrap();

        // A writer that still believes the table is uncommitted must fail.
        let result = catalog.commit("orders", &metadata, None).await;
        assert!(matches!(result, Err(Error::CommitConflict { .. })));

        // And one that saw version 1 succeeds.
        let version = catalog.commit("orders", &metadata, Some(1)).await.unwrap();
        assert_eq!(version, 2);
    }

    #[tokio::test]
    async fn test_staged_version_is_invisible_until_published() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = FileSystemCatalog::new(temp_dir.path());
        catalog.initialize_table("orders").await.unwrap();
        let metadata = sample_metadata("loc");
        catalog.commit("orders", &metadata, None).await.unwrap();

        // Simulated crash: v2 staged but the hint never moved.
        catalog
            .write_metadata_version("orders", 2, &metadata)
            .await
            .unwrap();
        assert_eq!(catalog.current_version("orders").await.unwrap(), Some(1));
        let table_path = catalog.table_path("orders").unwrap();
        assert!(table_path.join("metadata/v2.metadata.json").exists());
        // Readers still resolve version 1.
        assert!(catalog.load_table("orders").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = FileSystemCatalog::new(temp_dir.path());
        assert!(catalog.table_path("../evil").is_err());
        assert!(catalog.table_path("ok_name").is_ok());
        assert!(catalog.resolve("ok_name", "/etc/passwd").is_err());
        assert!(catalog.resolve("ok_name", "data/../../x").is_err());
        assert!(catalog.resolve("ok_name", "data/a.parquet").is_ok());
    }
}
