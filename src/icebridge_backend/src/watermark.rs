//! Durable per-table sync progress, one JSON file per table under the
//! watermark directory (default `{warehouse}/.watermarks/`).
//!
//! Writes go through temp-file-then-rename so a reader never observes a
//! torn record. A missing file reads as `None`, never as an error.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Directory under the warehouse used when no explicit directory is given.
pub const DEFAULT_WATERMARK_SUBDIR: &str = ".watermarks";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Watermark {
    pub table_name: String,
    /// Wall-clock time extraction began for the last successful run.
    pub last_sync_timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_id: Option<i64>,
    pub last_iceberg_snapshot: i64,
    /// Rows synced in the last run.
    pub row_count: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct WatermarkStore {
    dir: PathBuf,
}

impl WatermarkStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn for_warehouse(warehouse: &Path) -> Self {
        Self::new(warehouse.join(DEFAULT_WATERMARK_SUBDIR))
    }

    fn file_path(&self, table_name: &str) -> PathBuf {
        self.dir.join(format!("{table_name}.json"))
    }

    /// Read a table's watermark; a missing record is `None`.
    pub async fn get(&self, table_name: &str) -> Result<Option<Watermark>> {
        let path = self.file_path(table_name);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(icebridge::Error::from(e).into()),
        };
        Ok(Some(
            serde_json::from_slice(&bytes).map_err(icebridge::Error::from)?,
        ))
    }

    /// Overwrite a table's watermark atomically.
    pub async fn set(&self, watermark: &Watermark) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(icebridge::Error::from)?;
        let path = self.file_path(&watermark.table_name);
        let tmp_path = self.dir.join(format!("{}.json.tmp", watermark.table_name));
        let json =
            serde_json::to_vec_pretty(watermark).map_err(icebridge::Error::from)?;

        let write = async {
            let mut file = tokio::fs::File::create(&tmp_path).await?;
            file.write_all(&json).await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&tmp_path, &path).await
        };
        write.await.map_err(icebridge::Error::from)?;
        Ok(())
    }

    /// All recorded watermarks, for operational visibility.
    pub async fn list(&self) -> Result<Vec<Watermark>> {
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(icebridge::Error::from(e).into()),
        };
        let mut watermarks = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(icebridge::Error::from)? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(table_name) = name.strip_suffix(".json") {
                if let Some(watermark) = self.get(table_name).await? {
                    watermarks.push(watermark);
                }
            }
        }
        watermarks.sort_by(|a, b| a.table_name.cmp(&b.table_name));
        Ok(watermarks)
    }
}
