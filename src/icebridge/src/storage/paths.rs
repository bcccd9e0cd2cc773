//! On-disk naming for the per-table layout:
//!
//! ```text
//! {warehouse}/{table_name}/
//!     data/<uuid>.parquet
//!     metadata/<uuid>.avro
//!     metadata/snap-<uuid>.avro
//!     metadata/v{N}.metadata.json
//!     metadata/version-hint.txt
//! ```

use uuid::Uuid;

pub(crate) const DATA_DIR: &str = "data";
pub(crate) const METADATA_DIR: &str = "metadata";
pub(crate) const VERSION_HINT_FILE: &str = "version-hint.txt";

/// Relative path of a fresh Parquet data file.
pub(crate) fn new_data_file_path() -> String {
    format!("{DATA_DIR}/{}.parquet", Uuid::new_v4())
}

/// Relative path of a fresh manifest file.
pub(crate) fn new_manifest_path() -> String {
    format!("{METADATA_DIR}/{}.avro", Uuid::new_v4())
}

/// Relative path of a fresh manifest-list file.
pub(crate) fn new_manifest_list_path() -> String {
    format!("{METADATA_DIR}/snap-{}.avro", Uuid::new_v4())
}

pub(crate) fn metadata_file_name(version: u64) -> String {
    format!("v{version}.metadata.json")
}
