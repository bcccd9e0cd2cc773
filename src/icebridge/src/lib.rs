pub mod error;
pub mod row;
pub mod schema;
mod storage;
pub mod type_mapper;

pub use error::*;
pub use row::{CellValue, Row};
pub use schema::{LogicalType, SchemaField, TableSchema};
pub use storage::catalog::FileSystemCatalog;
pub use storage::maintenance::find_orphan_files;
pub use storage::manifest::{DataFile, ManifestEntry, ManifestListEntry};
pub use storage::metadata::{Snapshot, TableMetadata};
pub use storage::parquet_writer::ParquetWriterConfig;
pub use storage::table_appender::{append_rows, AppendResult};
pub use storage::table_reader::{
    current_snapshot, read_snapshot, read_table, row_count, snapshots, RowStream,
};
pub use storage::table_writer::{write_table, TableWriteConfig, TableWriteResult};
