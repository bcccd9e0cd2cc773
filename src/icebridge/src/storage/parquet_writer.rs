//! Parquet data-file writer.
//!
//! Buffers rows into per-column arrow builders and emits a row group when
//! either the row or byte threshold is reached. Every column carries its
//! Iceberg field id in the arrow field metadata, which the parquet writer
//! persists into the column metadata of the file.

use crate::error::Result;
use crate::row::{ColumnArrayBuilder, Row};
use crate::schema::TableSchema;
use crate::type_mapper::schema_to_arrow;
use arrow::record_batch::RecordBatch;
use arrow_schema::Schema as ArrowSchema;
use parquet::arrow::AsyncArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default row-group boundary: rows.
pub const DEFAULT_ROW_GROUP_ROWS: usize = 1_048_576;
/// Default row-group boundary: accumulated bytes.
pub const DEFAULT_ROW_GROUP_BYTES: usize = 128 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ParquetWriterConfig {
    pub row_group_rows: usize,
    pub row_group_bytes: usize,
}

impl Default for ParquetWriterConfig {
    fn default() -> Self {
        Self {
            row_group_rows: DEFAULT_ROW_GROUP_ROWS,
            row_group_bytes: DEFAULT_ROW_GROUP_BYTES,
        }
    }
}

fn default_writer_properties(row_group_rows: usize) -> WriterProperties {
    WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_dictionary_enabled(true)
        .set_max_row_group_size(row_group_rows)
        .build()
}

/// Result of closing one data file.
#[derive(Debug, Clone)]
pub struct ClosedDataFile {
    pub record_count: i64,
    pub file_size_in_bytes: i64,
}

pub struct ParquetRowWriter {
    schema: TableSchema,
    arrow_schema: Arc<ArrowSchema>,
    builders: Vec<ColumnArrayBuilder>,
    writer: AsyncArrowWriter<tokio::fs::File>,
    path: PathBuf,
    config: ParquetWriterConfig,
    buffered_rows: usize,
    buffered_bytes: usize,
    rows_written: i64,
}

impl ParquetRowWriter {
    pub async fn create(
        path: &Path,
        schema: &TableSchema,
        config: ParquetWriterConfig,
    ) -> Result<Self> {
        let arrow_schema = schema_to_arrow(schema);
        let file = tokio::fs::File::create(path).await?;
        let properties = default_writer_properties(config.row_group_rows);
        let writer = AsyncArrowWriter::try_new(file, arrow_schema.clone(), Some(properties))?;
        let builders = new_builders(&arrow_schema, &config);
        Ok(Self {
            schema: schema.clone(),
            arrow_schema,
            builders,
            writer,
            path: path.to_path_buf(),
            config,
            buffered_rows: 0,
            buffered_bytes: 0,
            rows_written: 0,
        })
    }

    /// Buffer one validated row; flushes a row group when a threshold trips.
    pub async fn append(&mut self, row: &Row) -> Result<()> {
        row.validate(&self.schema)?;
        for (builder, value) in self.builders.iter_mut().zip(row.values.iter()) {
            builder.append_value(value)?;
            self.buffered_bytes += value.estimated_size();
        }
        self.buffered_rows += 1;
        if self.buffered_rows >= self.config.row_group_rows
            || self.buffered_bytes >= self.config.row_group_bytes
        {
            self.flush_row_group().await?;
        }
        Ok(())
    }

    pub fn rows_written(&self) -> i64 {
        self.rows_written + self.buffered_rows as i64
    }

    async fn flush_row_group(&mut self) -> Result<()> {
        if self.buffered_rows == 0 {
            return Ok(());
        }
        let arrays = self
            .builders
            .iter_mut()
            .map(|builder| builder.finish())
            .collect::<Vec<_>>();
        let batch = RecordBatch::try_new(self.arrow_schema.clone(), arrays)?;
        self.writer.write(&batch).await?;
        self.rows_written += self.buffered_rows as i64;
        self.buffered_rows = 0;
        self.buffered_bytes = 0;
        Ok(())
    }

    /// Flush remaining rows, finalize the footer, and report file stats.
    pub async fn close(mut self) -> Result<ClosedDataFile> {
        self.flush_row_group().await?;
        self.writer.close().await?;
        let file_size_in_bytes = tokio::fs::metadata(&self.path).await?.len() as i64;
        Ok(ClosedDataFile {
            record_count: self.rows_written,
            file_size_in_bytes,
        })
    }
}

fn new_builders(arrow_schema: &ArrowSchema, config: &ParquetWriterConfig) -> Vec<ColumnArrayBuilder> {
    let capacity = config.row_group_rows.min(8192);
    arrow_schema
        .fields()
        .iter()
        .map(|field| ColumnArrayBuilder::new(field.data_type(), capacity))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::row::CellValue;
    use crate::schema::{LogicalType, SchemaField};
    use arrow::array::Array;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
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

    #[tokio::test]
    async fn test_write_and_inspect_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out.parquet");
        let mut writer =
            ParquetRowWriter::create(&path, &test_schema(), ParquetWriterConfig::default())
                .await
                .unwrap();
        writer
            .append(&Row::new(vec![
                CellValue::Int32(1),
                CellValue::String("a".to_string()),
            ]))
            .await
            .unwrap();
        writer
            .append(&Row::new(vec![CellValue::Int32(2), CellValue::Null]))
            .await
            .unwrap();
        let closed = writer.close().await.unwrap();
        assert_eq!(closed.record_count, 2);
        assert!(closed.file_size_in_bytes > 0);

        // The file round-trips through a plain arrow reader and keeps the
        // field-id metadata on every column.
        let file = std::fs::File::open(&path).unwrap();
        let builder = ParquetRecordBatchReaderBuilder::try_new(file).unwrap();
        let schema = builder.schema().clone();
        assert_eq!(
            schema.field(0).metadata().get("PARQUET:field_id").unwrap(),
            "1"
        );
        assert_eq!(
            schema.field(1).metadata().get("PARQUET:field_id").unwrap(),
            "2"
        );
        let mut reader = builder.build().unwrap();
        let batch = reader.next().unwrap().unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert!(batch.column(1).is_null(1));
    }

    #[tokio::test]
    async fn test_required_null_fails_write() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out.parquet");
        let mut writer =
            ParquetRowWriter::create(&path, &test_schema(), ParquetWriterConfig::default())
                .await
                .unwrap();
        let result = writer
            .append(&Row::new(vec![CellValue::Null, CellValue::Null]))
            .await;
        assert!(matches!(result, Err(Error::InvalidRow(_))));
    }

    #[tokio::test]
    async fn test_row_group_boundary_by_rows() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out.parquet");
        let config = ParquetWriterConfig {
            row_group_rows: 4,
            row_group_bytes: usize::MAX,
        };
        let mut writer = ParquetRowWriter::create(&path, &test_schema(), config)
            .await
            .unwrap();
        for i in 0..10 {
            writer
                .append(&Row::new(vec![CellValue::Int32(i), CellValue::Null]))
                .await
                .unwrap();
        }
        let closed = writer.close().await.unwrap();
        assert_eq!(closed.record_count, 10);

        let file = std::fs::File::open(&path).unwrap();
        let builder = ParquetRecordBatchReaderBuilder::try_new(file).unwrap();
        // 4 + 4 + 2 rows.
        assert_eq!(builder.metadata().num_row_groups(), 3);
    }
}
