//! The incremental sync run: load the watermark, extract the delta,
//! commit it as a snapshot, replay the current table state, merge into the
//! target, advance the watermark.
//!
//! Business failures never escape as `Err`; they come back inside the
//! `SyncResult` with the watermark untouched. `Err` is reserved for
//! contract violations detected before any state changes.

use crate::error::{Error, Result};
use crate::watermark::{Watermark, WatermarkStore};
use chrono::Utc;
use futures::stream;
use icebridge::type_mapper::relational_to_logical;
use icebridge::{
    append_rows, read_table, write_table, FileSystemCatalog, SchemaField, TableSchema,
    TableWriteConfig,
};
use icebridge_connectors::{
    merge_rows, validate_identifier, ChangeDetector, ColumnInfo, MergeRequest, MergeStrategy,
    SourceSession, TargetSession, DEFAULT_BATCH_SIZE,
};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{info, warn};
use typed_builder::TypedBuilder;

/// Run states, in transition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncPhase {
    Starting,
    Extracting,
    Creating,
    Appending,
    Reading,
    Merging,
    Advancing,
    Done,
    Failed,
}

/// Caller-facing sync options.
#[derive(Debug, Clone, TypedBuilder)]
pub struct SyncOptions {
    /// Primary-key columns; required for the upsert strategy.
    #[builder(default, setter(strip_option))]
    pub primary_key: Option<Vec<String>>,
    /// Source column driving change detection.
    #[builder(setter(into))]
    pub watermark_column: String,
    #[builder(default = MergeStrategy::Upsert)]
    pub merge_strategy: MergeStrategy,
    #[builder(setter(into))]
    pub warehouse_path: PathBuf,
    /// Defaults to `{warehouse}/.watermarks/`.
    #[builder(default, setter(strip_option))]
    pub watermark_dir: Option<PathBuf>,
    /// Bulk-load batch size for the merge step.
    #[builder(default = DEFAULT_BATCH_SIZE)]
    pub row_batch_size: usize,
    #[builder(default = Duration::from_secs(300))]
    pub extract_timeout: Duration,
    #[builder(default = Duration::from_secs(300))]
    pub merge_timeout: Duration,
    /// Split Iceberg data files at this row boundary.
    #[builder(default, setter(strip_option))]
    pub max_records_per_file: Option<usize>,
    /// Explicit table schema; inferred from the source result set when
    /// absent (with the documented fidelity loss).
    #[builder(default, setter(strip_option))]
    pub schema: Option<TableSchema>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncError {
    pub kind: String,
    pub message: String,
}

/// Outcome summary of one run.
#[derive(Debug, Clone)]
pub struct SyncResult {
    pub ok: bool,
    pub rows_extracted: u64,
    pub rows_appended: u64,
    pub rows_imported: u64,
    pub new_snapshot_id: Option<i64>,
    pub new_watermark: Option<Watermark>,
    pub duration: Duration,
    pub error: Option<SyncError>,
}

#[derive(Default)]
struct Draft {
    rows_extracted: u64,
    rows_appended: u64,
    rows_imported: u64,
    new_snapshot_id: Option<i64>,
    new_watermark: Option<Watermark>,
}

/// Run one incremental sync of `source_table` through the Iceberg table
/// into `target_table`.
///
/// Returns `Err` only on contract violations (bad identifier, missing
/// primary key for upsert); every runtime failure is reported through
/// `SyncResult::error` with no watermark advance.
pub async fn sync(
    source: &mut dyn SourceSession,
    source_table: &str,
    iceberg_table: &str,
    target: &mut dyn TargetSession,
    target_table: &str,
    options: &SyncOptions,
) -> Result<SyncResult> {
    let detector = validate_contract(source_table, iceberg_table, target_table, options)?;

    let started = Instant::now();
    let mut draft = Draft::default();
    let run = run_sync(
        source,
        source_table,
        iceberg_table,
        target,
        target_table,
        options,
        &detector,
        &mut draft,
    )
    .await;

    let duration = started.elapsed();
    let result = match run {
        Ok(()) => {
            info!(
                phase = ?SyncPhase::Done,
                iceberg_table,
                rows_extracted = draft.rows_extracted,
                rows_appended = draft.rows_appended,
                rows_imported = draft.rows_imported,
                snapshot_id = draft.new_snapshot_id,
                duration_ms = duration.as_millis() as u64,
                "sync finished"
            );
            SyncResult {
                ok: true,
                rows_extracted: draft.rows_extracted,
                rows_appended: draft.rows_appended,
                rows_imported: draft.rows_imported,
                new_snapshot_id: draft.new_snapshot_id,
                new_watermark: draft.new_watermark,
                duration,
                error: None,
            }
        }
        Err(e) => {
            warn!(
                phase = ?SyncPhase::Failed,
                iceberg_table,
                kind = e.kind(),
                error = %e,
                "sync failed"
            );
            SyncResult {
                ok: false,
                rows_extracted: draft.rows_extracted,
                rows_appended: draft.rows_appended,
                rows_imported: draft.rows_imported,
                new_snapshot_id: draft.new_snapshot_id,
                new_watermark: None,
                duration,
                error: Some(SyncError {
                    kind: e.kind().to_string(),
                    message: e.to_string(),
                }),
            }
        }
    };
    Ok(result)
}

/// Contract checks that must reject the run before any state changes.
fn validate_contract(
    source_table: &str,
    iceberg_table: &str,
    target_table: &str,
    options: &SyncOptions,
) -> Result<ChangeDetector> {
    validate_identifier(source_table).map_err(config_error)?;
    validate_identifier(iceberg_table).map_err(config_error)?;
    validate_identifier(target_table).map_err(config_error)?;
    let detector = ChangeDetector::new(options.watermark_column.clone()).map_err(config_error)?;
    if let Some(primary_key) = &options.primary_key {
        for column in primary_key {
            validate_identifier(column).map_err(config_error)?;
        }
    }
    if options.merge_strategy == MergeStrategy::Upsert
        && options
            .primary_key
            .as_ref()
            .is_none_or(|primary_key| primary_key.is_empty())
    {
        return Err(Error::Configuration(
            "the upsert merge strategy requires a primary key".to_string(),
        ));
    }
    if options.row_batch_size == 0 {
        return Err(Error::Configuration(
            "row_batch_size must be positive".to_string(),
        ));
    }
    Ok(detector)
}

fn config_error(e: icebridge_connectors::Error) -> Error {
    match e {
        icebridge_connectors::Error::Configuration(message) => Error::Configuration(message),
        other => other.into(),
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_sync(
    source: &mut dyn SourceSession,
    source_table: &str,
    iceberg_table: &str,
    target: &mut dyn TargetSession,
    target_table: &str,
    options: &SyncOptions,
    detector: &ChangeDetector,
    draft: &mut Draft,
) -> Result<()> {
    info!(phase = ?SyncPhase::Starting, iceberg_table, source_table, "sync starting");
    let catalog = FileSystemCatalog::new(&options.warehouse_path);
    let store = match &options.watermark_dir {
        Some(dir) => WatermarkStore::new(dir.clone()),
        None => WatermarkStore::for_warehouse(&options.warehouse_path),
    };
    let watermark = store.get(iceberg_table).await?;

    // The next watermark records when extraction began, so progress is
    // guaranteed even if the source clock drifts.
    let extraction_started_at = Utc::now();
    let query = detector.build(
        source_table,
        watermark.as_ref().map(|w| w.last_sync_timestamp),
    )?;
    info!(
        phase = ?SyncPhase::Extracting,
        iceberg_table,
        incremental = watermark.is_some(),
        "extracting changes"
    );
    let extracted = match timeout(options.extract_timeout, source.extract(&query)).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(icebridge::Error::Cancelled(format!(
                "extraction exceeded {:?}",
                options.extract_timeout
            ))
            .into())
        }
    };
    draft.rows_extracted = extracted.rows.len() as u64;

    if extracted.rows.is_empty() {
        return match watermark {
            // Nothing changed: advance the watermark timestamp only.
            Some(previous) => {
                let advanced = Watermark {
                    table_name: iceberg_table.to_string(),
                    last_sync_timestamp: extraction_started_at,
                    last_sync_id: previous.last_sync_id,
                    last_iceberg_snapshot: previous.last_iceberg_snapshot,
                    row_count: 0,
                    created_at: Utc::now(),
                };
                store.set(&advanced).await?;
                draft.new_snapshot_id = Some(previous.last_iceberg_snapshot);
                draft.new_watermark = Some(advanced);
                Ok(())
            }
            // A first run cannot create a table from nothing.
            None => Err(icebridge::Error::EmptyInput.into()),
        };
    }

    let schema = match &options.schema {
        Some(declared) => declared.clone(),
        None => infer_schema(&extracted.columns)?,
    };
    let write_config = TableWriteConfig {
        max_records_per_file: options.max_records_per_file,
        ..Default::default()
    };
    let row_stream = stream::iter(extracted.rows.into_iter().map(Ok));

    let snapshot_id = if watermark.is_none() {
        info!(phase = ?SyncPhase::Creating, iceberg_table, "creating table");
        let created = write_table(&catalog, iceberg_table, &schema, row_stream, &write_config)
            .await?;
        draft.rows_appended = created.rows_written as u64;
        created.snapshot_id
    } else {
        info!(phase = ?SyncPhase::Appending, iceberg_table, "appending snapshot");
        let appended = append_rows(
            &catalog,
            iceberg_table,
            Some(&schema),
            row_stream,
            &write_config,
        )
        .await?;
        draft.rows_appended = appended.rows_appended as u64;
        appended
            .snapshot_id
            .ok_or_else(|| icebridge::Error::TableNotFound(iceberg_table.to_string()))?
    };
    draft.new_snapshot_id = Some(snapshot_id);

    info!(phase = ?SyncPhase::Reading, iceberg_table, snapshot_id, "replaying current snapshot");
    let replay = read_table(&catalog, iceberg_table).await?;

    info!(phase = ?SyncPhase::Merging, iceberg_table, target_table, "merging into target");
    let primary_key = options.primary_key.clone().unwrap_or_default();
    let request = MergeRequest {
        target_table,
        schema: &schema,
        primary_key: &primary_key,
        batch_size: options.row_batch_size,
    };
    let outcome = match timeout(
        options.merge_timeout,
        merge_rows(target, options.merge_strategy, &request, replay),
    )
    .await
    {
        Ok(result) => result?,
        Err(_) => {
            return Err(icebridge::Error::Cancelled(format!(
                "merge exceeded {:?}",
                options.merge_timeout
            ))
            .into())
        }
    };
    draft.rows_imported = outcome.rows_inserted + outcome.rows_updated;

    info!(phase = ?SyncPhase::Advancing, iceberg_table, "advancing watermark");
    let advanced = Watermark {
        table_name: iceberg_table.to_string(),
        last_sync_timestamp: extraction_started_at,
        last_sync_id: None,
        last_iceberg_snapshot: snapshot_id,
        row_count: draft.rows_appended as i32,
        created_at: Utc::now(),
    };
    store.set(&advanced).await?;
    draft.new_watermark = Some(advanced);
    Ok(())
}

/// Derive a table schema from extraction result-set metadata. Field ids are
/// assigned in column order starting at 1; fidelity callers pre-declare the
/// schema instead.
pub fn infer_schema(columns: &[ColumnInfo]) -> Result<TableSchema> {
    let fields = columns
        .iter()
        .enumerate()
        .map(|(idx, column)| SchemaField {
            id: idx as i32 + 1,
            name: column.name.clone(),
            required: !column.nullable,
            field_type: relational_to_logical(column.relational_type),
        })
        .collect();
    TableSchema::new(0, fields).map_err(Error::Engine)
}
