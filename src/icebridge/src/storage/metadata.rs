//! Root table-metadata document and the pure operations that build it.
//!
//! Format version 2, single unpartitioned spec, append-only snapshot chain.

use crate::schema::TableSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Spec id of the single unpartitioned partition spec.
pub const UNPARTITIONED_SPEC_ID: i32 = 0;
/// Partition field ids start above this watermark; none are assigned here.
pub const LAST_PARTITION_ID: i32 = 999;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PartitionSpec {
    pub spec_id: i32,
    pub fields: Vec<serde_json::Value>,
}

impl PartitionSpec {
    fn unpartitioned() -> Self {
        Self {
            spec_id: UNPARTITIONED_SPEC_ID,
            fields: vec![],
        }
    }
}

/// A committed, immutable version of the table's contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Snapshot {
    pub snapshot_id: i64,
    pub parent_snapshot_id: Option<i64>,
    pub sequence_number: i64,
    pub timestamp_ms: i64,
    pub summary: BTreeMap<String, String>,
    /// Table-root-relative path of the manifest list.
    pub manifest_list: String,
}

impl Snapshot {
    fn summary_for_append(added_data_files: i64, added_records: i64) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("operation".to_string(), "append".to_string()),
            (
                "added-data-files".to_string(),
                added_data_files.to_string(),
            ),
            ("added-records".to_string(), added_records.to_string()),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SnapshotLogEntry {
    pub timestamp_ms: i64,
    pub snapshot_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MetadataLogEntry {
    pub timestamp_ms: i64,
    pub metadata_file: String,
}

/// The root metadata JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TableMetadata {
    pub format_version: i32,
    pub table_uuid: String,
    pub location: String,
    pub last_sequence_number: i64,
    pub last_updated_ms: i64,
    pub last_column_id: i32,
    pub schemas: Vec<TableSchema>,
    pub current_schema_id: i32,
    pub partition_specs: Vec<PartitionSpec>,
    pub default_spec_id: i32,
    pub last_partition_id: i32,
    pub snapshots: Vec<Snapshot>,
    pub current_snapshot_id: Option<i64>,
    pub snapshot_log: Vec<SnapshotLogEntry>,
    pub metadata_log: Vec<MetadataLogEntry>,
}

impl TableMetadata {
    pub fn current_schema(&self) -> Option<&TableSchema> {
        self.schemas
            .iter()
            .find(|s| s.schema_id == self.current_schema_id)
    }

    pub fn current_snapshot(&self) -> Option<&Snapshot> {
        let id = self.current_snapshot_id?;
        self.snapshot_by_id(id)
    }

    pub fn snapshot_by_id(&self, snapshot_id: i64) -> Option<&Snapshot> {
        self.snapshots.iter().find(|s| s.snapshot_id == snapshot_id)
    }
}

/// Inputs describing the snapshot being committed.
#[derive(Debug, Clone)]
pub struct SnapshotInput {
    pub snapshot_id: i64,
    /// Table-root-relative manifest-list path.
    pub manifest_list: String,
    pub added_data_files: i64,
    pub added_records: i64,
    /// Wall-clock commit time, supplied by the caller so the builders stay pure.
    pub timestamp_ms: i64,
}

/// Build version-2 metadata for a table's first snapshot: one schema at id 0,
/// the unpartitioned spec, sequence number 1, no parent.
pub fn create_initial(
    schema: &TableSchema,
    table_uuid: String,
    location: String,
    input: &SnapshotInput,
) -> TableMetadata {
    let snapshot = Snapshot {
        snapshot_id: input.snapshot_id,
        parent_snapshot_id: None,
        sequence_number: 1,
        timestamp_ms: input.timestamp_ms,
        summary: Snapshot::summary_for_append(input.added_data_files, input.added_records),
        manifest_list: input.manifest_list.clone(),
    };
    TableMetadata {
        format_version: 2,
        table_uuid,
        location,
        last_sequence_number: 1,
        last_updated_ms: input.timestamp_ms,
        last_column_id: schema.max_field_id(),
        schemas: vec![schema.clone()],
        current_schema_id: schema.schema_id,
        partition_specs: vec![PartitionSpec::unpartitioned()],
        default_spec_id: UNPARTITIONED_SPEC_ID,
        last_partition_id: LAST_PARTITION_ID,
        current_snapshot_id: Some(snapshot.snapshot_id),
        snapshot_log: vec![SnapshotLogEntry {
            timestamp_ms: input.timestamp_ms,
            snapshot_id: snapshot.snapshot_id,
        }],
        metadata_log: vec![],
        snapshots: vec![snapshot],
    }
}

/// Append one snapshot to existing metadata: parent = current snapshot
/// (none for a table that exists without data), sequence number = last + 1,
/// snapshot log extended.
pub fn append_snapshot(existing: &TableMetadata, input: &SnapshotInput) -> TableMetadata {
    let snapshot = Snapshot {
        snapshot_id: input.snapshot_id,
        parent_snapshot_id: existing.current_snapshot_id,
        sequence_number: existing.last_sequence_number + 1,
        timestamp_ms: input.timestamp_ms,
        summary: Snapshot::summary_for_append(input.added_data_files, input.added_records),
        manifest_list: input.manifest_list.clone(),
    };

    let mut updated = existing.clone();
    updated.last_sequence_number = snapshot.sequence_number;
    updated.last_updated_ms = input.timestamp_ms;
    updated.current_snapshot_id = Some(snapshot.snapshot_id);
    updated.snapshot_log.push(SnapshotLogEntry {
        timestamp_ms: input.timestamp_ms,
        snapshot_id: snapshot.snapshot_id,
    });
    updated.snapshots.push(snapshot);
    updated
}

/// Allocate a snapshot id: epoch milliseconds with a monotonic collision
/// guard, so two commits in the same millisecond still get distinct ids.
pub fn allocate_snapshot_id(existing: Option<&TableMetadata>, now_ms: i64) -> i64 {
    let floor = existing
        .and_then(|m| m.snapshots.iter().map(|s| s.snapshot_id).max())
        .map(|max| max + 1)
        .unwrap_or(i64::MIN);
    now_ms.max(floor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{LogicalType, SchemaField};

    fn test_schema() -> TableSchema {
        TableSchema::new(
            0,
            vec![
                SchemaField::required(1, "id", LogicalType::Long),
                SchemaField::optional(2, "name", LogicalType::String),
            ],
        )
        .unwrap()
    }

    fn snapshot_input(snapshot_id: i64, timestamp_ms: i64) -> SnapshotInput {
        SnapshotInput {
            snapshot_id,
            manifest_list: format!("metadata/snap-{snapshot_id}.avro"),
            added_data_files: 1,
            added_records: 2,
            timestamp_ms,
        }
    }

    #[test]
    fn test_create_initial_shape() {
        let metadata = create_initial(
            &test_schema(),
            "uuid-1".to_string(),
            "/warehouse/orders".to_string(),
            &snapshot_input(100, 1_700_000_000_000),
        );
        assert_eq!(metadata.format_version, 2);
        assert_eq!(metadata.last_column_id, 2);
        assert_eq!(metadata.last_sequence_number, 1);
        assert_eq!(metadata.current_snapshot_id, Some(100));
        assert_eq!(metadata.snapshots.len(), 1);
        let snapshot = &metadata.snapshots[0];
        assert_eq!(snapshot.sequence_number, 1);
        assert_eq!(snapshot.parent_snapshot_id, None);
        assert_eq!(snapshot.summary["operation"], "append");
        assert_eq!(snapshot.summary["added-records"], "2");
        assert_eq!(metadata.partition_specs[0].spec_id, 0);
        assert!(metadata.partition_specs[0].fields.is_empty());
    }

    #[test]
    fn test_append_snapshot_links_chain() {
        let initial = create_initial(
            &test_schema(),
            "uuid-1".to_string(),
            "/warehouse/orders".to_string(),
            &snapshot_input(100, 1_700_000_000_000),
        );
        let appended = append_snapshot(&initial, &snapshot_input(200, 1_700_000_001_000));
        assert_eq!(appended.current_snapshot_id, Some(200));
        assert_eq!(appended.last_sequence_number, 2);
        assert_eq!(appended.snapshots.len(), 2);
        let new = appended.snapshot_by_id(200).unwrap();
        assert_eq!(new.parent_snapshot_id, Some(100));
        assert_eq!(new.sequence_number, 2);
        // Prior snapshot preserved untouched.
        assert_eq!(appended.snapshot_by_id(100), initial.snapshot_by_id(100));
        assert_eq!(appended.snapshot_log.len(), 2);
    }

    #[test]
    fn test_metadata_json_field_names() {
        let metadata = create_initial(
            &test_schema(),
            "uuid-1".to_string(),
            "/warehouse/orders".to_string(),
            &snapshot_input(100, 1_700_000_000_000),
        );
        let value = serde_json::to_value(&metadata).unwrap();
        assert_eq!(value["format-version"], 2);
        assert_eq!(value["table-uuid"], "uuid-1");
        assert_eq!(value["current-schema-id"], 0);
        assert_eq!(value["last-column-id"], 2);
        assert_eq!(value["default-spec-id"], 0);
        assert_eq!(value["last-partition-id"], 999);
        assert_eq!(value["snapshots"][0]["snapshot-id"], 100);
        assert_eq!(value["snapshots"][0]["sequence-number"], 1);
        assert_eq!(value["snapshots"][0]["parent-snapshot-id"], serde_json::Value::Null);
        assert_eq!(value["current-snapshot-id"], 100);
        assert!(value["snapshot-log"].is_array());
        assert!(value["metadata-log"].is_array());

        let back: TableMetadata = serde_json::from_value(value).unwrap();
        assert_eq!(back, metadata);
    }

    #[test]
    fn test_allocate_snapshot_id_monotonic() {
        let initial = create_initial(
            &test_schema(),
            "uuid-1".to_string(),
            "/warehouse/orders".to_string(),
            &snapshot_input(1_700_000_000_000, 1_700_000_000_000),
        );
        // Clock moved forward: use the clock.
        assert_eq!(
            allocate_snapshot_id(Some(&initial), 1_700_000_005_000),
            1_700_000_005_000
        );
        // Clock collision or drift backwards: bump past the max known id.
        assert_eq!(
            allocate_snapshot_id(Some(&initial), 1_700_000_000_000),
            1_700_000_000_001
        );
        assert_eq!(
            allocate_snapshot_id(Some(&initial), 1_600_000_000_000),
            1_700_000_000_001
        );
        // Fresh table: the clock wins.
        assert_eq!(allocate_snapshot_id(None, 42), 42);
    }
}
