//! Avro codec for manifest files and manifest lists.
//!
//! Two fixed Avro object-container schemas from the Iceberg v2 table spec,
//! restricted to the unpartitioned append-only subset this engine writes.
//! All paths stored in these files are table-root-relative.

use crate::error::{Error, Result};
use apache_avro::types::Value as AvroValue;
use apache_avro::{Reader as AvroReader, Schema as AvroSchema, Writer as AvroWriter};
use std::collections::HashMap;

/// Entry status: carried over unchanged from a parent snapshot.
pub const STATUS_EXISTING: i32 = 0;
/// Entry status: added by the snapshot that wrote the manifest.
pub const STATUS_ADDED: i32 = 1;
/// Entry status: logically deleted (never written by this engine).
pub const STATUS_DELETED: i32 = 2;

const MANIFEST_ENTRY_SCHEMA: &str = r#"{
  "type": "record",
  "name": "manifest_entry",
  "fields": [
    {"name": "status", "type": "int", "field-id": 0},
    {"name": "snapshot_id", "type": ["null", "long"], "default": null, "field-id": 1},
    {"name": "data_file", "field-id": 2, "type": {
      "type": "record",
      "name": "r2",
      "fields": [
        {"name": "file_path", "type": "string", "field-id": 100},
        {"name": "file_format", "type": "string", "field-id": 101},
        {"name": "partition", "type": ["null", {"type": "map", "values": "string"}], "default": null, "field-id": 102},
        {"name": "record_count", "type": "long", "field-id": 103},
        {"name": "file_size_in_bytes", "type": "long", "field-id": 104}
      ]
    }}
  ]
}"#;

const MANIFEST_LIST_SCHEMA: &str = r#"{
  "type": "record",
  "name": "manifest_file",
  "fields": [
    {"name": "manifest_path", "type": "string", "field-id": 500},
    {"name": "manifest_length", "type": "long", "field-id": 501},
    {"name": "partition_spec_id", "type": "int", "field-id": 502},
    {"name": "added_files_count", "type": "int", "field-id": 511}
  ]
}"#;

/// One Parquet data file tracked by a manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct DataFile {
    /// Table-root-relative, e.g. `data/<uuid>.parquet`.
    pub file_path: String,
    pub file_format: String,
    pub partition: Option<HashMap<String, String>>,
    pub record_count: i64,
    pub file_size_in_bytes: i64,
}

impl DataFile {
    pub fn parquet(file_path: String, record_count: i64, file_size_in_bytes: i64) -> Self {
        Self {
            file_path,
            file_format: "PARQUET".to_string(),
            partition: None,
            record_count,
            file_size_in_bytes,
        }
    }
}

/// One manifest record: a data file plus its add status.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestEntry {
    pub status: i32,
    pub snapshot_id: Option<i64>,
    pub data_file: DataFile,
}

impl ManifestEntry {
    pub fn added(snapshot_id: i64, data_file: DataFile) -> Self {
        Self {
            status: STATUS_ADDED,
            snapshot_id: Some(snapshot_id),
            data_file,
        }
    }
}

/// One manifest-list record: a manifest that is live in a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestListEntry {
    /// Table-root-relative, e.g. `metadata/<uuid>.avro`.
    pub manifest_path: String,
    pub manifest_length: i64,
    pub partition_spec_id: i32,
    pub added_files_count: i32,
}

fn manifest_entry_schema() -> Result<AvroSchema> {
    Ok(AvroSchema::parse_str(MANIFEST_ENTRY_SCHEMA)?)
}

fn manifest_list_schema() -> Result<AvroSchema> {
    Ok(AvroSchema::parse_str(MANIFEST_LIST_SCHEMA)?)
}

/// Serialize manifest entries into an Avro object-container file.
pub fn write_manifest(entries: &[ManifestEntry]) -> Result<Vec<u8>> {
    let schema = manifest_entry_schema()?;
    let mut writer = AvroWriter::new(&schema, Vec::new());
    for entry in entries {
        writer.append(manifest_entry_to_avro(entry))?;
    }
    Ok(writer.into_inner()?)
}

/// Deserialize every entry of a manifest file.
pub fn read_manifest(bytes: &[u8]) -> Result<Vec<ManifestEntry>> {
    let reader = AvroReader::new(bytes)?;
    let mut entries = Vec::new();
    for value in reader {
        entries.push(manifest_entry_from_avro(value?)?);
    }
    Ok(entries)
}

/// Serialize manifest-list entries into an Avro object-container file.
pub fn write_manifest_list(entries: &[ManifestListEntry]) -> Result<Vec<u8>> {
    let schema = manifest_list_schema()?;
    let mut writer = AvroWriter::new(&schema, Vec::new());
    for entry in entries {
        let record = AvroValue::Record(vec![
            (
                "manifest_path".to_string(),
                AvroValue::String(entry.manifest_path.clone()),
            ),
            (
                "manifest_length".to_string(),
                AvroValue::Long(entry.manifest_length),
            ),
            (
                "partition_spec_id".to_string(),
                AvroValue::Int(entry.partition_spec_id),
            ),
            (
                "added_files_count".to_string(),
                AvroValue::Int(entry.added_files_count),
            ),
        ]);
        writer.append(record)?;
    }
    Ok(writer.into_inner()?)
}

/// Deserialize every entry of a manifest list.
pub fn read_manifest_list(bytes: &[u8]) -> Result<Vec<ManifestListEntry>> {
    let reader = AvroReader::new(bytes)?;
    let mut entries = Vec::new();
    for value in reader {
        let mut fields = record_fields(value?)?;
        entries.push(ManifestListEntry {
            manifest_path: take_string(&mut fields, "manifest_path")?,
            manifest_length: take_long(&mut fields, "manifest_length")?,
            partition_spec_id: take_int(&mut fields, "partition_spec_id")?,
            added_files_count: take_int(&mut fields, "added_files_count")?,
        });
    }
    Ok(entries)
}

fn manifest_entry_to_avro(entry: &ManifestEntry) -> AvroValue {
    let partition = match &entry.data_file.partition {
        None => AvroValue::Union(0, Box::new(AvroValue::Null)),
        Some(map) => {
            let map: HashMap<String, AvroValue> = map
                .iter()
                .map(|(k, v)| (k.clone(), AvroValue::String(v.clone())))
                .collect();
            AvroValue::Union(1, Box::new(AvroValue::Map(map)))
        }
    };
    let snapshot_id = match entry.snapshot_id {
        None => AvroValue::Union(0, Box::new(AvroValue::Null)),
        Some(id) => AvroValue::Union(1, Box::new(AvroValue::Long(id))),
    };
    let data_file = AvroValue::Record(vec![
        (
            "file_path".to_string(),
            AvroValue::String(entry.data_file.file_path.clone()),
        ),
        (
            "file_format".to_string(),
            AvroValue::String(entry.data_file.file_format.clone()),
        ),
        ("partition".to_string(), partition),
        (
            "record_count".to_string(),
            AvroValue::Long(entry.data_file.record_count),
        ),
        (
            "file_size_in_bytes".to_string(),
            AvroValue::Long(entry.data_file.file_size_in_bytes),
        ),
    ]);
    AvroValue::Record(vec![
        ("status".to_string(), AvroValue::Int(entry.status)),
        ("snapshot_id".to_string(), snapshot_id),
        ("data_file".to_string(), data_file),
    ])
}

fn manifest_entry_from_avro(value: AvroValue) -> Result<ManifestEntry> {
    let mut fields = record_fields(value)?;
    let status = take_int(&mut fields, "status")?;
    let snapshot_id = take_opt_long(&mut fields, "snapshot_id")?;
    let mut data_file_fields = record_fields(take_field(&mut fields, "data_file")?)?;
    let data_file = DataFile {
        file_path: take_string(&mut data_file_fields, "file_path")?,
        file_format: take_string(&mut data_file_fields, "file_format")?,
        partition: take_opt_string_map(&mut data_file_fields, "partition")?,
        record_count: take_long(&mut data_file_fields, "record_count")?,
        file_size_in_bytes: take_long(&mut data_file_fields, "file_size_in_bytes")?,
    };
    Ok(ManifestEntry {
        status,
        snapshot_id,
        data_file,
    })
}

fn malformed(what: &str) -> Error {
    Error::Avro(crate::error::ErrorStruct::new(
        format!("malformed Avro record: {what}"),
        crate::error::ErrorStatus::Permanent,
    ))
}

fn record_fields(value: AvroValue) -> Result<HashMap<String, AvroValue>> {
    match value {
        AvroValue::Record(fields) => Ok(fields.into_iter().collect()),
        other => Err(malformed(&format!("expected record, got {other:?}"))),
    }
}

fn take_field(fields: &mut HashMap<String, AvroValue>, name: &str) -> Result<AvroValue> {
    fields
        .remove(name)
        .ok_or_else(|| malformed(&format!("missing field `{name}`")))
}

fn unwrap_union(value: AvroValue) -> AvroValue {
    match value {
        AvroValue::Union(_, inner) => *inner,
        other => other,
    }
}

fn take_string(fields: &mut HashMap<String, AvroValue>, name: &str) -> Result<String> {
    match take_field(fields, name)? {
        AvroValue::String(s) => Ok(s),
        other => Err(malformed(&format!("field `{name}` is not a string: {other:?}"))),
    }
}

fn take_long(fields: &mut HashMap<String, AvroValue>, name: &str) -> Result<i64> {
    match take_field(fields, name)? {
        AvroValue::Long(v) => Ok(v),
        AvroValue::Int(v) => Ok(v as i64),
        other => Err(malformed(&format!("field `{name}` is not a long: {other:?}"))),
    }
}

fn take_int(fields: &mut HashMap<String, AvroValue>, name: &str) -> Result<i32> {
    match take_field(fields, name)? {
        AvroValue::Int(v) => Ok(v),
        other => Err(malformed(&format!("field `{name}` is not an int: {other:?}"))),
    }
}

fn take_opt_long(fields: &mut HashMap<String, AvroValue>, name: &str) -> Result<Option<i64>> {
    match unwrap_union(take_field(fields, name)?) {
        AvroValue::Null => Ok(None),
        AvroValue::Long(v) => Ok(Some(v)),
        other => Err(malformed(&format!(
            "field `{name}` is not a nullable long: {other:?}"
        ))),
    }
}

fn take_opt_string_map(
    fields: &mut HashMap<String, AvroValue>,
    name: &str,
) -> Result<Option<HashMap<String, String>>> {
    match unwrap_union(take_field(fields, name)?) {
        AvroValue::Null => Ok(None),
        AvroValue::Map(map) => {
            let mut out = HashMap::with_capacity(map.len());
            for (key, value) in map {
                match value {
                    AvroValue::String(s) => {
                        out.insert(key, s);
                    }
                    other => {
                        return Err(malformed(&format!(
                            "map value for `{key}` is not a string: {other:?}"
                        )))
                    }
                }
            }
            Ok(Some(out))
        }
        other => Err(malformed(&format!(
            "field `{name}` is not a nullable map: {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_round_trip() {
        let entries = vec![
            ManifestEntry::added(
                1234,
                DataFile::parquet("data/a.parquet".to_string(), 10, 2048),
            ),
            ManifestEntry::added(
                1234,
                DataFile::parquet("data/b.parquet".to_string(), 2, 512),
            ),
        ];
        let bytes = write_manifest(&entries).unwrap();
        let back = read_manifest(&bytes).unwrap();
        assert_eq!(back, entries);
        assert_eq!(back[0].status, STATUS_ADDED);
        assert_eq!(back[0].snapshot_id, Some(1234));
        assert_eq!(back[1].data_file.file_path, "data/b.parquet");
    }

    #[test]
    fn test_manifest_list_round_trip() {
        let entries = vec![
            ManifestListEntry {
                manifest_path: "metadata/m1.avro".to_string(),
                manifest_length: 900,
                partition_spec_id: 0,
                added_files_count: 3,
            },
            ManifestListEntry {
                manifest_path: "metadata/m2.avro".to_string(),
                manifest_length: 1100,
                partition_spec_id: 0,
                added_files_count: 1,
            },
        ];
        let bytes = write_manifest_list(&entries).unwrap();
        let back = read_manifest_list(&bytes).unwrap();
        assert_eq!(back, entries);
    }

    #[test]
    fn test_partition_map_survives() {
        let mut data_file = DataFile::parquet("data/p.parquet".to_string(), 1, 64);
        data_file.partition = Some(HashMap::from([(
            "region".to_string(),
            "emea".to_string(),
        )]));
        let entries = vec![ManifestEntry::added(7, data_file)];
        let bytes = write_manifest(&entries).unwrap();
        let back = read_manifest(&bytes).unwrap();
        assert_eq!(
            back[0].data_file.partition.as_ref().unwrap()["region"],
            "emea"
        );
    }

    #[test]
    fn test_empty_manifest_reads_empty() {
        let bytes = write_manifest(&[]).unwrap();
        assert!(read_manifest(&bytes).unwrap().is_empty());
    }
}
