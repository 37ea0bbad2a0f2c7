//! Wire encoding of relation batches.
//!
//! On the wire a child record is a single flat JSON object whose property
//! keys carry a `<table>__` prefix, plus `id` and `__status__`. That
//! flattening is purely a serialization convention; it is decoded into
//! structured per-table records here and re-encoded when results are built.

use serde_json::{Map, Value};

use super::batch::{EditStatus, RelationBatch, RelationRecordEdit, RelationTable};
use crate::error::DataError;
use crate::feature::{FeatureRecord, InternalFieldSet};

/// Decode a relation batch payload of the form
/// `{ "<table>": { "fk": "<field>", "records": [ ... ] } }`.
pub fn decode_batch(payload: &Value) -> Result<RelationBatch, DataError> {
    let Some(tables) = payload.as_object() else {
        return Err(DataError::Validation(
            "relation values must be a JSON object".into(),
        ));
    };

    let mut batch = RelationBatch::new();
    for (table, entry) in tables {
        let Some(entry) = entry.as_object() else {
            return Err(DataError::Validation(format!(
                "relation table '{}' must be a JSON object",
                table
            )));
        };
        let Some(fk_field) = entry.get("fk").and_then(Value::as_str) else {
            return Err(DataError::Validation(format!(
                "relation table '{}' is missing the 'fk' field name",
                table
            )));
        };

        let mut records = Vec::new();
        if let Some(wire_records) = entry.get("records") {
            let Some(wire_records) = wire_records.as_array() else {
                return Err(DataError::Validation(format!(
                    "records of relation table '{}' must be an array",
                    table
                )));
            };
            for wire_record in wire_records {
                records.push(decode_record(table, wire_record)?);
            }
        }

        batch.push(
            table.clone(),
            RelationTable {
                fk_field: fk_field.to_string(),
                records,
            },
        );
    }
    Ok(batch)
}

fn decode_record(table: &str, wire_record: &Value) -> Result<RelationRecordEdit, DataError> {
    let Some(wire) = wire_record.as_object() else {
        return Err(DataError::Validation(format!(
            "record of relation table '{}' must be a JSON object",
            table
        )));
    };

    let status = EditStatus::parse(wire.get("__status__")).map_err(|reason| {
        DataError::Validation(format!("relation table '{}': {}", table, reason))
    })?;
    let id = wire.get("id").and_then(Value::as_i64);

    let prefix = format!("{}__", table);
    let properties: Map<String, Value> = wire
        .iter()
        .filter_map(|(key, value)| {
            key.strip_prefix(&prefix)
                .map(|field| (field.to_string(), value.clone()))
        })
        .collect();

    Ok(RelationRecordEdit::new(id, status, properties, wire.clone()))
}

/// Flatten a stored record back into the wire form, stripping internal
/// fields.
pub(crate) fn flatten_record(
    table: &str,
    record: &FeatureRecord,
    internal_fields: &InternalFieldSet,
) -> Map<String, Value> {
    let mut wire = Map::new();
    for (key, value) in &record.properties {
        if !internal_fields.contains(key) {
            wire.insert(format!("{}__{}", table, key), value.clone());
        }
    }
    wire.insert("id".to_string(), record.id.map(Value::from).unwrap_or(Value::Null));
    wire
}

/// Addressee of an uploaded file within a relation batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadTarget {
    pub table: String,
    pub field: String,
    pub index: usize,
}

/// Parse a relation upload field key of the form
/// `file:<table>__<field>__<index>` (the `file:` prefix is optional).
///
/// Table and field names must not themselves contain `__`; the key is split
/// from the right so a trailing numeric index is unambiguous.
pub fn parse_upload_key(key: &str) -> Option<UploadTarget> {
    let key = key.strip_prefix("file:").unwrap_or(key);
    let (rest, index) = key.rsplit_once("__")?;
    let index: usize = index.parse().ok()?;
    let (table, field) = rest.split_once("__")?;
    if table.is_empty() || field.is_empty() {
        return None;
    }
    Some(UploadTarget {
        table: table.to_string(),
        field: field.to_string(),
        index,
    })
}
