//! Relation batch model.

use serde_json::{Map, Value};

/// Intended mutation for one relation record, decided once at
/// batch-ingestion time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EditStatus {
    /// No status marker: the record is echoed, never written.
    Unchanged,
    New,
    Changed,
    Deleted,
}

impl EditStatus {
    /// Decode the wire `__status__` marker. Unrecognized tags are rejected
    /// here, before any side effect, instead of being silently skipped.
    pub fn parse(marker: Option<&Value>) -> Result<Self, String> {
        let Some(marker) = marker else {
            return Ok(EditStatus::Unchanged);
        };
        let Some(tag) = marker.as_str() else {
            return Err(format!("status marker must be a string, got {}", marker));
        };
        match tag {
            "new" => Ok(EditStatus::New),
            "changed" => Ok(EditStatus::Changed),
            _ if tag.starts_with("deleted") => Ok(EditStatus::Deleted),
            _ => Err(format!("unknown status marker '{}'", tag)),
        }
    }
}

/// One child-record mutation, decoded from the flattened wire form.
#[derive(Clone, Debug, PartialEq)]
pub struct RelationRecordEdit {
    /// Record identifier; required for changed/deleted records.
    pub id: Option<i64>,
    pub status: EditStatus,
    /// Properties with the `<table>__` prefix stripped.
    pub properties: Map<String, Value>,
    /// The original flattened record, echoed back on errors and no-ops.
    pub wire: Map<String, Value>,
    /// Slugs bound into this record from the current request's uploads;
    /// rolled back if this record's store write fails.
    pub(crate) uploaded_refs: Vec<String>,
}

impl RelationRecordEdit {
    pub fn new(
        id: Option<i64>,
        status: EditStatus,
        properties: Map<String, Value>,
        wire: Map<String, Value>,
    ) -> Self {
        Self {
            id,
            status,
            properties,
            wire,
            uploaded_refs: Vec::new(),
        }
    }
}

/// One child table's slice of a batch: the foreign-key field name and the
/// record mutations in payload order.
#[derive(Clone, Debug, PartialEq)]
pub struct RelationTable {
    pub fk_field: String,
    pub records: Vec<RelationRecordEdit>,
}

/// A batch of child-record mutations keyed by table name, in payload order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RelationBatch {
    pub tables: Vec<(String, RelationTable)>,
}

impl RelationBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, table: impl Into<String>, relation: RelationTable) {
        self.tables.push((table.into(), relation));
    }

    pub fn get_mut(&mut self, table: &str) -> Option<&mut RelationTable> {
        self.tables
            .iter_mut()
            .find(|(name, _)| name == table)
            .map(|(_, relation)| relation)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|(name, _)| name.as_str())
    }
}
