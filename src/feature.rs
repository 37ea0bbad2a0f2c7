//! FeatureRecord - The canonical in-memory shape of one dataset record.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Marker prefix for property values referencing a stored attachment file.
pub const ATTACHMENT_PREFIX: &str = "attachment://";

/// One record of a dataset: identifier, properties, optional geometry.
///
/// Properties keep payload order (`serde_json` with `preserve_order`).
/// Values referencing attachment files are strings of the exact form
/// `attachment://<slug>`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    /// Record identifier; absent for records not yet created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub properties: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Geometry>,
}

/// Geometry object (type + coordinates), absent for non-spatial tables.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: Value,
}

impl FeatureRecord {
    /// New record without an identifier or geometry.
    pub fn new(properties: Map<String, Value>) -> Self {
        Self {
            id: None,
            properties,
            geometry: None,
        }
    }

    /// Existing record addressed by id.
    pub fn with_id(id: i64, properties: Map<String, Value>) -> Self {
        Self {
            id: Some(id),
            properties,
            geometry: None,
        }
    }

    /// Remove write-only bookkeeping fields before returning the record.
    pub fn strip_internal_fields(&mut self, internal: &InternalFieldSet) {
        if internal.is_empty() {
            return;
        }
        self.properties.retain(|key, _| !internal.contains(key));
    }
}

/// Extract the slug from a property value holding an attachment reference.
///
/// The slug is opaque: it is compared, recorded, and passed back for removal,
/// never interpreted.
pub fn attachment_slug(value: &Value) -> Option<&str> {
    value.as_str().and_then(|s| s.strip_prefix(ATTACHMENT_PREFIX))
}

/// Format an attachment reference value for a slug.
pub fn attachment_ref(slug: &str) -> Value {
    Value::String(format!("{}{}", ATTACHMENT_PREFIX, slug))
}

/// Set of synthetic write-only field names scoped to one table.
///
/// These fields (e.g. upload audit fields) are persisted by the record store
/// but stripped from any record echoed to the caller.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InternalFieldSet {
    names: BTreeSet<String>,
}

impl InternalFieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>) {
        self.names.insert(name.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Project the subset of names carrying the given prefix, with the
    /// prefix removed. Used to narrow batch-wide `<table>__<field>` names
    /// down to one table's field names.
    pub fn scoped(&self, prefix: &str) -> InternalFieldSet {
        let names = self
            .names
            .iter()
            .filter_map(|name| name.strip_prefix(prefix))
            .map(str::to_string)
            .collect();
        InternalFieldSet { names }
    }
}

impl FromIterator<String> for InternalFieldSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        InternalFieldSet {
            names: iter.into_iter().collect(),
        }
    }
}
