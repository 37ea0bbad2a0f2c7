//! InMemoryRecordStore - HashMap-backed record store for testing and development.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock};

use serde_json::Value;

use super::{RecordFilter, RecordStore, StoreError};
use crate::feature::{FeatureRecord, InternalFieldSet};

struct TableData {
    next_id: i64,
    records: BTreeMap<i64, FeatureRecord>,
}

impl TableData {
    fn new() -> Self {
        Self {
            next_id: 1,
            records: BTreeMap::new(),
        }
    }
}

#[derive(Default)]
struct Inner {
    tables: HashMap<String, TableData>,
    required_fields: HashMap<String, Vec<String>>,
    read_only: HashSet<String>,
}

/// In-memory record store backed by per-table BTreeMaps. Clone-friendly via Arc.
///
/// Tables must be registered before use. Per-table required fields and
/// read-only flags give tests realistic validation and permission failures.
#[derive(Clone)]
pub struct InMemoryRecordStore {
    inner: Arc<RwLock<Inner>>,
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRecordStore {
    /// Create a new empty record store.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
        }
    }

    /// Register a table so it can hold records.
    pub fn add_table(&self, table: &str) {
        if let Ok(mut inner) = self.inner.write() {
            inner
                .tables
                .entry(table.to_string())
                .or_insert_with(TableData::new);
        }
    }

    /// Declare fields that must be present and non-null on create, and must
    /// not be set to null on update.
    pub fn require_fields(&self, table: &str, fields: &[&str]) {
        if let Ok(mut inner) = self.inner.write() {
            inner
                .required_fields
                .insert(table.to_string(), fields.iter().map(|f| f.to_string()).collect());
        }
    }

    /// Mark a table as read-only; every write fails with `ReadOnly`.
    pub fn set_read_only(&self, table: &str) {
        if let Ok(mut inner) = self.inner.write() {
            inner.read_only.insert(table.to_string());
        }
    }

    /// Insert a record directly, bypassing validation. Returns the record id.
    pub fn seed(&self, table: &str, record: FeatureRecord) -> i64 {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let data = inner
            .tables
            .entry(table.to_string())
            .or_insert_with(TableData::new);
        let id = record.id.unwrap_or(data.next_id);
        data.next_id = data.next_id.max(id + 1);
        let mut stored = record;
        stored.id = Some(id);
        data.records.insert(id, stored);
        id
    }

    fn validate(
        inner: &Inner,
        table: &str,
        record: &FeatureRecord,
        creating: bool,
    ) -> Result<(), StoreError> {
        let Some(required) = inner.required_fields.get(table) else {
            return Ok(());
        };
        let mut details = Vec::new();
        for field in required {
            match record.properties.get(field) {
                Some(Value::Null) => details.push(format!("Field {} must not be null", field)),
                None if creating => details.push(format!("Missing required field {}", field)),
                _ => {}
            }
        }
        if details.is_empty() {
            Ok(())
        } else {
            Err(StoreError::Validation { details })
        }
    }

    fn check_writable(inner: &Inner, table: &str) -> Result<(), StoreError> {
        if !inner.tables.contains_key(table) {
            return Err(StoreError::NotFound {
                table: table.to_string(),
                id: None,
            });
        }
        if inner.read_only.contains(table) {
            return Err(StoreError::ReadOnly {
                table: table.to_string(),
            });
        }
        Ok(())
    }

    fn lock_err(_: impl std::fmt::Debug) -> StoreError {
        StoreError::Storage("lock poisoned".into())
    }
}

impl RecordStore for InMemoryRecordStore {
    fn index(
        &self,
        _principal: &str,
        table: &str,
        filter: Option<&RecordFilter>,
    ) -> Result<Vec<FeatureRecord>, StoreError> {
        let inner = self.inner.read().map_err(Self::lock_err)?;
        let data = inner.tables.get(table).ok_or_else(|| StoreError::NotFound {
            table: table.to_string(),
            id: None,
        })?;

        Ok(data
            .records
            .values()
            .filter(|record| filter.map_or(true, |f| f.matches(record)))
            .cloned()
            .collect())
    }

    fn show(
        &self,
        _principal: &str,
        table: &str,
        id: i64,
    ) -> Result<Option<FeatureRecord>, StoreError> {
        let inner = self.inner.read().map_err(Self::lock_err)?;
        Ok(inner
            .tables
            .get(table)
            .and_then(|data| data.records.get(&id))
            .cloned())
    }

    fn create(
        &self,
        _principal: &str,
        table: &str,
        record: &FeatureRecord,
        _internal_fields: &InternalFieldSet,
    ) -> Result<FeatureRecord, StoreError> {
        let mut inner = self.inner.write().map_err(Self::lock_err)?;
        Self::check_writable(&inner, table)?;
        Self::validate(&inner, table, record, true)?;

        let data = inner.tables.get_mut(table).ok_or(StoreError::NotFound {
            table: table.to_string(),
            id: None,
        })?;
        let id = data.next_id;
        data.next_id += 1;

        let mut stored = record.clone();
        stored.id = Some(id);
        data.records.insert(id, stored.clone());
        Ok(stored)
    }

    fn update(
        &self,
        _principal: &str,
        table: &str,
        id: i64,
        record: &FeatureRecord,
        _internal_fields: &InternalFieldSet,
    ) -> Result<FeatureRecord, StoreError> {
        let mut inner = self.inner.write().map_err(Self::lock_err)?;
        Self::check_writable(&inner, table)?;
        Self::validate(&inner, table, record, false)?;

        let data = inner.tables.get_mut(table).ok_or(StoreError::NotFound {
            table: table.to_string(),
            id: None,
        })?;
        let stored = data.records.get_mut(&id).ok_or(StoreError::NotFound {
            table: table.to_string(),
            id: Some(id),
        })?;

        for (key, value) in &record.properties {
            stored.properties.insert(key.clone(), value.clone());
        }
        if record.geometry.is_some() {
            stored.geometry = record.geometry.clone();
        }
        Ok(stored.clone())
    }

    fn destroy(&self, _principal: &str, table: &str, id: i64) -> Result<(), StoreError> {
        let mut inner = self.inner.write().map_err(Self::lock_err)?;
        Self::check_writable(&inner, table)?;

        let data = inner.tables.get_mut(table).ok_or(StoreError::NotFound {
            table: table.to_string(),
            id: None,
        })?;
        if data.records.remove(&id).is_none() {
            return Err(StoreError::NotFound {
                table: table.to_string(),
                id: Some(id),
            });
        }
        Ok(())
    }

    fn is_editable(&self, _principal: &str, table: &str, id: i64) -> bool {
        let Ok(inner) = self.inner.read() else {
            return false;
        };
        if inner.read_only.contains(table) {
            return false;
        }
        inner
            .tables
            .get(table)
            .map(|data| data.records.contains_key(&id))
            .unwrap_or(false)
    }
}
