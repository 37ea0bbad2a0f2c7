//! Record store - CRUD seam to the underlying persistence/validation engine.
//!
//! The store performs the actual create/read/update/delete of a single record
//! in a named table, including geometry validation and user-field injection.
//! This crate only consumes the trait; `InMemoryRecordStore` backs tests and
//! development.

mod in_memory;
mod record;

use std::fmt;

use serde_json::Value;

use crate::feature::FeatureRecord;

pub use in_memory::InMemoryRecordStore;
pub use record::RecordStore;

/// Error type for record store operations, carrying the store's code and
/// validation details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Table or record not found.
    NotFound { table: String, id: Option<i64> },
    /// Table exists but is not writable.
    ReadOnly { table: String },
    /// Principal may not access the table.
    Permission { table: String },
    /// Record failed the store's validation rules.
    Validation { details: Vec<String> },
    /// Storage-level error.
    Storage(String),
}

impl StoreError {
    /// HTTP-ish status code for serialized responses.
    pub fn code(&self) -> u16 {
        match self {
            StoreError::NotFound { .. } => 404,
            StoreError::ReadOnly { .. } => 405,
            StoreError::Permission { .. } => 403,
            StoreError::Validation { .. } => 422,
            StoreError::Storage(_) => 500,
        }
    }

    /// Structured details for the response body, empty when there are none.
    pub fn details(&self) -> Vec<String> {
        match self {
            StoreError::Validation { details } => details.clone(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound { table, id: Some(id) } => {
                write!(f, "feature not found: {}:{}", table, id)
            }
            StoreError::NotFound { table, id: None } => {
                write!(f, "dataset not found: {}", table)
            }
            StoreError::ReadOnly { table } => write!(f, "dataset not writable: {}", table),
            StoreError::Permission { table } => {
                write!(f, "dataset permission error: {}", table)
            }
            StoreError::Validation { details } => {
                write!(f, "feature validation failed: {}", details.join("; "))
            }
            StoreError::Storage(message) => write!(f, "storage error: {}", message),
        }
    }
}

impl std::error::Error for StoreError {}

/// Equality filter for [`RecordStore::index`]: `field == value`.
///
/// The full filter grammar belongs to the store; the relation read path only
/// needs foreign-key equality.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordFilter {
    pub field: String,
    pub value: Value,
}

impl RecordFilter {
    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Whether a record satisfies the filter. The synthetic field name `id`
    /// addresses the record identifier.
    pub fn matches(&self, record: &FeatureRecord) -> bool {
        if self.field == "id" {
            return record.id.map(Value::from).as_ref() == Some(&self.value);
        }
        record.properties.get(&self.field) == Some(&self.value)
    }
}
