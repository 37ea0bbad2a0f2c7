//! RecordStore - Abstract CRUD storage for dataset features.

use super::{RecordFilter, StoreError};
use crate::feature::{FeatureRecord, InternalFieldSet};

/// Abstract CRUD storage for dataset features.
///
/// Implementations are expected to enforce at most one concurrent writer per
/// record (e.g. row-level locking); this crate processes each request
/// sequentially and relies on that guarantee.
pub trait RecordStore: Send + Sync {
    /// Find records of a table, optionally narrowed by an equality filter.
    fn index(
        &self,
        principal: &str,
        table: &str,
        filter: Option<&RecordFilter>,
    ) -> Result<Vec<FeatureRecord>, StoreError>;

    /// Get a record by id. Returns None if not found.
    fn show(
        &self,
        principal: &str,
        table: &str,
        id: i64,
    ) -> Result<Option<FeatureRecord>, StoreError>;

    /// Create a new record and return it as stored. Fields named in
    /// `internal_fields` are accepted even though they are not part of the
    /// table's public schema.
    fn create(
        &self,
        principal: &str,
        table: &str,
        record: &FeatureRecord,
        internal_fields: &InternalFieldSet,
    ) -> Result<FeatureRecord, StoreError>;

    /// Update an existing record and return it as stored. Only the supplied
    /// properties change.
    fn update(
        &self,
        principal: &str,
        table: &str,
        id: i64,
        record: &FeatureRecord,
        internal_fields: &InternalFieldSet,
    ) -> Result<FeatureRecord, StoreError>;

    /// Delete a record by id.
    fn destroy(&self, principal: &str, table: &str, id: i64) -> Result<(), StoreError>;

    /// Whether the record exists and is writable by the principal.
    fn is_editable(&self, principal: &str, table: &str, id: i64) -> bool;
}
