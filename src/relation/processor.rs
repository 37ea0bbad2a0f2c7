//! RelationBatchProcessor - Applies a relation batch against the record
//! store for one parent record.
//!
//! The batch runs to completion once started: record-level failures are
//! recorded inline and flip the aggregate success flag, they never abort the
//! remaining records. Request-level failures (permission, payload shape,
//! attachment saves) reject the whole call before any record mutation.

use std::collections::{BTreeSet, HashMap};

use log::{debug, warn};
use serde_json::{Map, Value};

use super::batch::{EditStatus, RelationBatch, RelationRecordEdit};
use super::wire::{flatten_record, parse_upload_key, UploadTarget};
use crate::attachment::{AttachmentCoordinator, AttachmentStore, UploadedFile};
use crate::config::EditConfig;
use crate::error::DataError;
use crate::feature::{attachment_ref, FeatureRecord, InternalFieldSet};
use crate::store::{RecordFilter, RecordStore, StoreError};

/// Declared parent-to-child relations. A batch may only touch tables
/// registered as children of the parent dataset.
#[derive(Clone, Debug, Default)]
pub struct RelationRegistry {
    children: HashMap<String, BTreeSet<String>>,
}

impl RelationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `child` as a relation table of `parent`.
    pub fn register(&mut self, parent: &str, child: &str) {
        self.children
            .entry(parent.to_string())
            .or_default()
            .insert(child.to_string());
    }

    pub fn is_child(&self, parent: &str, child: &str) -> bool {
        self.children
            .get(parent)
            .map_or(false, |children| children.contains(child))
    }
}

/// Outcome for one table of a batch: the foreign-key field name and one
/// wire record per input record, in payload order.
#[derive(Clone, Debug, PartialEq)]
pub struct TableResult {
    pub fk: String,
    pub records: Vec<Value>,
}

/// Aggregate outcome of a processed batch.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchResult {
    /// False as soon as any record in any table reported an error.
    pub success: bool,
    pub tables: Vec<(String, TableResult)>,
}

impl BatchResult {
    /// Serialize to the wire response shape
    /// `{"relationvalues": {...}, "success": bool}`.
    pub fn to_wire(&self) -> Value {
        let mut wire = Map::new();
        wire.insert("relationvalues".into(), tables_to_wire(&self.tables));
        wire.insert("success".into(), Value::Bool(self.success));
        Value::Object(wire)
    }
}

/// Current relation records of a parent, grouped per child table.
#[derive(Clone, Debug, PartialEq)]
pub struct RelationValues {
    pub tables: Vec<(String, TableResult)>,
}

impl RelationValues {
    pub fn to_wire(&self) -> Value {
        let mut wire = Map::new();
        wire.insert("relationvalues".into(), tables_to_wire(&self.tables));
        Value::Object(wire)
    }
}

fn tables_to_wire(tables: &[(String, TableResult)]) -> Value {
    let mut wire = Map::new();
    for (table, result) in tables {
        let mut entry = Map::new();
        entry.insert("fk".into(), Value::String(result.fk.clone()));
        entry.insert("records".into(), Value::Array(result.records.clone()));
        wire.insert(table.clone(), Value::Object(entry));
    }
    Value::Object(wire)
}

/// Applies a [`RelationBatch`] for a parent record, driving the record store
/// and the attachment coordinator.
pub struct RelationBatchProcessor<'a> {
    records: &'a dyn RecordStore,
    attachments: &'a dyn AttachmentStore,
    registry: &'a RelationRegistry,
    config: &'a EditConfig,
}

impl<'a> RelationBatchProcessor<'a> {
    pub fn new(
        records: &'a dyn RecordStore,
        attachments: &'a dyn AttachmentStore,
        registry: &'a RelationRegistry,
        config: &'a EditConfig,
    ) -> Self {
        Self {
            records,
            attachments,
            registry,
            config,
        }
    }

    /// Apply a batch with no file uploads.
    pub fn process(
        &self,
        principal: &str,
        parent_dataset: &str,
        parent_id: i64,
        batch: RelationBatch,
    ) -> Result<BatchResult, DataError> {
        self.check_preconditions(principal, parent_dataset, parent_id, &batch)?;
        Ok(self.run(principal, parent_dataset, parent_id, batch, &InternalFieldSet::new()))
    }

    /// Apply a batch together with its uploaded attachment files.
    ///
    /// All uploads are validated and saved before any record is touched;
    /// a failed save rolls back the files saved earlier in this request and
    /// rejects the whole call.
    pub fn process_with_uploads(
        &self,
        principal: &str,
        parent_dataset: &str,
        parent_id: i64,
        mut batch: RelationBatch,
        files: &[UploadedFile],
    ) -> Result<BatchResult, DataError> {
        self.check_preconditions(principal, parent_dataset, parent_id, &batch)?;

        let targets = resolve_upload_targets(&batch, files)?;
        let coordinator = AttachmentCoordinator::new(self.attachments, self.config);
        coordinator.validate_all(parent_dataset, files)?;
        let saved = coordinator.save_all(parent_dataset, files)?;

        let mut internal = InternalFieldSet::new();
        for (upload, target) in saved.iter().zip(&targets) {
            let Some(relation) = batch.get_mut(&target.table) else {
                continue;
            };
            let record = &mut relation.records[target.index];
            let reference = attachment_ref(&upload.slug);
            record
                .properties
                .insert(target.field.clone(), reference.clone());
            record
                .wire
                .insert(format!("{}__{}", target.table, target.field), reference);
            record.uploaded_refs.push(upload.slug.clone());

            if let Some(audit_field) = self.config.audit_field(&target.field) {
                let prefixed = format!("{}__{}", target.table, audit_field);
                let principal_value = Value::String(principal.to_string());
                record
                    .properties
                    .insert(audit_field, principal_value.clone());
                record.wire.insert(prefixed.clone(), principal_value);
                internal.insert(prefixed);
            }
        }

        Ok(self.run(principal, parent_dataset, parent_id, batch, &internal))
    }

    /// Read the current relation records of a parent, per child table.
    ///
    /// `tables` pairs each child table with its foreign-key field name.
    /// Unreadable tables yield an empty record list rather than failing the
    /// other tables.
    pub fn relation_values(
        &self,
        principal: &str,
        parent_dataset: &str,
        parent_id: i64,
        tables: &[(String, String)],
    ) -> Result<RelationValues, DataError> {
        for (table, _) in tables {
            self.check_declared(parent_dataset, table)?;
        }

        let no_internal = InternalFieldSet::new();
        let mut results = Vec::with_capacity(tables.len());
        for (table, fk_field) in tables {
            let filter = RecordFilter::equals(fk_field.as_str(), parent_id);
            let mut records = Vec::new();
            match self.records.index(principal, table, Some(&filter)) {
                Ok(mut features) => {
                    features.sort_by_key(|feature| feature.id);
                    for feature in &features {
                        records.push(Value::Object(flatten_record(table, feature, &no_internal)));
                    }
                }
                Err(err) => {
                    warn!("could not read relation values of {}: {}", table, err);
                }
            }
            results.push((
                table.clone(),
                TableResult {
                    fk: fk_field.clone(),
                    records,
                },
            ));
        }
        Ok(RelationValues { tables: results })
    }

    fn check_preconditions(
        &self,
        principal: &str,
        parent_dataset: &str,
        parent_id: i64,
        batch: &RelationBatch,
    ) -> Result<(), DataError> {
        if !self.records.is_editable(principal, parent_dataset, parent_id) {
            return Err(DataError::Permission);
        }
        for table in batch.table_names() {
            self.check_declared(parent_dataset, table)?;
        }
        Ok(())
    }

    fn check_declared(&self, parent_dataset: &str, table: &str) -> Result<(), DataError> {
        if self.registry.is_child(parent_dataset, table) {
            Ok(())
        } else {
            Err(DataError::Validation(format!(
                "'{}' is not a relation table of dataset '{}'",
                table, parent_dataset
            )))
        }
    }

    fn run(
        &self,
        principal: &str,
        parent_dataset: &str,
        parent_id: i64,
        batch: RelationBatch,
        internal: &InternalFieldSet,
    ) -> BatchResult {
        let coordinator = AttachmentCoordinator::new(self.attachments, self.config);
        let mut success = true;
        let mut tables = Vec::with_capacity(batch.tables.len());

        for (table, relation) in batch.tables {
            let table_internal = internal.scoped(&format!("{}__", table));
            let mut records = Vec::with_capacity(relation.records.len());

            for record in relation.records {
                let (wire, ok) = self.apply_record(
                    principal,
                    parent_dataset,
                    parent_id,
                    &table,
                    &relation.fk_field,
                    &table_internal,
                    &coordinator,
                    record,
                );
                success = success && ok;
                records.push(wire);
            }

            tables.push((
                table,
                TableResult {
                    fk: relation.fk_field,
                    records,
                },
            ));
        }

        BatchResult { success, tables }
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_record(
        &self,
        principal: &str,
        parent_dataset: &str,
        parent_id: i64,
        table: &str,
        fk_field: &str,
        table_internal: &InternalFieldSet,
        coordinator: &AttachmentCoordinator<'_>,
        mut record: RelationRecordEdit,
    ) -> (Value, bool) {
        let fk_value = Value::from(parent_id);

        // New records belong to the parent by definition; the foreign key is
        // force-set before validation.
        if record.status == EditStatus::New {
            record
                .properties
                .insert(fk_field.to_string(), fk_value.clone());
            record
                .wire
                .insert(format!("{}__{}", table, fk_field), fk_value.clone());
        }

        if record.properties.get(fk_field) != Some(&fk_value) {
            let mut wire = record.wire;
            wire.insert(
                "__error__".into(),
                Value::String("FK validation failed".into()),
            );
            return (Value::Object(wire), false);
        }

        match record.status {
            EditStatus::Unchanged => (Value::Object(record.wire), true),
            EditStatus::New => {
                let feature = FeatureRecord::new(record.properties.clone());
                match self
                    .records
                    .create(principal, table, &feature, table_internal)
                {
                    Ok(created) => (
                        Value::Object(flatten_record(table, &created, table_internal)),
                        true,
                    ),
                    Err(err) => {
                        coordinator.cleanup(parent_dataset, record.uploaded_refs.clone());
                        (error_record(record.wire, &err), false)
                    }
                }
            }
            EditStatus::Changed => {
                let Some(id) = record.id else {
                    return (missing_id_record(record.wire), false);
                };
                let mut feature = FeatureRecord::with_id(id, record.properties.clone());
                let mut internal_fields = table_internal.clone();
                let diff = self.stored_diff(
                    principal,
                    table,
                    id,
                    &mut feature,
                    &mut internal_fields,
                    coordinator,
                    false,
                );

                match self
                    .records
                    .update(principal, table, id, &feature, &internal_fields)
                {
                    Ok(updated) => {
                        coordinator.cleanup(parent_dataset, diff.old_refs);
                        (
                            Value::Object(flatten_record(table, &updated, &internal_fields)),
                            true,
                        )
                    }
                    Err(err) => {
                        let refs = merge_refs(diff.new_refs, &record.uploaded_refs);
                        coordinator.cleanup(parent_dataset, refs);
                        (error_record(record.wire, &err), false)
                    }
                }
            }
            EditStatus::Deleted => {
                let Some(id) = record.id else {
                    return (missing_id_record(record.wire), false);
                };
                let mut feature = FeatureRecord::with_id(id, record.properties.clone());
                let mut internal_fields = table_internal.clone();
                let diff = self.stored_diff(
                    principal,
                    table,
                    id,
                    &mut feature,
                    &mut internal_fields,
                    coordinator,
                    true,
                );

                // Persist the audit trail before the row disappears;
                // best-effort, the delete proceeds either way.
                if self.config.upload_user_field_suffix.is_some() {
                    if let Err(err) =
                        self.records
                            .update(principal, table, id, &feature, &internal_fields)
                    {
                        debug!("audit update before delete failed: {}", err);
                    }
                }

                match self.records.destroy(principal, table, id) {
                    Ok(()) => {
                        coordinator.cleanup(parent_dataset, diff.old_refs);
                        (Value::Object(record.wire), true)
                    }
                    Err(err) => {
                        let refs = merge_refs(diff.new_refs, &record.uploaded_refs);
                        coordinator.cleanup(parent_dataset, refs);
                        (error_record(record.wire, &err), false)
                    }
                }
            }
        }
    }

    /// Diff a record against its current stored state, merging the resulting
    /// audit fields into the outgoing feature and internal field set.
    #[allow(clippy::too_many_arguments)]
    fn stored_diff(
        &self,
        principal: &str,
        table: &str,
        id: i64,
        feature: &mut FeatureRecord,
        internal_fields: &mut InternalFieldSet,
        coordinator: &AttachmentCoordinator<'_>,
        force_all_changed: bool,
    ) -> crate::attachment::AttachmentDiff {
        let previous = match self.records.show(principal, table, id) {
            Ok(previous) => previous,
            Err(err) => {
                warn!("could not load previous state of {}:{}: {}", table, id, err);
                None
            }
        };
        let Some(previous) = previous else {
            return crate::attachment::AttachmentDiff::default();
        };

        let diff = coordinator.diff(&previous, feature, principal, force_all_changed);
        for (field, value) in &diff.audit_fields {
            feature.properties.insert(field.clone(), value.clone());
            internal_fields.insert(field.clone());
        }
        diff
    }
}

/// Map each uploaded file to the batch record it addresses. Unresolvable
/// keys reject the request before any file is saved.
fn resolve_upload_targets(
    batch: &RelationBatch,
    files: &[UploadedFile],
) -> Result<Vec<UploadTarget>, DataError> {
    let mut targets = Vec::with_capacity(files.len());
    for file in files {
        let Some(target) = parse_upload_key(&file.field_key) else {
            return Err(DataError::Validation(format!(
                "invalid upload field key '{}'",
                file.field_key
            )));
        };
        let record_count = batch
            .tables
            .iter()
            .find(|(table, _)| *table == target.table)
            .map(|(_, relation)| relation.records.len());
        match record_count {
            Some(count) if target.index < count => targets.push(target),
            _ => {
                return Err(DataError::Validation(format!(
                    "upload '{}' does not address a batch record",
                    file.field_key
                )));
            }
        }
    }
    Ok(targets)
}

fn error_record(mut wire: Map<String, Value>, err: &StoreError) -> Value {
    wire.insert("error".into(), Value::String(err.to_string()));
    wire.insert(
        "error_details".into(),
        Value::Array(err.details().into_iter().map(Value::String).collect()),
    );
    Value::Object(wire)
}

fn missing_id_record(mut wire: Map<String, Value>) -> Value {
    wire.insert(
        "error".into(),
        Value::String("record id is required for this status".into()),
    );
    wire.insert("error_details".into(), Value::Array(Vec::new()));
    Value::Object(wire)
}

fn merge_refs(mut refs: Vec<String>, extra: &[String]) -> Vec<String> {
    for slug in extra {
        if !refs.contains(slug) {
            refs.push(slug.clone());
        }
    }
    refs
}
