//! FeatureEditor - Direct create/update/delete of one record with
//! attachment fields.
//!
//! The non-batched sibling of the relation batch processor; it shares the
//! attachment diff logic, so replacing an attachment on update removes the
//! superseded file and a failed write rolls back the files saved for it.

use log::{debug, warn};

use crate::attachment::{AttachmentCoordinator, AttachmentStore, SavedUpload, UploadedFile};
use crate::config::EditConfig;
use crate::error::DataError;
use crate::feature::FeatureRecord;
use crate::store::RecordStore;

pub struct FeatureEditor<'a> {
    records: &'a dyn RecordStore,
    attachments: &'a dyn AttachmentStore,
    config: &'a EditConfig,
}

impl<'a> FeatureEditor<'a> {
    pub fn new(
        records: &'a dyn RecordStore,
        attachments: &'a dyn AttachmentStore,
        config: &'a EditConfig,
    ) -> Self {
        Self {
            records,
            attachments,
            config,
        }
    }

    /// Create a record, saving and binding its uploaded attachment files
    /// first. A failed create rolls the saved files back.
    pub fn create(
        &self,
        principal: &str,
        dataset: &str,
        mut feature: FeatureRecord,
        files: &[UploadedFile],
    ) -> Result<FeatureRecord, DataError> {
        let coordinator = AttachmentCoordinator::new(self.attachments, self.config);
        coordinator.validate_all(dataset, files)?;
        let saved = coordinator.save_all(dataset, files)?;
        let internal = coordinator.bind_into_feature(&mut feature, &saved, principal);

        match self.records.create(principal, dataset, &feature, &internal) {
            Ok(mut created) => {
                created.strip_internal_fields(&internal);
                Ok(created)
            }
            Err(err) => {
                coordinator.cleanup(dataset, saved_slugs(&saved));
                Err(err.into())
            }
        }
    }

    /// Update a record. The incoming properties are always diffed against
    /// the previous stored state, so attachment replacement is detected even
    /// without any status marker; on success the superseded files are
    /// removed, on failure the files saved for this call are.
    pub fn update(
        &self,
        principal: &str,
        dataset: &str,
        id: i64,
        mut feature: FeatureRecord,
        files: &[UploadedFile],
    ) -> Result<FeatureRecord, DataError> {
        let coordinator = AttachmentCoordinator::new(self.attachments, self.config);
        coordinator.validate_all(dataset, files)?;
        let saved = coordinator.save_all(dataset, files)?;
        let mut internal = coordinator.bind_into_feature(&mut feature, &saved, principal);

        let previous = self.previous_state(principal, dataset, id);
        let diff = previous
            .map(|previous| coordinator.diff(&previous, &feature, principal, false))
            .unwrap_or_default();
        for (field, value) in &diff.audit_fields {
            feature.properties.insert(field.clone(), value.clone());
            internal.insert(field.clone());
        }

        match self
            .records
            .update(principal, dataset, id, &feature, &internal)
        {
            Ok(mut updated) => {
                coordinator.cleanup(dataset, diff.old_refs);
                updated.strip_internal_fields(&internal);
                Ok(updated)
            }
            Err(err) => {
                let mut refs = diff.new_refs;
                for slug in saved_slugs(&saved) {
                    if !refs.contains(&slug) {
                        refs.push(slug);
                    }
                }
                coordinator.cleanup(dataset, refs);
                Err(err.into())
            }
        }
    }

    /// Delete a record, removing the attachment files it referenced once
    /// the delete has succeeded.
    pub fn delete(&self, principal: &str, dataset: &str, id: i64) -> Result<(), DataError> {
        let coordinator = AttachmentCoordinator::new(self.attachments, self.config);

        let previous = self.previous_state(principal, dataset, id);
        let diff = previous
            .as_ref()
            .map(|previous| {
                // The record is going away: every attachment field counts as
                // discarded.
                let echo = FeatureRecord::with_id(id, previous.properties.clone());
                coordinator.diff(previous, &echo, principal, true)
            })
            .unwrap_or_default();

        if !diff.audit_fields.is_empty() {
            let audit = FeatureRecord::with_id(id, diff.audit_fields.clone());
            let internal = diff.audit_fields.keys().cloned().collect();
            if let Err(err) = self.records.update(principal, dataset, id, &audit, &internal) {
                debug!("audit update before delete failed: {}", err);
            }
        }

        match self.records.destroy(principal, dataset, id) {
            Ok(()) => {
                coordinator.cleanup(dataset, diff.old_refs);
                Ok(())
            }
            Err(err) => {
                coordinator.cleanup(dataset, diff.new_refs);
                Err(err.into())
            }
        }
    }

    fn previous_state(&self, principal: &str, dataset: &str, id: i64) -> Option<FeatureRecord> {
        match self.records.show(principal, dataset, id) {
            Ok(previous) => previous,
            Err(err) => {
                warn!(
                    "could not load previous state of {}:{}: {}",
                    dataset, id, err
                );
                None
            }
        }
    }
}

fn saved_slugs(saved: &[SavedUpload]) -> Vec<String> {
    saved.iter().map(|upload| upload.slug.clone()).collect()
}
