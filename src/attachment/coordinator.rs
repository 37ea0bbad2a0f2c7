//! AttachmentCoordinator - Keeps attachment files synchronized with the
//! references committed into records.
//!
//! The coordinator decides *what* to save, bind, and roll back; the actual
//! file mechanics (and any retries) belong to the [`AttachmentStore`].

use log::{debug, warn};
use serde_json::{Map, Value};

use super::{AttachmentError, AttachmentStore, UploadedFile};
use crate::config::EditConfig;
use crate::feature::{attachment_ref, attachment_slug, FeatureRecord, InternalFieldSet};

/// One successfully saved upload: the originating field key, the bare field
/// name, and the slug minted by the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SavedUpload {
    pub field_key: String,
    pub field: String,
    pub slug: String,
}

/// Attachment reference changes between a record's previous and updated
/// state.
///
/// A field whose reference was replaced appears on both sides. `audit_fields`
/// carries the synthetic `<field>__<suffix>` properties recording who
/// discarded the old reference; callers merge them into the outgoing record
/// and register them as internal fields.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AttachmentDiff {
    pub new_refs: Vec<String>,
    pub old_refs: Vec<String>,
    pub audit_fields: Map<String, Value>,
}

pub struct AttachmentCoordinator<'a> {
    store: &'a dyn AttachmentStore,
    config: &'a EditConfig,
}

impl<'a> AttachmentCoordinator<'a> {
    pub fn new(store: &'a dyn AttachmentStore, config: &'a EditConfig) -> Self {
        Self { store, config }
    }

    /// Check every uploaded file before any is saved. Fail-fast: the whole
    /// batch must validate, no partial saves.
    pub fn validate_all(
        &self,
        dataset: &str,
        files: &[UploadedFile],
    ) -> Result<(), AttachmentError> {
        for file in files {
            if !self.store.validate(dataset, file) {
                return Err(AttachmentError::ValidationFailed {
                    field_key: file.field_key.clone(),
                });
            }
        }
        Ok(())
    }

    /// Save all uploaded files in input order. If any save fails, every slug
    /// saved by this call is removed before reporting the failure.
    pub fn save_all(
        &self,
        dataset: &str,
        files: &[UploadedFile],
    ) -> Result<Vec<SavedUpload>, AttachmentError> {
        let mut saved: Vec<SavedUpload> = Vec::with_capacity(files.len());
        for file in files {
            match self.store.save(dataset, file) {
                Some(slug) => saved.push(SavedUpload {
                    field_key: file.field_key.clone(),
                    field: file.field().to_string(),
                    slug,
                }),
                None => {
                    self.cleanup(dataset, saved.iter().map(|s| s.slug.clone()));
                    return Err(AttachmentError::SaveFailed {
                        field_key: file.field_key.clone(),
                    });
                }
            }
        }
        Ok(saved)
    }

    /// Rewrite record properties to reference the saved files, adding audit
    /// fields for the acting principal when configured. Returns the set of
    /// synthetic fields to strip from responses.
    pub fn bind_into_feature(
        &self,
        feature: &mut FeatureRecord,
        saved: &[SavedUpload],
        principal: &str,
    ) -> InternalFieldSet {
        let mut internal = InternalFieldSet::new();
        for upload in saved {
            feature
                .properties
                .insert(upload.field.clone(), attachment_ref(&upload.slug));
            if let Some(audit_field) = self.config.audit_field(&upload.field) {
                feature
                    .properties
                    .insert(audit_field.clone(), Value::String(principal.to_string()));
                internal.insert(audit_field);
            }
        }
        internal
    }

    /// Compare attachment references field-by-field between the previous
    /// stored state and the updated record.
    ///
    /// With `force_all_changed` (record being deleted) every previous
    /// attachment reference counts as discarded; the new side still only
    /// collects references that are genuinely uncommitted, so a failed delete
    /// never rolls back a file the surviving record still points at.
    pub fn diff(
        &self,
        previous: &FeatureRecord,
        updated: &FeatureRecord,
        principal: &str,
        force_all_changed: bool,
    ) -> AttachmentDiff {
        let mut diff = AttachmentDiff::default();
        for (key, new_value) in &updated.properties {
            let prev_value = previous.properties.get(key);
            let changed = prev_value != Some(new_value);

            if changed || force_all_changed {
                if let Some(slug) = prev_value.and_then(attachment_slug) {
                    diff.old_refs.push(slug.to_string());
                    if let Some(audit_field) = self.config.audit_field(key) {
                        diff.audit_fields
                            .insert(audit_field, Value::String(principal.to_string()));
                    }
                }
            }
            if changed {
                if let Some(slug) = attachment_slug(new_value) {
                    diff.new_refs.push(slug.to_string());
                }
            }
        }
        diff
    }

    /// Remove the files behind a set of references. Best-effort: the record
    /// mutation that triggered the cleanup has already settled, so failures
    /// are surfaced in the log but never propagate.
    pub fn cleanup(&self, dataset: &str, slugs: impl IntoIterator<Item = String>) {
        for slug in slugs {
            if self.store.remove(dataset, &slug) {
                debug!("cleaned up attachment: {}", slug);
            } else {
                warn!("could not clean up attachment: {}", slug);
            }
        }
    }
}
