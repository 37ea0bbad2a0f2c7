//! Dataset feature editing core.
//!
//! Applies create/update/delete operations to dataset records ("features"),
//! either one record at a time ([`FeatureEditor`]) or as a batch across the
//! relation tables of a parent record ([`RelationBatchProcessor`]), while
//! keeping attachment files consistent with the references committed into
//! records: newly saved files are rolled back when a write fails, and
//! superseded or orphaned files are removed when a write succeeds.
//!
//! Persistence and file storage are external collaborators behind the
//! [`RecordStore`] and [`AttachmentStore`] traits; in-memory implementations
//! back tests and development.

mod attachment;
mod config;
mod editor;
mod error;
mod feature;
mod relation;
mod store;

pub use attachment::{
    AttachmentCoordinator, AttachmentDiff, AttachmentError, AttachmentStore, FsAttachmentStore,
    InMemoryAttachmentStore, SavedUpload, UploadedFile,
};
pub use config::EditConfig;
pub use editor::FeatureEditor;
pub use error::DataError;
pub use feature::{
    attachment_ref, attachment_slug, FeatureRecord, Geometry, InternalFieldSet, ATTACHMENT_PREFIX,
};
pub use relation::{
    decode_batch, parse_upload_key, BatchResult, EditStatus, RelationBatch, RelationBatchProcessor,
    RelationRecordEdit, RelationRegistry, RelationTable, RelationValues, TableResult, UploadTarget,
};
pub use store::{InMemoryRecordStore, RecordFilter, RecordStore, StoreError};
