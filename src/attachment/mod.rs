//! Attachment storage and lifecycle.
//!
//! The [`AttachmentStore`] trait is the seam to the file storage mechanics;
//! [`AttachmentCoordinator`] keeps files on disk synchronized with the
//! attachment references actually committed into records.

mod coordinator;
mod fs;
mod in_memory;
mod store;

use std::fmt;

pub use coordinator::{AttachmentCoordinator, AttachmentDiff, SavedUpload};
pub use fs::FsAttachmentStore;
pub use in_memory::InMemoryAttachmentStore;
pub use store::{AttachmentStore, UploadedFile};

/// Error type for attachment validation and save operations.
///
/// Both variants are request-fatal: the whole edit is rejected before any
/// record store call, since attachments are prerequisite data for the records
/// that reference them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentError {
    /// An uploaded file was rejected by the store's acceptance rules.
    ValidationFailed { field_key: String },
    /// An uploaded file could not be saved; files saved earlier in the same
    /// request have already been rolled back.
    SaveFailed { field_key: String },
}

impl fmt::Display for AttachmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachmentError::ValidationFailed { field_key } => {
                write!(f, "attachment validation failed: {}", field_key)
            }
            AttachmentError::SaveFailed { field_key } => {
                write!(f, "failed to save attachment: {}", field_key)
            }
        }
    }
}

impl std::error::Error for AttachmentError {}
