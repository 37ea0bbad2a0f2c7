use std::fmt;

use crate::attachment::AttachmentError;
use crate::store::StoreError;

/// Request-level error: rejects the whole call before (or instead of) any
/// record mutation. Per-record failures inside a batch are not `DataError`s;
/// they are reported inline in the batch result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataError {
    /// Malformed payload shape (batch is not an object, unknown status tag,
    /// undeclared relation table, unresolvable upload key).
    Validation(String),
    /// Parent or child record not found or not editable by the principal.
    Permission,
    /// Attachment validation or save failed; aborts before any record store
    /// call since attachments are prerequisite data.
    Attachment(AttachmentError),
    /// Store failure for a single-record edit, carrying the store's
    /// code and details.
    Store(StoreError),
}

impl fmt::Display for DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataError::Validation(message) => write!(f, "validation error: {}", message),
            DataError::Permission => {
                write!(f, "dataset or feature not found or permission error")
            }
            DataError::Attachment(err) => write!(f, "{}", err),
            DataError::Store(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for DataError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DataError::Attachment(err) => Some(err),
            DataError::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<AttachmentError> for DataError {
    fn from(err: AttachmentError) -> Self {
        DataError::Attachment(err)
    }
}

impl From<StoreError> for DataError {
    fn from(err: StoreError) -> Self {
        DataError::Store(err)
    }
}
