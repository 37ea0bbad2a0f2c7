//! AttachmentStore - Abstract storage for attachment files.

use std::path::PathBuf;

/// One uploaded file, addressed by its multipart field key.
///
/// Field keys carry an optional `file:` prefix on the wire
/// (`file:photo` for single-record edits,
/// `file:<table>__<field>__<index>` for relation batches).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadedFile {
    pub field_key: String,
    pub file_name: String,
    pub data: Vec<u8>,
}

impl UploadedFile {
    pub fn new(
        field_key: impl Into<String>,
        file_name: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        Self {
            field_key: field_key.into(),
            file_name: file_name.into(),
            data,
        }
    }

    /// Field key without the wire `file:` prefix.
    pub fn field(&self) -> &str {
        self.field_key
            .strip_prefix("file:")
            .unwrap_or(&self.field_key)
    }
}

/// Abstract storage for attachment files.
///
/// Slugs minted by `save` are opaque to callers; they are only compared,
/// recorded, and passed back to `remove`/`resolve`.
pub trait AttachmentStore: Send + Sync {
    /// Check an uploaded file against the dataset's acceptance rules.
    fn validate(&self, dataset: &str, file: &UploadedFile) -> bool;

    /// Persist an uploaded file and return its slug, or None on failure.
    fn save(&self, dataset: &str, file: &UploadedFile) -> Option<String>;

    /// Remove the file stored under a slug. Returns false if nothing could
    /// be removed.
    fn remove(&self, dataset: &str, slug: &str) -> bool;

    /// Resolve a slug to a retrievable path, or None if absent.
    fn resolve(&self, dataset: &str, slug: &str) -> Option<PathBuf>;
}
