//! FsAttachmentStore - Filesystem-backed attachment storage.

use std::fs;
use std::path::{Path, PathBuf};

use log::{error, info};
use uuid::Uuid;

use super::{AttachmentStore, UploadedFile};

const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Filesystem attachment store.
///
/// Files are stored under `<base>/<dataset>/<slug>`, where the slug is a
/// freshly minted directory name joined with the sanitized file name. One
/// slug directory holds exactly one file.
pub struct FsAttachmentStore {
    base_dir: PathBuf,
    max_file_size: u64,
}

impl FsAttachmentStore {
    /// Create a store rooted at the given base directory.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }

    /// Create a store from the `ATTACHMENTS_BASE_DIR` and
    /// `MAX_ATTACHMENT_FILE_SIZE` environment variables.
    pub fn from_env() -> Self {
        let base_dir = std::env::var("ATTACHMENTS_BASE_DIR")
            .unwrap_or_else(|_| "/tmp/attachments/".to_string());
        let max_file_size = std::env::var("MAX_ATTACHMENT_FILE_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_FILE_SIZE);
        Self {
            base_dir: base_dir.into(),
            max_file_size,
        }
    }

    pub fn with_max_file_size(mut self, max_file_size: u64) -> Self {
        self.max_file_size = max_file_size;
        self
    }

    fn dataset_dir(&self, dataset: &str) -> PathBuf {
        self.base_dir.join(dataset)
    }

    /// Slugs come back from clients; only plain relative paths below the
    /// dataset directory are acceptable.
    fn slug_path(&self, dataset: &str, slug: &str) -> Option<PathBuf> {
        let relative = Path::new(slug);
        let safe = relative.components().all(|c| {
            matches!(c, std::path::Component::Normal(_))
        });
        if !safe {
            error!("rejecting unsafe attachment slug: {}", slug);
            return None;
        }
        Some(self.dataset_dir(dataset).join(relative))
    }
}

/// Keep file names to a conservative character set.
fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed.to_string()
    }
}

impl AttachmentStore for FsAttachmentStore {
    fn validate(&self, _dataset: &str, file: &UploadedFile) -> bool {
        file.data.len() as u64 <= self.max_file_size
    }

    fn save(&self, dataset: &str, file: &UploadedFile) -> Option<String> {
        let slug_dir = Uuid::new_v4().simple().to_string();
        let file_name = sanitize_file_name(&file.file_name);
        let target_dir = self.dataset_dir(dataset).join(&slug_dir);

        if let Err(err) = fs::create_dir_all(&target_dir) {
            error!("could not create attachment directory: {}", err);
            return None;
        }
        if let Err(err) = fs::write(target_dir.join(&file_name), &file.data) {
            error!("could not save attachment: {}", err);
            return None;
        }

        let slug = format!("{}/{}", slug_dir, file_name);
        info!("saved attachment: {}", slug);
        Some(slug)
    }

    fn remove(&self, dataset: &str, slug: &str) -> bool {
        let Some(path) = self.slug_path(dataset, slug) else {
            return false;
        };
        if let Err(err) = fs::remove_file(&path) {
            error!("could not remove attachment {}: {}", slug, err);
            return false;
        }
        info!("removed attachment: {}", slug);

        // Prune the slug directory; ignore failure, it may be shared or gone.
        if let Some(parent) = path.parent() {
            let _ = fs::remove_dir(parent);
        }
        true
    }

    fn resolve(&self, dataset: &str, slug: &str) -> Option<PathBuf> {
        let path = self.slug_path(dataset, slug)?;
        if path.is_file() {
            Some(path)
        } else {
            None
        }
    }
}
