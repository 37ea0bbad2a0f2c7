//! InMemoryAttachmentStore - HashMap-backed attachment store for testing.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use log::warn;
use uuid::Uuid;

use super::{AttachmentStore, UploadedFile};

#[derive(Default)]
struct Inner {
    // dataset -> slug -> data
    files: HashMap<String, HashMap<String, Vec<u8>>>,
    reject_names: HashSet<String>,
    fail_names: HashSet<String>,
}

/// In-memory attachment store. Clone-friendly via Arc.
///
/// Tests can mark file names as rejected (validation failure) or failing
/// (save failure), and inspect the stored slugs to assert rollback behavior.
#[derive(Clone, Default)]
pub struct InMemoryAttachmentStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryAttachmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `validate` reject files with this name.
    pub fn reject_file(&self, file_name: &str) {
        if let Ok(mut inner) = self.inner.write() {
            inner.reject_names.insert(file_name.to_string());
        }
    }

    /// Make `save` fail for files with this name.
    pub fn fail_file(&self, file_name: &str) {
        if let Ok(mut inner) = self.inner.write() {
            inner.fail_names.insert(file_name.to_string());
        }
    }

    /// Store a file under a fixed slug, bypassing `save`.
    pub fn seed(&self, dataset: &str, slug: &str, data: Vec<u8>) {
        if let Ok(mut inner) = self.inner.write() {
            inner
                .files
                .entry(dataset.to_string())
                .or_default()
                .insert(slug.to_string(), data);
        }
    }

    /// Slugs currently stored for a dataset, sorted.
    pub fn slugs(&self, dataset: &str) -> Vec<String> {
        let Ok(inner) = self.inner.read() else {
            return Vec::new();
        };
        let mut slugs: Vec<String> = inner
            .files
            .get(dataset)
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default();
        slugs.sort();
        slugs
    }

    pub fn has_slug(&self, dataset: &str, slug: &str) -> bool {
        self.inner
            .read()
            .map(|inner| {
                inner
                    .files
                    .get(dataset)
                    .map_or(false, |files| files.contains_key(slug))
            })
            .unwrap_or(false)
    }
}

impl AttachmentStore for InMemoryAttachmentStore {
    fn validate(&self, _dataset: &str, file: &UploadedFile) -> bool {
        self.inner
            .read()
            .map(|inner| !inner.reject_names.contains(&file.file_name))
            .unwrap_or(false)
    }

    fn save(&self, dataset: &str, file: &UploadedFile) -> Option<String> {
        let Ok(mut inner) = self.inner.write() else {
            return None;
        };
        if inner.fail_names.contains(&file.file_name) {
            return None;
        }
        let slug = format!("{}/{}", Uuid::new_v4().simple(), file.file_name);
        inner
            .files
            .entry(dataset.to_string())
            .or_default()
            .insert(slug.clone(), file.data.clone());
        Some(slug)
    }

    fn remove(&self, dataset: &str, slug: &str) -> bool {
        let Ok(mut inner) = self.inner.write() else {
            return false;
        };
        let removed = inner
            .files
            .get_mut(dataset)
            .map_or(false, |files| files.remove(slug).is_some());
        if !removed {
            warn!("could not remove attachment: {}", slug);
        }
        removed
    }

    fn resolve(&self, dataset: &str, slug: &str) -> Option<PathBuf> {
        if self.has_slug(dataset, slug) {
            Some(PathBuf::from(format!("{}/{}", dataset, slug)))
        } else {
            None
        }
    }
}
