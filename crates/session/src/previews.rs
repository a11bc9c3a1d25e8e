//! In-memory image previews addressed by opaque handles.
//!
//! Front ends register the bytes of a selected input image and get a
//! handle back; the decoded output of a completed job is registered by the
//! controller. Every handle is released when a new job is submitted, on
//! reset, and on dispose.

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

/// Handle to one registered preview.
pub type PreviewId = Uuid;

/// Raw image bytes plus their mime type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub mime: String,
    pub bytes: Arc<[u8]>,
}

#[derive(Debug, Default)]
pub struct PreviewStore {
    entries: HashMap<PreviewId, Preview>,
}

impl PreviewStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, mime: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> PreviewId {
        let id = Uuid::new_v4();
        self.entries.insert(
            id,
            Preview {
                mime: mime.into(),
                bytes: bytes.into(),
            },
        );
        id
    }

    pub fn get(&self, id: &PreviewId) -> Option<Preview> {
        self.entries.get(id).cloned()
    }

    /// Release one handle. Returns whether it was registered.
    pub fn release(&mut self, id: &PreviewId) -> bool {
        self.entries.remove(id).is_some()
    }

    /// Release every handle, returning how many were held.
    pub fn release_all(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
