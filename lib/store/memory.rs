//! In-process [`ObjectStore`] and [`IndexStore`].
//!
//! Objects are keyed by SHA-256 over git's blob framing (`blob <len>\0<content>`). Each index is
//! a [`BTreeMap`] keyed by path, so listings come out sorted for free.

use std::collections::BTreeMap;

use bytes::Bytes;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use sha2::{Digest as _, Sha256};
use tracing::trace;

use crate::store::{IndexEntry, IndexStore, ListScope, ObjectId, ObjectStore, StoreError};

type Index = BTreeMap<String, IndexEntry>;

/// A store that keeps every object and index in memory.
///
/// Shareable across sessions (wrap in an `Arc`); each call takes a short lock.
#[derive(Debug)]
pub struct MemoryStore {
    repository: String,
    objects: Mutex<FxHashMap<ObjectId, Bytes>>,
    indexes: Mutex<FxHashMap<String, Index>>,
}

impl MemoryStore {
    /// Create an empty store identified as `repository`.
    #[must_use]
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            objects: Mutex::new(FxHashMap::default()),
            indexes: Mutex::new(FxHashMap::default()),
        }
    }

    /// Compute the id `content` would be stored under.
    #[must_use]
    pub fn object_id(content: &[u8]) -> ObjectId {
        let mut hasher = Sha256::new();
        hasher.update(format!("blob {}\0", content.len()).as_bytes());
        hasher.update(content);
        ObjectId(hex::encode(hasher.finalize()))
    }

    /// Number of distinct objects stored.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.objects.lock().len()
    }

    fn validate(change: &IndexEntry) -> Result<(), StoreError> {
        let path = change.path.as_str();
        if path.is_empty() || path.starts_with('/') || path.split('/').any(str::is_empty) {
            return Err(StoreError::Rejected(format!("invalid entry path {path:?}")));
        }
        if change.mode == crate::store::FileMode::Removed && !change.object.is_null() {
            return Err(StoreError::Rejected(format!(
                "removal of {path:?} must use the null object"
            )));
        }
        Ok(())
    }
}

impl ObjectStore for MemoryStore {
    fn repository(&self) -> &str {
        &self.repository
    }

    fn read(&self, id: &ObjectId) -> Result<Bytes, StoreError> {
        self.objects
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::ObjectNotFound(id.clone()))
    }

    fn write(&self, content: &[u8]) -> Result<ObjectId, StoreError> {
        let id = Self::object_id(content);
        self.objects
            .lock()
            .entry(id.clone())
            .or_insert_with(|| Bytes::copy_from_slice(content));
        Ok(id)
    }
}

impl IndexStore for MemoryStore {
    fn list_entries(
        &self,
        index: &str,
        path: &str,
        scope: ListScope,
    ) -> Result<Vec<IndexEntry>, StoreError> {
        let indexes = self.indexes.lock();
        let Some(entries) = indexes.get(index) else {
            return Ok(Vec::new());
        };

        // Everything in scope sorts at or after `path` itself. A sibling such as `a-b` may sit
        // between `a` and `a/...`, so filter rather than stop at the first miss.
        Ok(entries
            .range(path.to_owned()..)
            .take_while(|(candidate, _)| candidate.starts_with(path))
            .filter(|(candidate, _)| scope.matches(path, candidate))
            .map(|(_, entry)| entry.clone())
            .collect())
    }

    fn update_entries(&self, index: &str, changes: &[IndexEntry]) -> Result<(), StoreError> {
        for change in changes {
            Self::validate(change)?;
        }

        let mut indexes = self.indexes.lock();
        let entries = indexes.entry(index.to_owned()).or_default();
        for change in changes {
            if change.is_tombstone() {
                trace!(index, path = %change.path, "removing entry");
                entries.remove(&change.path);
            } else {
                trace!(index, path = %change.path, object = %change.object, "staging entry");
                entries.insert(change.path.clone(), change.clone());
            }
        }
        Ok(())
    }
}
