#![allow(dead_code, missing_docs, clippy::unwrap_used)]

use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;
use tempfile::TempDir;

use git_indexfs::fs::IndexFs;
use git_indexfs::store::memory::MemoryStore;
use git_indexfs::store::{IndexEntry, IndexStore, ListScope, ObjectId, ObjectStore, StoreError};

pub const INDEX: &str = "test-index";

/// Wraps a [`MemoryStore`], recording every `update_entries` batch and optionally failing
/// object writes.
#[derive(Debug)]
pub struct RecordingStore {
    pub inner: MemoryStore,
    pub updates: Mutex<Vec<Vec<IndexEntry>>>,
    pub fail_writes: AtomicBool,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new("test-repo"),
            updates: Mutex::new(Vec::new()),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Number of update batches that touched `path`.
    pub fn updates_for(&self, path: &str) -> usize {
        self.updates
            .lock()
            .iter()
            .filter(|batch| batch.iter().any(|e| e.path == path))
            .count()
    }

    pub fn update_batches(&self) -> usize {
        self.updates.lock().len()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Exact entry at `path`, bypassing the filesystem layer.
    pub fn entry(&self, path: &str) -> Option<IndexEntry> {
        self.inner
            .list_entries(INDEX, path, ListScope::Subtree)
            .unwrap()
            .into_iter()
            .find(|e| e.path == path)
    }

    /// Every path in the index, sorted.
    pub fn paths(&self) -> Vec<String> {
        self.inner
            .list_entries(INDEX, "", ListScope::Subtree)
            .unwrap()
            .into_iter()
            .map(|e| e.path)
            .collect()
    }
}

impl ObjectStore for RecordingStore {
    fn repository(&self) -> &str {
        self.inner.repository()
    }

    fn read(&self, id: &ObjectId) -> Result<Bytes, StoreError> {
        self.inner.read(id)
    }

    fn write(&self, content: &[u8]) -> Result<ObjectId, StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected("injected write failure".to_owned()));
        }
        self.inner.write(content)
    }
}

impl IndexStore for RecordingStore {
    fn list_entries(
        &self,
        index: &str,
        path: &str,
        scope: ListScope,
    ) -> Result<Vec<IndexEntry>, StoreError> {
        self.inner.list_entries(index, path, scope)
    }

    fn update_entries(&self, index: &str, changes: &[IndexEntry]) -> Result<(), StoreError> {
        self.updates.lock().push(changes.to_vec());
        self.inner.update_entries(index, changes)
    }
}

/// A store that breaks the sorted-listing contract by reversing every listing.
#[derive(Debug)]
pub struct ReversedListingStore {
    pub inner: MemoryStore,
}

impl ObjectStore for ReversedListingStore {
    fn repository(&self) -> &str {
        self.inner.repository()
    }

    fn read(&self, id: &ObjectId) -> Result<Bytes, StoreError> {
        self.inner.read(id)
    }

    fn write(&self, content: &[u8]) -> Result<ObjectId, StoreError> {
        self.inner.write(content)
    }
}

impl IndexStore for ReversedListingStore {
    fn list_entries(
        &self,
        index: &str,
        path: &str,
        scope: ListScope,
    ) -> Result<Vec<IndexEntry>, StoreError> {
        let mut entries = self.inner.list_entries(index, path, scope)?;
        entries.reverse();
        Ok(entries)
    }

    fn update_entries(&self, index: &str, changes: &[IndexEntry]) -> Result<(), StoreError> {
        self.inner.update_entries(index, changes)
    }
}

/// A session over a fresh [`RecordingStore`] with scratch files in a temp dir.
///
/// Keep the returned `TempDir` alive for the duration of the test.
pub fn session() -> (IndexFs<RecordingStore>, TempDir) {
    session_with(RecordingStore::new())
}

pub fn session_with<S: ObjectStore + IndexStore>(store: S) -> (IndexFs<S>, TempDir) {
    let scratch = tempfile::tempdir().unwrap();
    let fs = IndexFs::new(store, INDEX).with_scratch_dir(scratch.path());
    (fs, scratch)
}

/// Names of the scratch files currently on disk.
pub fn scratch_files(dir: &TempDir) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
