//! A filesystem session over one index.
//!
//! [`IndexFs`] binds a store to an index identifier and owns the per-session state shared by
//! every node: the [`OpenFileRegistry`] and the [`ScratchArea`]. Nodes ([`IndexPath`]) are plain
//! descriptors; all I/O goes through the session.
//!
//! # Write-back
//!
//! Opening a path that no handle holds materialises its current content into a scratch file.
//! Every further handle on that path shares the same scratch file. Only when the last handle is
//! released is the scratch content written to the object store and the index pointed at it, in
//! one `update_entries` call. Concurrent writers therefore see last-writer-to-the-scratch-file
//! semantics; there is no merging.
//!
//! # Concurrency
//!
//! A session is `!Sync`. Share it within one thread, or wrap it in a lock.

use std::cell::{Cell, RefCell};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, error, instrument, trace, warn};

use crate::fs::open_files::{HandleId, OpenFileRegistry, Release};
use crate::fs::scratch::ScratchArea;
use crate::fs::{FileKind, IndexFsError, IndexPath, MkdirOptions, OpenFlags, PLACEHOLDER_NAME};
use crate::store::{FileMode, IndexEntry, IndexStore, ListScope, ObjectStore, StoreError};

/// A filesystem session over one index of one repository.
pub struct IndexFs<S: ObjectStore + IndexStore> {
    store: S,
    root: IndexPath,
    scratch: ScratchArea,
    open_files: RefCell<OpenFileRegistry>,
    next_handle: Cell<HandleId>,
}

impl<S: ObjectStore + IndexStore> IndexFs<S> {
    /// Start a session on `index`, using `store` for both objects and the index.
    ///
    /// Scratch files go next to the index file when `index` is a path with a parent, otherwise
    /// to the system temp dir; see [`IndexFs::with_scratch_dir`].
    pub fn new(store: S, index: impl Into<Arc<str>>) -> Self {
        let index: Arc<str> = index.into();
        let scratch = ScratchArea::for_index(&index);
        let root = IndexPath::root(store.repository(), index);
        Self {
            store,
            root,
            scratch,
            open_files: RefCell::new(OpenFileRegistry::new()),
            next_handle: Cell::new(1),
        }
    }

    /// Put scratch files in `dir`.
    #[must_use]
    pub fn with_scratch_dir(mut self, dir: impl Into<std::path::PathBuf>) -> Self {
        self.scratch = ScratchArea::new(dir, self.root.index());
        self
    }

    /// The backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The scratch area used by this session.
    pub fn scratch(&self) -> &ScratchArea {
        &self.scratch
    }

    /// The root node of this session.
    pub fn root(&self) -> IndexPath {
        self.root.clone()
    }

    /// A node for `path`, relative to the root.
    pub fn node(&self, path: &str) -> Result<IndexPath, IndexFsError> {
        self.root.join(path)
    }

    /// Number of live handles on `node`.
    pub fn live_handles(&self, node: &IndexPath) -> usize {
        self.open_files.borrow().live_handles(node.path())
    }

    /// Number of distinct paths with live handles.
    pub fn open_paths(&self) -> usize {
        self.open_files.borrow().len()
    }

    fn check(&self, node: &IndexPath) -> Result<(), IndexFsError> {
        if node.same_index(&self.root) {
            Ok(())
        } else {
            Err(IndexFsError::ForeignNode {
                repository: node.repository().to_owned(),
                index: node.index().to_owned(),
                path: node.path().to_owned(),
            })
        }
    }

    fn list(&self, node: &IndexPath, scope: ListScope) -> Result<Vec<IndexEntry>, IndexFsError> {
        self.check(node)?;
        Ok(self
            .store
            .list_entries(self.root.index(), node.path(), scope)?)
    }

    fn update(&self, changes: &[IndexEntry]) -> Result<(), IndexFsError> {
        Ok(self.store.update_entries(self.root.index(), changes)?)
    }

    /// The index entry exactly at `node`, if any.
    pub fn entry(&self, node: &IndexPath) -> Result<Option<IndexEntry>, IndexFsError> {
        if node.is_root() {
            self.check(node)?;
            return Ok(None);
        }
        Ok(self
            .list(node, ListScope::Subtree)?
            .into_iter()
            .find(|e| e.path == node.path()))
    }

    /// Whether `node` is the root, has an entry, or has descendants.
    #[instrument(name = "IndexFs::exists", skip(self, node), fields(path = node.path()))]
    pub fn exists(&self, node: &IndexPath) -> Result<bool, IndexFsError> {
        if node.is_root() {
            self.check(node)?;
            return Ok(true);
        }
        Ok(!self.list(node, ListScope::Subtree)?.is_empty())
    }

    /// Whether `node` is the root or has at least one descendant entry.
    ///
    /// An exact entry at `node` alone does not count: a file is never a directory, and a path
    /// is only ever a directory through the entries listed as its children. An empty directory
    /// therefore stays a directory only through its placeholder entry, and `rmdir` of the last
    /// child turns `is_dir` back to false.
    pub fn is_dir(&self, node: &IndexPath) -> Result<bool, IndexFsError> {
        if node.is_root() {
            self.check(node)?;
            return Ok(true);
        }
        Ok(!self.list(node, ListScope::Descendants)?.is_empty())
    }

    /// Whether `node` has an exact entry that is not a symlink.
    pub fn is_file(&self, node: &IndexPath) -> Result<bool, IndexFsError> {
        Ok(self
            .entry(node)?
            .is_some_and(|e| FileKind::of_mode(e.mode) == FileKind::File))
    }

    /// Whether `node` has an exact entry with the symlink mode.
    ///
    /// The root is never a link, and neither is a path that only has descendants.
    pub fn is_link(&self, node: &IndexPath) -> Result<bool, IndexFsError> {
        if node.is_root() {
            self.check(node)?;
            return Ok(false);
        }
        // Sorted listing: an exact entry precedes everything under `path/`.
        let entries = self.list(node, ListScope::Subtree)?;
        Ok(entries
            .first()
            .is_some_and(|e| e.path == node.path() && e.mode == FileMode::Symlink))
    }

    /// What `node` resolves to, or `None` if it does not exist.
    pub fn kind(&self, node: &IndexPath) -> Result<Option<FileKind>, IndexFsError> {
        if node.is_root() {
            self.check(node)?;
            return Ok(Some(FileKind::Directory));
        }
        let entries = self.list(node, ListScope::Subtree)?;
        Ok(entries.first().map(|e| {
            if e.path == node.path() {
                FileKind::of_mode(e.mode)
            } else {
                FileKind::Directory
            }
        }))
    }

    /// Open `node`, returning a handle that persists the path when the last handle on it closes.
    ///
    /// Opening a path without an entry starts from empty content; the entry is created on the
    /// final close. The root has no entry of its own and cannot be opened.
    #[instrument(name = "IndexFs::open", skip(self, node), fields(path = node.path()))]
    pub fn open(&self, node: &IndexPath, flags: OpenFlags) -> Result<IndexFile<'_, S>, IndexFsError> {
        self.check(node)?;
        if node.is_root() {
            return Err(IndexFsError::invalid_path("", "cannot open the root"));
        }
        let path = node.path();

        let staged_mode = if self.open_files.borrow().is_open(path) {
            None
        } else {
            Some(self.stage(node)?)
        };

        let ready = self.scratch.ready_path(path);
        let file = match flags.to_std().open(&ready) {
            Ok(file) => file,
            Err(e) => {
                if staged_mode.is_some() {
                    let _ = std::fs::remove_file(&ready);
                }
                return Err(e.into());
            }
        };

        let handle = self.next_handle.get();
        self.next_handle.set(handle + 1);
        let live = self.open_files.borrow_mut().register(
            path,
            handle,
            staged_mode.unwrap_or(FileMode::Regular),
        );
        debug!(handle, live, ?flags, "opened");

        Ok(IndexFile {
            fs: self,
            node: node.clone(),
            handle,
            file: Some(file),
        })
    }

    /// Materialise the current content of `node` into its scratch file, returning the mode the
    /// path should be written back with.
    fn stage(&self, node: &IndexPath) -> Result<FileMode, IndexFsError> {
        let (content, mode) = match self.entry(node)? {
            Some(entry) => (self.store.read(&entry.object)?, entry.mode),
            None => (Bytes::new(), FileMode::Regular),
        };
        self.scratch.stage(node.path(), &content)?;
        Ok(mode)
    }

    /// Drop `handle` from the registry and, if it was the last one on `path`, persist the path.
    fn release(&self, path: &str, handle: HandleId) -> Result<(), IndexFsError> {
        let released = self.open_files.borrow_mut().release(path, handle);
        match released {
            None => {
                warn!(path, handle, "released a handle the registry does not know");
                Ok(())
            }
            Some(Release::StillOpen(live)) => {
                trace!(path, handle, live, "handle released, path still open");
                Ok(())
            }
            Some(Release::Closed(mode)) => self.persist(path, mode),
        }
    }

    #[instrument(name = "IndexFs::persist", skip(self))]
    fn persist(&self, path: &str, mode: FileMode) -> Result<(), IndexFsError> {
        let content = self.scratch.take(path)?;
        let object = self.store.write(&content)?;
        debug!(%object, len = content.len(), "writing back");
        self.update(&[IndexEntry {
            path: path.to_owned(),
            mode,
            object,
        }])
    }

    /// Read the whole content of `node`.
    pub fn read(&self, node: &IndexPath) -> Result<Vec<u8>, IndexFsError> {
        let mut file = self.open(node, OpenFlags::READ)?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        file.close()?;
        Ok(buf)
    }

    /// Replace the content of `node`.
    pub fn write(&self, node: &IndexPath, content: &[u8]) -> Result<(), IndexFsError> {
        let mut file = self.open(node, OpenFlags::WRITE | OpenFlags::TRUNCATE)?;
        file.write_all(content)?;
        file.close()
    }

    /// Iterate the immediate children of `node`.
    ///
    /// The listing is fetched and validated up front; iteration itself does no I/O.
    #[instrument(name = "IndexFs::read_dir", skip(self, node), fields(path = node.path()))]
    pub fn read_dir(&self, node: &IndexPath) -> Result<ReadDir, IndexFsError> {
        let entries = self.list(node, ListScope::Descendants)?;

        for pair in entries.windows(2) {
            if pair[0].path > pair[1].path {
                return Err(IndexFsError::UnsortedListing {
                    previous: pair[0].path.clone(),
                    next: pair[1].path.clone(),
                });
            }
        }
        if let Some(stray) = entries
            .iter()
            .find(|e| !ListScope::Descendants.matches(node.path(), &e.path))
        {
            return Err(StoreError::Malformed(format!(
                "listing of {:?} returned unrelated entry {:?}",
                node.path(),
                stray.path
            ))
            .into());
        }

        let prefix_len = if node.is_root() {
            0
        } else {
            node.path().len() + 1
        };
        Ok(ReadDir {
            parent: node.clone(),
            entries: entries.into_iter(),
            prefix_len,
            last_subdir: None,
        })
    }

    /// Depth-first, pre-order traversal of everything below `node`.
    pub fn walk(&self, node: &IndexPath) -> Result<Walk<'_, S>, IndexFsError> {
        Ok(Walk {
            fs: self,
            stack: vec![self.read_dir(node)?],
        })
    }

    /// Create a directory by staging its placeholder entry.
    #[instrument(name = "IndexFs::mkdir", skip(self, node), fields(path = node.path()))]
    pub fn mkdir(&self, node: &IndexPath, opts: MkdirOptions) -> Result<(), IndexFsError> {
        if !opts.may_exist && self.exists(node)? {
            return Err(IndexFsError::AlreadyExists(node.path().to_owned()));
        }
        if !opts.create_parents {
            let parent = node.parent();
            if !self.exists(&parent)? {
                return Err(IndexFsError::NotFound(parent.path().to_owned()));
            }
        }

        let placeholder = node.child(PLACEHOLDER_NAME)?;
        let empty = self.store.write(b"")?;
        self.update(&[IndexEntry {
            path: placeholder.path().to_owned(),
            mode: FileMode::Regular,
            object: empty,
        }])
    }

    /// Remove the placeholder of `node`.
    ///
    /// Other entries below `node` are left alone, so a non-empty directory stays visible.
    pub fn rmdir(&self, node: &IndexPath) -> Result<(), IndexFsError> {
        self.remove(&node.child(PLACEHOLDER_NAME)?)
    }

    /// Stage a tombstone for exactly `node`.
    #[instrument(name = "IndexFs::remove", skip(self, node), fields(path = node.path()))]
    pub fn remove(&self, node: &IndexPath) -> Result<(), IndexFsError> {
        self.check(node)?;
        if node.is_root() {
            return Err(IndexFsError::invalid_path("", "cannot remove the root"));
        }
        self.update(&[IndexEntry::tombstone(node.path())])
    }

    /// Alias of [`IndexFs::remove`].
    pub fn unlink(&self, node: &IndexPath) -> Result<(), IndexFsError> {
        self.remove(node)
    }

    /// Move `node` and everything below it to `target` in one atomic index update, then point
    /// `node` at its new location.
    #[instrument(
        name = "IndexFs::rename",
        skip(self, node, target),
        fields(from = node.path(), to = target.path())
    )]
    pub fn rename(&self, node: &mut IndexPath, target: &IndexPath) -> Result<(), IndexFsError> {
        self.check(node)?;
        if !node.same_index(target) {
            return Err(IndexFsError::CrossDevice);
        }
        if node.is_root() || target.is_root() {
            return Err(IndexFsError::invalid_path(
                "",
                "cannot rename the root or onto the root",
            ));
        }
        if node.path() == target.path() {
            return Ok(());
        }

        let entries = self.list(node, ListScope::Subtree)?;
        if entries.is_empty() {
            return Err(IndexFsError::NotFound(node.path().to_owned()));
        }

        let from = node.path();
        let mut changes: Vec<IndexEntry> = entries
            .iter()
            .map(|e| IndexEntry::tombstone(e.path.as_str()))
            .collect();
        changes.extend(entries.into_iter().map(|e| {
            // `list` guarantees `e.path` is `from` or starts with `from/`.
            let path = format!("{}{}", target.path(), &e.path[from.len()..]);
            IndexEntry { path, ..e }
        }));

        debug!(entries = changes.len() / 2, "renaming");
        self.update(&changes)?;
        node.set_path(target.path().to_owned());
        Ok(())
    }
}

impl<S: ObjectStore + IndexStore> std::fmt::Debug for IndexFs<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexFs")
            .field("root", &self.root)
            .field("scratch", &self.scratch)
            .field("open_files", &self.open_files)
            .finish_non_exhaustive()
    }
}

/// A handle on one open path.
///
/// Reads and writes go to the scratch file shared by every handle on the path. The handle is
/// released exactly once: by [`IndexFile::close`], or on drop if it was never closed. Releasing
/// the last handle on a path persists it; on drop, a failure to persist is logged.
pub struct IndexFile<'fs, S: ObjectStore + IndexStore> {
    fs: &'fs IndexFs<S>,
    node: IndexPath,
    handle: HandleId,
    file: Option<File>,
}

impl<S: ObjectStore + IndexStore> IndexFile<'_, S> {
    /// The node this handle was opened on.
    pub fn node(&self) -> &IndexPath {
        &self.node
    }

    /// This handle's identity in the session registry.
    pub fn handle(&self) -> HandleId {
        self.handle
    }

    /// Flush, release, and surface any write-back error.
    pub fn close(mut self) -> Result<(), IndexFsError> {
        self.release()
    }

    fn release(&mut self) -> Result<(), IndexFsError> {
        let Some(mut file) = self.file.take() else {
            return Ok(());
        };
        let flushed = file.flush();
        drop(file);
        let released = self.fs.release(self.node.path(), self.handle);
        flushed?;
        released
    }

    fn file(&mut self) -> io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("handle already released"))
    }
}

impl<S: ObjectStore + IndexStore> Drop for IndexFile<'_, S> {
    fn drop(&mut self) {
        if self.file.is_some()
            && let Err(e) = self.release()
        {
            error!(path = self.node.path(), handle = self.handle, error = %e, "write-back on drop failed");
        }
    }
}

impl<S: ObjectStore + IndexStore> Read for IndexFile<'_, S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file()?.read(buf)
    }
}

impl<S: ObjectStore + IndexStore> Write for IndexFile<'_, S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file()?.flush()
    }
}

impl<S: ObjectStore + IndexStore> Seek for IndexFile<'_, S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file()?.seek(pos)
    }
}

impl<S: ObjectStore + IndexStore> std::fmt::Debug for IndexFile<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexFile")
            .field("node", &self.node)
            .field("handle", &self.handle)
            .field("open", &self.file.is_some())
            .finish_non_exhaustive()
    }
}

/// A child yielded by [`ReadDir`].
#[derive(Debug, Clone)]
pub struct DirEntry {
    node: IndexPath,
    kind: FileKind,
}

impl DirEntry {
    /// The child node.
    #[must_use]
    pub fn node(&self) -> &IndexPath {
        &self.node
    }

    /// Consume the entry, keeping the node.
    #[must_use]
    pub fn into_node(self) -> IndexPath {
        self.node
    }

    /// The child's name within its parent.
    #[must_use]
    pub fn name(&self) -> &str {
        self.node.name()
    }

    /// Whether the child is a file, symlink, or a directory synthesised from deeper entries.
    #[must_use]
    pub fn kind(&self) -> FileKind {
        self.kind
    }
}

/// Children of one directory, synthesised from a sorted flat listing.
///
/// Every entry whose remainder (after the directory prefix) contains a separator is collapsed
/// into its first segment; consecutive entries sharing that segment yield a single directory.
/// Placeholder entries are skipped.
#[derive(Debug)]
pub struct ReadDir {
    parent: IndexPath,
    entries: std::vec::IntoIter<IndexEntry>,
    prefix_len: usize,
    last_subdir: Option<String>,
}

impl Iterator for ReadDir {
    type Item = Result<DirEntry, IndexFsError>;

    fn next(&mut self) -> Option<Self::Item> {
        for entry in self.entries.by_ref() {
            let relative = &entry.path[self.prefix_len..];
            if relative == PLACEHOLDER_NAME {
                continue;
            }

            let (name, kind) = match relative.split_once('/') {
                Some((head, _)) => {
                    if self.last_subdir.as_deref() == Some(head) {
                        continue;
                    }
                    self.last_subdir = Some(head.to_owned());
                    (head, FileKind::Directory)
                }
                None => (relative, FileKind::of_mode(entry.mode)),
            };

            return Some(
                self.parent
                    .child(name)
                    .map(|node| DirEntry { node, kind }),
            );
        }
        None
    }
}

/// Depth-first, pre-order traversal built on [`ReadDir`].
pub struct Walk<'fs, S: ObjectStore + IndexStore> {
    fs: &'fs IndexFs<S>,
    stack: Vec<ReadDir>,
}

impl<S: ObjectStore + IndexStore> Iterator for Walk<'_, S> {
    type Item = Result<DirEntry, IndexFsError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let top = self.stack.last_mut()?;
            let Some(next) = top.next() else {
                self.stack.pop();
                continue;
            };
            let entry = match next {
                Ok(entry) => entry,
                Err(e) => return Some(Err(e)),
            };
            if entry.kind() == FileKind::Directory {
                match self.fs.read_dir(entry.node()) {
                    Ok(children) => self.stack.push(children),
                    Err(e) => return Some(Err(e)),
                }
            }
            return Some(Ok(entry));
        }
    }
}
