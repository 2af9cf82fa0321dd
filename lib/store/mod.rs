//! Collaborator contracts for the content-addressed backing store.
//!
//! The filesystem layer never talks to git directly. It consumes two traits:
//!
//! - [`ObjectStore`]: immutable, content-addressed blob storage.
//! - [`IndexStore`]: an ordered `path -> (mode, object)` staging map, addressed by an index
//!   identifier.
//!
//! Both are implemented by [`memory::MemoryStore`] (in-process) and [`git::GitCli`] (shells out to
//! the `git` binary).

/// Store implementation backed by the `git` command line.
pub mod git;
/// In-memory store implementation.
pub mod memory;

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use thiserror::Error;

/// Hex digest naming one object in an [`ObjectStore`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(String);

impl ObjectId {
    /// Length of a git (SHA-1) object name, which is also the length of [`ObjectId::null`].
    pub const NULL_LEN: usize = 40;

    /// The all-zero sentinel used by tombstone entries.
    #[must_use]
    pub fn null() -> Self {
        Self("0".repeat(Self::NULL_LEN))
    }

    /// Whether this is the all-zero sentinel.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0.bytes().all(|b| b == b'0')
    }

    /// The hex representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ObjectId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(StoreError::Malformed(format!("invalid object id {s:?}")));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The mode of an index entry.
///
/// Only the distinctions git itself makes for blobs are modelled; there are no ownership or
/// fine-grained permission bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileMode {
    /// A regular, non-executable file (`100644`).
    Regular,
    /// An executable file (`100755`).
    Executable,
    /// A symbolic link whose blob holds the target (`120000`).
    Symlink,
    /// Tombstone mode (`0`), asking the index store to drop the path.
    Removed,
}

impl FileMode {
    /// The octal string git uses for this mode.
    #[must_use]
    pub fn as_octal(self) -> &'static str {
        match self {
            Self::Regular => "100644",
            Self::Executable => "100755",
            Self::Symlink => "120000",
            Self::Removed => "0",
        }
    }
}

impl FromStr for FileMode {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "100644" => Ok(Self::Regular),
            "100755" => Ok(Self::Executable),
            "120000" => Ok(Self::Symlink),
            "0" | "000000" => Ok(Self::Removed),
            other => Err(StoreError::Malformed(format!("unsupported file mode {other:?}"))),
        }
    }
}

impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_octal())
    }
}

/// One `path -> (mode, object)` record of an index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// `/`-separated path relative to the tree root.
    pub path: String,
    /// The entry mode.
    pub mode: FileMode,
    /// The object holding the entry's content.
    pub object: ObjectId,
}

impl IndexEntry {
    /// A tombstone for `path`: null object, [`FileMode::Removed`].
    #[must_use]
    pub fn tombstone(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode: FileMode::Removed,
            object: ObjectId::null(),
        }
    }

    /// Whether this entry is a tombstone.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.mode == FileMode::Removed && self.object.is_null()
    }
}

/// Which entries [`IndexStore::list_entries`] returns relative to the requested path.
///
/// For the root path (`""`) both scopes return every entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListScope {
    /// The entry equal to the path, plus every entry under `path/`.
    Subtree,
    /// Only entries strictly under `path/`.
    Descendants,
}

impl ListScope {
    /// Whether `candidate` falls inside this scope for the requested `path`.
    #[must_use]
    pub fn matches(self, path: &str, candidate: &str) -> bool {
        if path.is_empty() {
            return true;
        }
        let under = candidate
            .strip_prefix(path)
            .is_some_and(|rest| rest.starts_with('/'));
        match self {
            Self::Subtree => under || candidate == path,
            Self::Descendants => under,
        }
    }
}

/// Errors surfaced by store implementations. These are propagated unmodified by the filesystem
/// layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested object does not exist.
    #[error("object {0} not found")]
    ObjectNotFound(ObjectId),

    /// The store refused an index update.
    #[error("index update rejected: {0}")]
    Rejected(String),

    /// A `git` subprocess failed.
    #[error("`git {command}` exited with {status}: {stderr}")]
    Git {
        /// The git subcommand that failed.
        command: String,
        /// The process exit status.
        status: std::process::ExitStatus,
        /// Captured standard error.
        stderr: String,
    },

    /// The store produced output this crate cannot interpret.
    #[error("malformed store data: {0}")]
    Malformed(String),

    /// Underlying I/O failure talking to the store.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Content-addressed, immutable blob storage.
pub trait ObjectStore {
    /// Identifier of the repository this store is bound to.
    fn repository(&self) -> &str;

    /// Read an object. Fails with [`StoreError::ObjectNotFound`] if absent.
    fn read(&self, id: &ObjectId) -> Result<Bytes, StoreError>;

    /// Store `content`, returning its id. Writing identical content yields the identical id.
    fn write(&self, content: &[u8]) -> Result<ObjectId, StoreError>;
}

/// An ordered `path -> (mode, object)` staging map.
pub trait IndexStore {
    /// List the entries of `index` within `scope` of `path`.
    ///
    /// The result **must** be sorted ascending by path in byte order. Directory synthesis relies
    /// on every entry sharing a first path segment being contiguous.
    fn list_entries(
        &self,
        index: &str,
        path: &str,
        scope: ListScope,
    ) -> Result<Vec<IndexEntry>, StoreError>;

    /// Apply `changes` to `index`, in order, as one all-or-nothing batch.
    ///
    /// Tombstones (see [`IndexEntry::tombstone`]) remove their path.
    fn update_entries(&self, index: &str, changes: &[IndexEntry]) -> Result<(), StoreError>;
}

impl<T: ObjectStore + ?Sized> ObjectStore for &T {
    fn repository(&self) -> &str {
        (**self).repository()
    }

    fn read(&self, id: &ObjectId) -> Result<Bytes, StoreError> {
        (**self).read(id)
    }

    fn write(&self, content: &[u8]) -> Result<ObjectId, StoreError> {
        (**self).write(content)
    }
}

impl<T: IndexStore + ?Sized> IndexStore for &T {
    fn list_entries(
        &self,
        index: &str,
        path: &str,
        scope: ListScope,
    ) -> Result<Vec<IndexEntry>, StoreError> {
        (**self).list_entries(index, path, scope)
    }

    fn update_entries(&self, index: &str, changes: &[IndexEntry]) -> Result<(), StoreError> {
        (**self).update_entries(index, changes)
    }
}

impl<T: ObjectStore + ?Sized> ObjectStore for std::sync::Arc<T> {
    fn repository(&self) -> &str {
        (**self).repository()
    }

    fn read(&self, id: &ObjectId) -> Result<Bytes, StoreError> {
        (**self).read(id)
    }

    fn write(&self, content: &[u8]) -> Result<ObjectId, StoreError> {
        (**self).write(content)
    }
}

impl<T: IndexStore + ?Sized> IndexStore for std::sync::Arc<T> {
    fn list_entries(
        &self,
        index: &str,
        path: &str,
        scope: ListScope,
    ) -> Result<Vec<IndexEntry>, StoreError> {
        (**self).list_entries(index, path, scope)
    }

    fn update_entries(&self, index: &str, changes: &[IndexEntry]) -> Result<(), StoreError> {
        (**self).update_entries(index, changes)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn null_object_id_is_forty_zeros() {
        let null = ObjectId::null();
        assert_eq!(null.as_str().len(), 40);
        assert!(null.is_null());
        assert!(!"e69de29bb2d1d6434b8b29ae775ad8c2e48c5391"
            .parse::<ObjectId>()
            .unwrap()
            .is_null());
    }

    #[test]
    fn object_id_rejects_non_hex() {
        assert!("xyz".parse::<ObjectId>().is_err());
        assert!("".parse::<ObjectId>().is_err());
        assert_eq!("ABCDEF".parse::<ObjectId>().unwrap().as_str(), "abcdef");
    }

    #[test]
    fn file_mode_parses_git_octal() {
        assert_eq!("100644".parse::<FileMode>().unwrap(), FileMode::Regular);
        assert_eq!("120000".parse::<FileMode>().unwrap(), FileMode::Symlink);
        assert_eq!("0".parse::<FileMode>().unwrap(), FileMode::Removed);
        assert!("040000".parse::<FileMode>().is_err());
        assert_eq!(FileMode::Executable.to_string(), "100755");
    }

    #[test]
    fn tombstone_uses_null_object_and_removed_mode() {
        let t = IndexEntry::tombstone("a/b");
        assert!(t.is_tombstone());
        assert_eq!(t.mode.as_octal(), "0");
    }

    #[test]
    fn list_scope_matches_prefix_boundaries() {
        assert!(ListScope::Subtree.matches("a", "a"));
        assert!(ListScope::Subtree.matches("a", "a/b"));
        assert!(!ListScope::Subtree.matches("a", "ab"));
        assert!(!ListScope::Subtree.matches("a", "a-b/c"));
        assert!(!ListScope::Descendants.matches("a", "a"));
        assert!(ListScope::Descendants.matches("a", "a/b/c"));
        assert!(ListScope::Descendants.matches("", "anything"));
    }
}
