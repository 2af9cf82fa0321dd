//! Hierarchical file-tree view over an index and object store.
/// The filesystem session, file handles and directory iteration.
pub mod index_fs;
/// Per-session bookkeeping of live handles per path.
pub mod open_files;
/// Path nodes: navigation and identity.
pub mod path;
/// Local scratch files backing open paths.
pub mod scratch;

pub use index_fs::{DirEntry, IndexFile, IndexFs, ReadDir, Walk};
pub use path::{IndexPath, NotComparable};

use bitflags::bitflags;
use thiserror::Error;

use crate::store::{FileMode, StoreError};

/// Name of the entry that keeps an otherwise empty directory visible in the index.
///
/// Never yielded by directory iteration.
pub const PLACEHOLDER_NAME: &str = ".gitfs-placeholder";

bitflags! {
    /// How an [`IndexFile`] opens the shared scratch file of its path.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpenFlags: u8 {
        /// Open for reading.
        const READ     = 1 << 0;
        /// Open for writing.
        const WRITE    = 1 << 1;
        /// Every write goes to the end of the file.
        const APPEND   = 1 << 2;
        /// Truncate the shared scratch file to zero length on open.
        const TRUNCATE = 1 << 3;

        /// Reading and writing.
        const READ_WRITE = Self::READ.bits() | Self::WRITE.bits();
    }
}

impl OpenFlags {
    /// Translate an `fopen(3)`-style mode string (`r`, `w`, `a`, `r+`, `w+`, `a+`, optionally with
    /// a `b`).
    ///
    /// Returns `None` for anything else.
    #[must_use]
    pub fn from_mode(mode: &str) -> Option<Self> {
        let mode: String = mode.chars().filter(|c| *c != 'b').collect();
        let flags = match mode.as_str() {
            "r" => Self::READ,
            "r+" => Self::READ_WRITE,
            "w" => Self::WRITE | Self::TRUNCATE,
            "w+" => Self::READ_WRITE | Self::TRUNCATE,
            "a" => Self::WRITE | Self::APPEND,
            "a+" => Self::READ_WRITE | Self::APPEND,
            _ => return None,
        };
        Some(flags)
    }

    pub(crate) fn to_std(self) -> std::fs::OpenOptions {
        let mut opts = std::fs::OpenOptions::new();
        opts.read(self.contains(Self::READ))
            .write(self.intersects(Self::WRITE | Self::TRUNCATE))
            .append(self.contains(Self::APPEND))
            .truncate(self.contains(Self::TRUNCATE));
        opts
    }
}

impl Default for OpenFlags {
    fn default() -> Self {
        Self::READ
    }
}

/// Options for [`IndexFs::mkdir`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MkdirOptions {
    /// Succeed if the path already exists.
    pub may_exist: bool,
    /// Do not require the parent to exist.
    pub create_parents: bool,
}

impl MkdirOptions {
    /// `mkdir -p` semantics.
    #[must_use]
    pub fn recursive() -> Self {
        Self {
            may_exist: true,
            create_parents: true,
        }
    }
}

/// What a path resolves to in the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// An exact entry with a non-link mode.
    File,
    /// Only descendants exist (or the path is the root).
    Directory,
    /// An exact entry with the symlink mode.
    Symlink,
}

impl FileKind {
    pub(crate) fn of_mode(mode: FileMode) -> Self {
        if mode == FileMode::Symlink {
            Self::Symlink
        } else {
            Self::File
        }
    }
}

/// Errors surfaced by [`IndexFs`] and [`IndexPath`] operations.
#[derive(Debug, Error)]
pub enum IndexFsError {
    /// A path was absolute, or a child segment contained a separator or `..`.
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath {
        /// The offending path or segment.
        path: String,
        /// Why it was refused.
        reason: &'static str,
    },

    /// The path already exists.
    #[error("{0:?} already exists")]
    AlreadyExists(String),

    /// The path, or a parent it requires, does not exist.
    #[error("{0:?} does not exist")]
    NotFound(String),

    /// Rename target lives in a different repository or index.
    #[error("cannot rename across repositories or indexes")]
    CrossDevice,

    /// The node belongs to a different repository or index than the session.
    #[error("node {path:?} belongs to index {index:?} of {repository:?}")]
    ForeignNode {
        /// The node's repository identifier.
        repository: String,
        /// The node's index identifier.
        index: String,
        /// The node's path.
        path: String,
    },

    /// The index store returned a listing that is not sorted by path.
    #[error("index listing is not sorted: {previous:?} precedes {next:?}")]
    UnsortedListing {
        /// The earlier entry in the listing.
        previous: String,
        /// The entry that should have come first.
        next: String,
    },

    /// A backing store call failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Scratch file I/O failed.
    #[error("scratch io error: {0}")]
    Io(#[from] std::io::Error),
}

impl IndexFsError {
    pub(crate) fn invalid_path(path: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason,
        }
    }
}

impl From<IndexFsError> for i32 {
    fn from(e: IndexFsError) -> Self {
        match e {
            IndexFsError::InvalidPath { .. } => libc::EINVAL,
            IndexFsError::AlreadyExists(_) => libc::EEXIST,
            IndexFsError::NotFound(_) | IndexFsError::Store(StoreError::ObjectNotFound(_)) => {
                libc::ENOENT
            }
            IndexFsError::CrossDevice | IndexFsError::ForeignNode { .. } => libc::EXDEV,
            IndexFsError::UnsortedListing { .. } | IndexFsError::Store(_) => libc::EIO,
            IndexFsError::Io(ref io_err) => io_err.raw_os_error().unwrap_or(libc::EIO),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_strings_map_to_flags() {
        assert_eq!(OpenFlags::from_mode("r"), Some(OpenFlags::READ));
        assert_eq!(OpenFlags::from_mode("rb"), Some(OpenFlags::READ));
        assert_eq!(
            OpenFlags::from_mode("w"),
            Some(OpenFlags::WRITE | OpenFlags::TRUNCATE)
        );
        assert_eq!(
            OpenFlags::from_mode("a+"),
            Some(OpenFlags::READ_WRITE | OpenFlags::APPEND)
        );
        assert_eq!(OpenFlags::from_mode("x"), None);
    }

    #[test]
    fn errors_map_to_errno() {
        assert_eq!(
            i32::from(IndexFsError::invalid_path("/a", "absolute")),
            libc::EINVAL
        );
        assert_eq!(
            i32::from(IndexFsError::AlreadyExists("a".into())),
            libc::EEXIST
        );
        assert_eq!(i32::from(IndexFsError::NotFound("a".into())), libc::ENOENT);
        assert_eq!(i32::from(IndexFsError::CrossDevice), libc::EXDEV);
    }
}
