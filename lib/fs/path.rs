//! Lightweight, I/O-free descriptors of one location in an index.
//!
//! An [`IndexPath`] names `(repository, index, path)`. Navigation never touches the store; it only
//! validates and rewrites the path string. Paths are `/`-separated and relative, with the empty
//! string denoting the root.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::fs::IndexFsError;

/// Two nodes from different repository/index pairs were compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("paths from different repositories or indexes are not comparable")]
pub struct NotComparable;

/// One logical location in an index.
///
/// Cheap to clone: the repository and index identifiers are shared.
///
/// There are deliberately no `PartialEq`/`PartialOrd` impls. Nodes are only comparable when they
/// share repository and index, so comparison goes through [`IndexPath::try_eq`] and
/// [`IndexPath::try_cmp`], which say so explicitly.
#[derive(Clone)]
pub struct IndexPath {
    repository: Arc<str>,
    index: Arc<str>,
    path: String,
}

impl IndexPath {
    /// The root of `index` in `repository`.
    #[must_use]
    pub fn root(repository: impl Into<Arc<str>>, index: impl Into<Arc<str>>) -> Self {
        Self {
            repository: repository.into(),
            index: index.into(),
            path: String::new(),
        }
    }

    fn with_path(&self, path: String) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            index: Arc::clone(&self.index),
            path,
        }
    }

    /// Repository identifier.
    #[must_use]
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Index identifier.
    #[must_use]
    pub fn index(&self) -> &str {
        &self.index
    }

    /// The relative path; empty for the root.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether this is the root of the index.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    /// Last path segment, or the empty string for the root.
    #[must_use]
    pub fn name(&self) -> &str {
        self.path.rsplit_once('/').map_or(self.path.as_str(), |(_, name)| name)
    }

    /// Join a relative path onto this node.
    ///
    /// No normalisation happens; only absolute paths are refused. Use [`IndexPath::child`] for
    /// untrusted names.
    pub fn join(&self, relative: &str) -> Result<Self, IndexFsError> {
        if relative.starts_with('/') {
            return Err(IndexFsError::invalid_path(
                relative,
                "path name to join must be relative",
            ));
        }
        if relative.is_empty() {
            return Ok(self.clone());
        }
        let joined = if self.path.is_empty() || self.path.ends_with('/') {
            format!("{}{relative}", self.path)
        } else {
            format!("{}/{relative}", self.path)
        };
        Ok(self.with_path(joined))
    }

    /// Step down one segment.
    ///
    /// Fails if `segment` contains a separator or is `..`, so the result can never escape this
    /// node.
    pub fn child(&self, segment: &str) -> Result<Self, IndexFsError> {
        if segment.contains('/') {
            return Err(IndexFsError::invalid_path(
                segment,
                "child name contains directory separator",
            ));
        }
        if segment == ".." {
            return Err(IndexFsError::invalid_path(
                segment,
                "child trying to climb out of directory",
            ));
        }
        self.join(segment)
    }

    /// Apply [`IndexPath::child`] for each segment in turn.
    pub fn descend<I, S>(&self, segments: I) -> Result<Self, IndexFsError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        segments
            .into_iter()
            .try_fold(self.clone(), |node, segment| node.child(segment.as_ref()))
    }

    /// The node one segment up. The root is its own parent.
    #[must_use]
    pub fn parent(&self) -> Self {
        let head = self.path.rsplit_once('/').map_or("", |(head, _)| head);
        self.with_path(head.to_owned())
    }

    /// Whether `other` refers to the same repository and index.
    #[must_use]
    pub fn same_index(&self, other: &Self) -> bool {
        self.repository == other.repository && self.index == other.index
    }

    /// Path equality, defined only within one repository and index.
    pub fn try_eq(&self, other: &Self) -> Result<bool, NotComparable> {
        self.try_cmp(other).map(Ordering::is_eq)
    }

    /// Lexicographic ordering on the path, defined only within one repository and index.
    pub fn try_cmp(&self, other: &Self) -> Result<Ordering, NotComparable> {
        if self.same_index(other) {
            Ok(self.path.cmp(&other.path))
        } else {
            Err(NotComparable)
        }
    }

    pub(crate) fn set_path(&mut self, path: String) {
        self.path = path;
    }
}

impl fmt::Debug for IndexPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexPath")
            .field("path", &self.path)
            .field("index", &self.index)
            .field("repository", &self.repository)
            .finish()
    }
}

impl fmt::Display for IndexPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.path)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn root() -> IndexPath {
        IndexPath::root("repo", "index")
    }

    #[test]
    fn join_refuses_absolute_paths() {
        for abs in ["/", "/etc/passwd", "//a"] {
            let err = root().join(abs).unwrap_err();
            assert!(matches!(err, IndexFsError::InvalidPath { .. }), "{abs}");
        }
    }

    #[test]
    fn join_concatenates_without_normalising() {
        let node = root().join("a/b").unwrap().join("../c").unwrap();
        assert_eq!(node.path(), "a/b/../c");
        assert_eq!(root().join("x").unwrap().path(), "x");
        assert_eq!(node.join("").unwrap().path(), node.path());
    }

    #[test]
    fn child_refuses_separators_and_dotdot() {
        assert!(matches!(
            root().child("..").unwrap_err(),
            IndexFsError::InvalidPath { .. }
        ));
        assert!(matches!(
            root().child("a/b").unwrap_err(),
            IndexFsError::InvalidPath { .. }
        ));
        assert_eq!(root().child(".").unwrap().path(), ".");
    }

    #[test]
    fn descend_applies_every_segment() {
        let node = root().descend(["a", "b", "c"]).unwrap();
        assert_eq!(node.path(), "a/b/c");
        assert!(root().descend(["a", "..", "c"]).is_err());
    }

    #[test]
    fn parent_and_name() {
        let node = root().descend(["a", "b"]).unwrap();
        assert_eq!(node.name(), "b");
        assert_eq!(node.parent().path(), "a");
        assert_eq!(node.parent().parent().path(), "");
        assert!(root().parent().is_root());
        assert_eq!(root().name(), "");
    }

    #[test]
    fn comparison_across_indexes_is_refused() {
        let a = root().child("a").unwrap();
        let b = root().child("b").unwrap();
        assert_eq!(a.try_cmp(&b), Ok(Ordering::Less));
        assert_eq!(a.try_eq(&a.clone()), Ok(true));
        assert_eq!(a.try_eq(&b), Ok(false));

        let other = IndexPath::root("repo", "other-index").child("a").unwrap();
        assert_eq!(a.try_eq(&other), Err(NotComparable));
        assert_eq!(a.try_cmp(&other), Err(NotComparable));

        let other_repo = IndexPath::root("elsewhere", "index").child("a").unwrap();
        assert_eq!(a.try_eq(&other_repo), Err(NotComparable));
    }
}
