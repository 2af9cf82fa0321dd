//! git-indexfs shared library.
//!
//! A staging file-tree over a git-style index: open, write, close, `mkdir`, rename and list files
//! whose content lands in a content-addressed object store and whose paths land in an index.
//! Nothing here commits; the index is meant to be turned into a tree by whoever owns it.
//!
//! Objects that no ref reaches are subject to the store's garbage collection (two weeks for
//! `git gc` by default), so do not keep a tree staged for longer than that.

/// Path nodes, the filesystem session, and file handles.
pub mod fs;
/// Object and index store contracts and implementations.
pub mod store;
