//! Reference tracking of live handles per path.
//!
//! [`OpenFileRegistry`] maps each open path to the set of handles currently holding it. The entry
//! for a path is created by the first [`register`](OpenFileRegistry::register) and destroyed by
//! the [`release`](OpenFileRegistry::release) that empties its set; that release is the caller's
//! cue to persist the path.
//!
//! # Concurrency
//!
//! Not thread-safe. All mutation requires `&mut self`; the owning session keeps it in a
//! `RefCell`.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::store::FileMode;

/// Identity of one open handle within a session.
pub type HandleId = u64;

#[derive(Debug)]
struct OpenPath {
    handles: FxHashSet<HandleId>,
    /// Mode of the index entry found when the path was first opened.
    mode: FileMode,
}

/// Outcome of [`OpenFileRegistry::release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// Other handles still hold the path.
    StillOpen(usize),
    /// That was the last handle. The path's entry is gone; the carried mode is what the path
    /// should be persisted with.
    Closed(FileMode),
}

/// Per-session map from path to its set of live handles.
#[derive(Debug, Default)]
pub struct OpenFileRegistry {
    map: FxHashMap<String, OpenPath>,
}

impl OpenFileRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any handle currently holds `path`.
    #[must_use]
    pub fn is_open(&self, path: &str) -> bool {
        self.map.contains_key(path)
    }

    /// Number of live handles on `path`.
    #[must_use]
    pub fn live_handles(&self, path: &str) -> usize {
        self.map.get(path).map_or(0, |open| open.handles.len())
    }

    /// Number of distinct open paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether no path is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Add `handle` to the set for `path`, creating the set (remembering `mode`) if this is the
    /// first handle. `mode` is ignored for paths that are already open.
    ///
    /// Returns the number of live handles **after** registering.
    pub fn register(&mut self, path: &str, handle: HandleId, mode: FileMode) -> usize {
        let open = self.map.entry(path.to_owned()).or_insert_with(|| OpenPath {
            handles: FxHashSet::default(),
            mode,
        });
        open.handles.insert(handle);
        open.handles.len()
    }

    /// Remove `handle` from the set for `path`.
    ///
    /// Returns `None` if `handle` was not registered on `path` (no-op).
    pub fn release(&mut self, path: &str, handle: HandleId) -> Option<Release> {
        let open = self.map.get_mut(path)?;
        if !open.handles.remove(&handle) {
            return None;
        }
        if open.handles.is_empty() {
            let mode = open.mode;
            self.map.remove(path);
            Some(Release::Closed(mode))
        } else {
            Some(Release::StillOpen(open.handles.len()))
        }
    }
}
