//! Scratch files backing open paths.
//!
//! Each open path is backed by one local file named
//! `<index-name>.<sha256(index)[..12]>.<sha256(path)>.work`. Content is first written to the
//! sibling `.tmp` file and then renamed into place, so a `.work` file is either absent or fully
//! materialised. The index digest keeps indexes that share a basename and a scratch directory
//! apart.
//!
//! Scratch files are transient: they exist only while a path has live handles.

use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest as _, Sha256};
use tracing::debug;

const STAGING_SUFFIX: &str = "tmp";
const READY_SUFFIX: &str = "work";
const INDEX_DIGEST_LEN: usize = 12;

/// The directory and naming scheme for one index's scratch files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchArea {
    dir: PathBuf,
    prefix: String,
}

impl ScratchArea {
    /// Scratch area for `index`, next to the index file when the identifier is a path with a
    /// parent directory, otherwise in the system temp dir.
    #[must_use]
    pub fn for_index(index: &str) -> Self {
        let dir = Path::new(index)
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(std::env::temp_dir, Path::to_path_buf);
        Self::new(dir, index)
    }

    /// Scratch area for `index` inside `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, index: &str) -> Self {
        let name = Path::new(index)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "index".to_owned());
        let digest = hex::encode(Sha256::digest(index.as_bytes()));
        let prefix = format!("{name}.{}", &digest[..INDEX_DIGEST_LEN]);
        Self {
            dir: dir.into(),
            prefix,
        }
    }

    /// Directory holding the scratch files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file(&self, path: &str, suffix: &str) -> PathBuf {
        let digest = hex::encode(Sha256::digest(path.as_bytes()));
        self.dir.join(format!("{}.{digest}.{suffix}", self.prefix))
    }

    /// Where content for `path` is written before it is published.
    #[must_use]
    pub fn staging_path(&self, path: &str) -> PathBuf {
        self.file(path, STAGING_SUFFIX)
    }

    /// The scratch file handles of `path` open.
    #[must_use]
    pub fn ready_path(&self, path: &str) -> PathBuf {
        self.file(path, READY_SUFFIX)
    }

    /// Materialise `content` as the ready scratch file for `path`.
    pub fn stage(&self, path: &str, content: &[u8]) -> io::Result<PathBuf> {
        let staging = self.staging_path(path);
        let ready = self.ready_path(path);
        std::fs::write(&staging, content)?;
        if let Err(e) = std::fs::rename(&staging, &ready) {
            let _ = std::fs::remove_file(&staging);
            return Err(e);
        }
        debug!(path, scratch = %ready.display(), len = content.len(), "staged scratch file");
        Ok(ready)
    }

    /// Read the ready scratch file for `path` in full and delete it.
    pub fn take(&self, path: &str) -> io::Result<Vec<u8>> {
        let ready = self.ready_path(path);
        let content = std::fs::read(&ready)?;
        std::fs::remove_file(&ready)?;
        Ok(content)
    }
}
