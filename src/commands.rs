//! The subcommands, run against one filesystem session.

use std::io::{self, Write as _};

use clap::Subcommand;
use git_indexfs::fs::{FileKind, IndexFs, IndexFsError, IndexPath, MkdirOptions, OpenFlags};
use git_indexfs::store::{IndexStore, ObjectStore};
use tracing::debug;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List the children of a directory, or name a single file.
    Ls {
        /// Path relative to the index root. Defaults to the root.
        path: Option<String>,
    },

    /// Print everything below a directory, depth first.
    Tree {
        /// Path relative to the index root. Defaults to the root.
        path: Option<String>,
    },

    /// Write the content of a file to stdout.
    Cat { path: String },

    /// Replace the content of a file with stdin.
    Write { path: String },

    /// Append stdin to a file.
    Append { path: String },

    /// Create a directory.
    Mkdir {
        /// Create missing parents, and succeed if the directory exists.
        #[arg(short, long)]
        parents: bool,
        path: String,
    },

    /// Remove a directory's placeholder.
    Rmdir { path: String },

    /// Remove a file's entry.
    Rm { path: String },

    /// Move a file or directory, with everything below it.
    Mv { from: String, to: String },

    /// Show what a path resolves to.
    Stat { path: String },
}

/// The node for a command-line path. Trailing separators are dropped so `d/` names `d`; a path
/// of only separators is the root.
fn resolve<S: ObjectStore + IndexStore>(
    fs: &IndexFs<S>,
    path: Option<&str>,
) -> Result<IndexPath, IndexFsError> {
    match path.map(|p| p.trim_end_matches('/')) {
        None | Some("") => Ok(fs.root()),
        Some(p) => fs.node(p),
    }
}

fn kind_label(kind: FileKind) -> &'static str {
    match kind {
        FileKind::File => "file",
        FileKind::Directory => "directory",
        FileKind::Symlink => "symlink",
    }
}

fn require<S: ObjectStore + IndexStore>(
    fs: &IndexFs<S>,
    node: &IndexPath,
) -> Result<FileKind, IndexFsError> {
    fs.kind(node)?
        .ok_or_else(|| IndexFsError::NotFound(node.path().to_owned()))
}

impl Command {
    pub fn run<S: ObjectStore + IndexStore>(self, fs: &IndexFs<S>) -> Result<(), IndexFsError> {
        debug!(command = ?self, "running");
        let mut out = io::stdout().lock();

        match self {
            Self::Ls { path } => {
                let node = resolve(fs, path.as_deref())?;
                if require(fs, &node)? != FileKind::Directory {
                    writeln!(out, "{}", node.name())?;
                    return Ok(());
                }
                for entry in fs.read_dir(&node)? {
                    let entry = entry?;
                    let suffix = if entry.kind() == FileKind::Directory {
                        "/"
                    } else {
                        ""
                    };
                    writeln!(out, "{}{suffix}", entry.name())?;
                }
            }
            Self::Tree { path } => {
                let node = resolve(fs, path.as_deref())?;
                if require(fs, &node)? != FileKind::Directory {
                    return Err(IndexFsError::InvalidPath {
                        path: node.path().to_owned(),
                        reason: "not a directory",
                    });
                }
                let base_depth = node.path().split('/').filter(|s| !s.is_empty()).count();
                for entry in fs.walk(&node)? {
                    let entry = entry?;
                    let depth = entry.node().path().split('/').count() - base_depth - 1;
                    writeln!(out, "{}{}", "  ".repeat(depth), entry.name())?;
                }
            }
            Self::Cat { path } => {
                let node = resolve(fs, Some(&path))?;
                require(fs, &node)?;
                let mut file = fs.open(&node, OpenFlags::READ)?;
                io::copy(&mut file, &mut out)?;
                file.close()?;
            }
            Self::Write { path } => {
                let node = resolve(fs, Some(&path))?;
                let mut file = fs.open(&node, OpenFlags::WRITE | OpenFlags::TRUNCATE)?;
                io::copy(&mut io::stdin().lock(), &mut file)?;
                file.close()?;
            }
            Self::Append { path } => {
                let node = resolve(fs, Some(&path))?;
                let mut file = fs.open(&node, OpenFlags::WRITE | OpenFlags::APPEND)?;
                io::copy(&mut io::stdin().lock(), &mut file)?;
                file.close()?;
            }
            Self::Mkdir { parents, path } => {
                let opts = if parents {
                    MkdirOptions::recursive()
                } else {
                    MkdirOptions::default()
                };
                fs.mkdir(&resolve(fs, Some(&path))?, opts)?;
            }
            Self::Rmdir { path } => fs.rmdir(&resolve(fs, Some(&path))?)?,
            Self::Rm { path } => fs.remove(&resolve(fs, Some(&path))?)?,
            Self::Mv { from, to } => {
                let mut node = resolve(fs, Some(&from))?;
                fs.rename(&mut node, &resolve(fs, Some(&to))?)?;
            }
            Self::Stat { path } => {
                let node = resolve(fs, Some(&path))?;
                let kind = require(fs, &node)?;
                writeln!(out, "path: {node}")?;
                writeln!(out, "kind: {}", kind_label(kind))?;
                if let Some(entry) = fs.entry(&node)? {
                    writeln!(out, "mode: {}", entry.mode)?;
                    writeln!(out, "object: {}", entry.object)?;
                }
            }
        }

        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use git_indexfs::store::memory::MemoryStore;

    fn session() -> (IndexFs<MemoryStore>, tempfile::TempDir) {
        let scratch = tempfile::tempdir().unwrap();
        let fs = IndexFs::new(MemoryStore::new("repo"), "index").with_scratch_dir(scratch.path());
        (fs, scratch)
    }

    #[test]
    fn trailing_separators_name_the_directory() {
        let (fs, _scratch) = session();
        fs.write(&fs.node("d/f").unwrap(), b"x").unwrap();

        let node = resolve(&fs, Some("d/")).unwrap();
        assert_eq!(node.path(), "d");
        assert_eq!(require(&fs, &node).unwrap(), FileKind::Directory);
    }

    #[test]
    fn empty_and_separator_only_paths_are_the_root() {
        let (fs, _scratch) = session();
        assert!(resolve(&fs, None).unwrap().is_root());
        assert!(resolve(&fs, Some("/")).unwrap().is_root());
        assert!(resolve(&fs, Some("")).unwrap().is_root());
    }

    #[test]
    fn absolute_paths_are_still_refused() {
        let (fs, _scratch) = session();
        assert!(matches!(
            resolve(&fs, Some("/etc/")).unwrap_err(),
            IndexFsError::InvalidPath { .. }
        ));
    }
}
