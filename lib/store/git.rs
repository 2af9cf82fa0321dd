//! [`ObjectStore`] and [`IndexStore`] backed by the `git` binary.
//!
//! Index identifiers are paths to index files; every index command runs with `GIT_INDEX_FILE`
//! pointing at one. Pathspecs are passed with `--literal-pathspecs` so that glob characters in
//! entry names are never interpreted.

use std::ffi::OsStr;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use bytes::Bytes;
use tracing::{debug, instrument, warn};

use crate::store::{IndexEntry, IndexStore, ListScope, ObjectId, ObjectStore, StoreError};

/// A store that runs `git` subprocesses against one repository.
#[derive(Debug, Clone)]
pub struct GitCli {
    git_dir: PathBuf,
    repository: String,
    binary: PathBuf,
}

impl GitCli {
    /// Bind to the repository whose git directory is `git_dir`.
    #[must_use]
    pub fn new(git_dir: impl Into<PathBuf>) -> Self {
        let git_dir = git_dir.into();
        Self {
            repository: git_dir.display().to_string(),
            git_dir,
            binary: PathBuf::from("git"),
        }
    }

    /// Use a specific `git` executable instead of the one found on `PATH`.
    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// The git directory this store operates on.
    #[must_use]
    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    fn command(&self, index: Option<&str>) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("--git-dir")
            .arg(&self.git_dir)
            .arg("--literal-pathspecs");
        if let Some(index) = index {
            cmd.env("GIT_INDEX_FILE", index);
        }
        cmd
    }

    /// Run `cmd`, feeding `stdin`, and return its output if it exited successfully.
    fn run(mut cmd: Command, subcommand: &str, stdin: Option<&[u8]>) -> Result<Output, StoreError> {
        cmd.stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

        let mut child = cmd.spawn()?;
        if let Some(input) = stdin
            && let Some(mut pipe) = child.stdin.take()
        {
            pipe.write_all(input)?;
        }
        let output = child.wait_with_output()?;

        if output.status.success() {
            Ok(output)
        } else {
            Err(StoreError::Git {
                command: subcommand.to_owned(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            })
        }
    }

    fn object_exists(&self, id: &ObjectId) -> Result<bool, StoreError> {
        let mut cmd = self.command(None);
        cmd.args(["cat-file", "-e"]).arg(id.as_str());
        match Self::run(cmd, "cat-file -e", None) {
            Ok(_) => Ok(true),
            Err(StoreError::Git { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Parse one record of `ls-files --stage -z`: `<mode> SP <object> SP <stage> TAB <path>`.
    fn parse_stage_record(record: &[u8]) -> Result<Option<IndexEntry>, StoreError> {
        let record = std::str::from_utf8(record)
            .map_err(|e| StoreError::Malformed(format!("non UTF-8 ls-files output: {e}")))?;
        let malformed = || StoreError::Malformed(format!("unexpected ls-files record {record:?}"));

        let (meta, path) = record.split_once('\t').ok_or_else(malformed)?;
        let mut fields = meta.split(' ');
        let (Some(mode), Some(object), Some(stage), None) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(malformed());
        };

        if stage != "0" {
            warn!(path, stage, "skipping unmerged index entry");
            return Ok(None);
        }

        Ok(Some(IndexEntry {
            path: path.to_owned(),
            mode: mode.parse()?,
            object: object.parse()?,
        }))
    }
}

impl ObjectStore for GitCli {
    fn repository(&self) -> &str {
        &self.repository
    }

    #[instrument(name = "GitCli::read", skip(self), fields(object = %id))]
    fn read(&self, id: &ObjectId) -> Result<Bytes, StoreError> {
        let mut cmd = self.command(None);
        cmd.args(["cat-file", "blob"]).arg(id.as_str());
        match Self::run(cmd, "cat-file blob", None) {
            Ok(output) => Ok(Bytes::from(output.stdout)),
            Err(e @ StoreError::Git { .. }) => {
                if self.object_exists(id)? {
                    Err(e)
                } else {
                    Err(StoreError::ObjectNotFound(id.clone()))
                }
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(name = "GitCli::write", skip(self, content), fields(len = content.len()))]
    fn write(&self, content: &[u8]) -> Result<ObjectId, StoreError> {
        let mut cmd = self.command(None);
        cmd.args(["hash-object", "-w", "--stdin"]);
        let output = Self::run(cmd, "hash-object", Some(content))?;
        let id = String::from_utf8_lossy(&output.stdout).trim().parse()?;
        debug!(object = %id, "wrote object");
        Ok(id)
    }
}

impl IndexStore for GitCli {
    #[instrument(name = "GitCli::list_entries", skip(self))]
    fn list_entries(
        &self,
        index: &str,
        path: &str,
        scope: ListScope,
    ) -> Result<Vec<IndexEntry>, StoreError> {
        let mut cmd = self.command(Some(index));
        cmd.args(["ls-files", "--stage", "-z", "--full-name"]);
        if !path.is_empty() {
            cmd.arg("--").arg(OsStr::new(path));
        }
        let output = Self::run(cmd, "ls-files", None)?;

        let mut entries = Vec::new();
        for record in output.stdout.split(|b| *b == 0).filter(|r| !r.is_empty()) {
            if let Some(entry) = Self::parse_stage_record(record)?
                && scope.matches(path, &entry.path)
            {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    #[instrument(name = "GitCli::update_entries", skip(self, changes), fields(count = changes.len()))]
    fn update_entries(&self, index: &str, changes: &[IndexEntry]) -> Result<(), StoreError> {
        if changes.is_empty() {
            return Ok(());
        }

        let mut info = Vec::new();
        for change in changes {
            if change.path.contains('\0') {
                return Err(StoreError::Rejected(format!(
                    "entry path {:?} contains NUL",
                    change.path
                )));
            }
            // `--index-info` format: `<mode> SP <object> TAB <path>`, NUL-terminated with -z.
            info.extend_from_slice(
                format!("{} {}\t{}\0", change.mode, change.object, change.path).as_bytes(),
            );
        }

        let mut cmd = self.command(Some(index));
        cmd.args(["update-index", "-z", "--index-info"]);
        Self::run(cmd, "update-index", Some(&info))?;
        Ok(())
    }
}
