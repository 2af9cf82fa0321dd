//! Module for application configuration settings.
//!
//! User configurations may be specified in a configuration file. Command-line flags override
//! individual fields after loading.

use thiserror::Error;
use tracing::debug;

use std::path::{Path, PathBuf};

use serde::Deserialize;

fn default_repository() -> PathBuf {
    PathBuf::from(".git")
}

fn default_git_binary() -> PathBuf {
    PathBuf::from("git")
}

/// Application configuration structure.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// The git directory holding the object database.
    #[serde(default = "default_repository")]
    pub repository: PathBuf,

    /// The index file to operate on. Uses `<repository>/index` if not specified.
    #[serde(default)]
    pub index: Option<PathBuf>,

    /// Where scratch files for open paths go. Uses the index file's directory if not specified.
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,

    /// The `git` executable to run.
    #[serde(default = "default_git_binary")]
    pub git_binary: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repository: default_repository(),
            index: None,
            scratch_dir: None,
            git_binary: default_git_binary(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Deserialization error: {0}")]
    DeserializationError(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Config {
    /// The index file this configuration points at.
    pub fn index_path(&self) -> PathBuf {
        self.index
            .clone()
            .unwrap_or_else(|| self.repository.join("index"))
    }

    /// Validate the correctness of the configuration.
    ///
    /// Returns:
    /// - `Ok(())` if the configuration is valid.
    /// - `Err(Vec<String>)` containing every validation error message otherwise.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !self.repository.is_dir() {
            errors.push(format!(
                "Repository '{}' is not a directory.",
                self.repository.display()
            ));
        }

        let index = self.index_path();
        if index.to_str().is_none() {
            errors.push(format!(
                "Index path '{}' is not valid UTF-8.",
                index.display()
            ));
        }
        if index.is_dir() {
            errors.push(format!(
                "Index path '{}' is a directory.",
                index.display()
            ));
        }

        if let Some(dir) = &self.scratch_dir
            && !dir.is_dir()
        {
            errors.push(format!(
                "Scratch directory '{}' does not exist.",
                dir.display()
            ));
        }

        if self.git_binary.as_os_str().is_empty() {
            errors.push("The git binary path is empty.".to_owned());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Returns config file paths in descending priority order.
    /// On macOS, skips `dirs::config_dir()` (resolves to ~/Library/Application Support/).
    fn config_search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        #[cfg(not(target_os = "macos"))]
        if let Some(xdg) = dirs::config_dir() {
            paths.push(xdg.join("git-indexfs").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            let path = home.join(".config").join("git-indexfs").join("config.toml");
            if !paths.contains(&path) {
                paths.push(path);
            }
        }

        paths.push(PathBuf::from("/etc/git-indexfs/config.toml"));

        paths
    }

    /// Finds the first existing config file from search paths.
    fn find_config_file() -> Option<PathBuf> {
        Self::config_search_paths().into_iter().find(|p| p.exists())
    }

    /// Loads config from a single TOML file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = ?path, "Loading configuration file.");
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Loads configuration from the external path if given, else from the first config file
    /// found, else the defaults.
    ///
    /// Errors if a config file exists but is malformed, or the external path cannot be read.
    pub fn load(external_config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = external_config_path {
            return Self::load_from_file(path);
        }

        match Self::find_config_file() {
            Some(path) => Self::load_from_file(&path),
            None => {
                debug!("No configuration file found, using defaults.");
                Ok(Self::default())
            }
        }
    }
}
