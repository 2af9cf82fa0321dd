//! Browse and edit a git index as a file tree, without a work tree.
use std::path::PathBuf;

use clap::Parser;
use git_indexfs::fs::{IndexFs, IndexFsError};
use git_indexfs::store::git::GitCli;
use tracing::{debug, error};

mod app_config;
mod commands;
mod term;
mod trc;

use crate::app_config::Config;
use crate::commands::Command;
use crate::trc::Trc;

#[derive(Parser)]
#[command(
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("VERGEN_GIT_SHA"), ")"),
    about = "A staging file-tree view over a git index."
)]
struct Args {
    #[arg(
        short,
        long = "config",
        value_parser,
        help = "Optional path to a git-indexfs config TOML."
    )]
    config_path: Option<PathBuf>,

    /// The git directory to use, overriding the configuration.
    #[arg(long)]
    repository: Option<PathBuf>,

    /// The index file to use, overriding the configuration.
    #[arg(long)]
    index: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

fn run(config: &Config, command: Command) -> Result<(), IndexFsError> {
    let index = config.index_path();
    let index = index.to_str().ok_or_else(|| IndexFsError::InvalidPath {
        path: index.display().to_string(),
        reason: "index path is not valid UTF-8",
    })?;

    let store = GitCli::new(&config.repository).with_binary(&config.git_binary);
    let mut fs = IndexFs::new(store, index);
    if let Some(dir) = &config.scratch_dir {
        fs = fs.with_scratch_dir(dir);
    }
    debug!(?fs, "session ready");

    command.run(&fs)
}

/// Main entry point for the application.
fn main() {
    let args = Args::parse();

    // Errors use eprintln since tracing isn't initialized yet.
    let mut config = Config::load(args.config_path.as_deref()).unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {e}");
        std::process::exit(1);
    });
    if let Some(repository) = args.repository {
        config.repository = repository;
    }
    if let Some(index) = args.index {
        config.index = Some(index);
    }
    if let Err(error_messages) = config.validate() {
        eprintln!("Configuration is invalid.");
        for msg in &error_messages {
            eprintln!(" - {msg}");
        }
        std::process::exit(1);
    }

    if let Err(e) = Trc::default().init() {
        eprintln!("Failed to initialize logging: {e}");
        std::process::exit(1);
    }
    debug!(config = ?config, "Loaded configuration.");

    if let Err(e) = run(&config, args.command) {
        error!("{e}");
        std::process::exit(i32::from(e));
    }
}
