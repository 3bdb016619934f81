use clap::Parser;
use std::path::PathBuf;

use crate::utils::config::PackagePaths;

/// Sync a Dropbox team's folders, files and sharing into a local search index.
#[derive(Clone, Parser)]
#[command(name = "dropdex")]
#[command(about = "Sync a Dropbox team into a local index; resumes an interrupted run by default.")]
pub struct Cli {
    /// Config file. Default: `dropdex.toml` in the current directory.
    #[arg(long, short = 'c', value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Path to the index database. Default: `.dropdex` next to the config file.
    #[arg(long, short)]
    pub db: Option<PathBuf>,

    /// Sync user and group identities instead of content.
    #[arg(long, conflicts_with = "item")]
    pub identity: bool,

    /// Discard an unfinished traversal and start a new one.
    #[arg(long)]
    pub restart: bool,

    /// Re-assemble a single indexed item by its external key.
    #[arg(long, value_name = "KEY")]
    pub item: Option<String>,

    /// Worker threads assembling documents.
    #[arg(long, short = 'w', value_parser = clap::value_parser!(usize))]
    pub workers: Option<usize>,

    /// Read the team from a JSON fixture instead of the Dropbox API (offline runs).
    #[arg(long, value_name = "FILE")]
    pub fixture: Option<PathBuf>,

    /// Verbose output.
    #[arg(long, short = 'v', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub verbose: Option<bool>,
}

impl Cli {
    /// Get the config path, defaulting to the package config filename in the current directory.
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| PathBuf::from(PackagePaths::get().config_filename()))
    }
}
