//! Autosave command-line interface
//!
//! - `watch`: monitor the save and keep backups (default)
//! - `list`: show the backups in the backup directory
//! - `prune`: apply the retention policy once
//! - `inspect`: show what a save file would be named as

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Keeps a rolling backup history of a live multiplayer save file
#[derive(Parser)]
#[command(name = "autosave")]
#[command(about = "Keeps a rolling backup history of a live multiplayer save file")]
#[command(version)]
pub struct Cli {
    /// Settings file (JSON)
    #[arg(long, global = true, env = "AUTOSAVE_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Print debug information
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Watch the save file and back it up on every change
    Watch(WatchArgs),

    /// List the backups in the backup directory
    List {
        #[command(flatten)]
        overrides: SettingsOverrides,
    },

    /// Delete backups outside the retention window
    Prune {
        #[command(flatten)]
        overrides: SettingsOverrides,

        /// Only show what would be deleted
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the metadata extracted from a save file
    Inspect {
        /// Save file to read
        file: PathBuf,
    },
}

#[derive(Args, Default)]
pub struct WatchArgs {
    #[command(flatten)]
    pub overrides: SettingsOverrides,

    /// Print status events as JSON lines instead of log lines
    #[arg(long)]
    pub json: bool,

    /// Write the effective settings back to the settings file
    #[arg(long)]
    pub save: bool,
}

/// Values that take precedence over the settings file
#[derive(Args, Default, Clone)]
pub struct SettingsOverrides {
    /// Save file to watch
    #[arg(short, long)]
    pub source: Option<PathBuf>,

    /// Directory receiving the backups
    #[arg(short, long)]
    pub backup_dir: Option<PathBuf>,

    /// Seconds between checks
    #[arg(short, long)]
    pub interval: Option<f64>,

    /// In-game years of backups to keep, or "all"
    #[arg(short, long)]
    pub keep_years: Option<String>,

    /// Change detection: "metadata" (size + mtime) or "content" (SHA-256)
    #[arg(long)]
    pub signature: Option<String>,
}
