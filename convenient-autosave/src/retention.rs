//! Retention of backups by in-game year
//!
//! The retention window is measured in in-game years back from the newest
//! backup's in-game date, not in wall-clock time. With `keep-last-10-years`
//! and a newest backup in 1470, everything from 1460 onward stays.

use crate::backup::BackupEntry;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Which backups survive a prune pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetentionPolicy {
    /// Never delete anything
    #[default]
    KeepAll,
    /// Keep backups at most this many in-game years older than the newest one
    KeepLastYears(u32),
}

impl RetentionPolicy {
    /// Oldest in-game year that is still kept when the newest backup is in `newest_year`
    pub fn cutoff_year(&self, newest_year: u16) -> Option<u32> {
        match self {
            Self::KeepAll => None,
            Self::KeepLastYears(years) => Some(u32::from(newest_year).saturating_sub(*years)),
        }
    }
}

impl std::fmt::Display for RetentionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KeepAll => write!(f, "all"),
            Self::KeepLastYears(years) => write!(f, "{years}"),
        }
    }
}

/// Errors from listing or pruning the backup directory
#[derive(Debug, thiserror::Error)]
pub enum RetentionError {
    /// The backup directory could not be listed
    #[error("failed to list backups in {}: {source}", path.display())]
    ListDir {
        /// Backup directory
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },
}

/// A backup that could not be deleted
#[derive(Debug, Clone)]
pub struct PruneFailure {
    /// Entry that should have been deleted
    pub entry: BackupEntry,
    /// Why deletion failed
    pub reason: String,
}

/// Outcome of a prune pass
#[derive(Debug, Clone, Default)]
pub struct PruneReport {
    /// Entries deleted by this pass
    pub deleted: Vec<BackupEntry>,
    /// Entries outside the window that could not be deleted
    pub failed: Vec<PruneFailure>,
}

/// All well-formed backups in `backup_dir`, sorted by filename
///
/// Malformed names and temp files are skipped. A missing directory lists as
/// empty.
///
/// # Errors
///
/// Returns [`RetentionError::ListDir`] when the directory exists but cannot be
/// read.
pub fn list_backups(backup_dir: &Path) -> Result<Vec<BackupEntry>, RetentionError> {
    let read_dir = match fs::read_dir(backup_dir) {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(RetentionError::ListDir {
                path: backup_dir.to_path_buf(),
                source,
            });
        }
    };

    let mut entries: Vec<BackupEntry> = read_dir
        .filter_map(|e| {
            e.inspect_err(|err| debug!("Skipping unreadable entry in {}: {err}", backup_dir.display()))
                .ok()
        })
        .filter(|e| e.file_type().is_ok_and(|t| t.is_file()))
        .filter_map(|e| {
            let entry = BackupEntry::from_path(&e.path());
            if entry.is_none() {
                debug!("Ignoring {}", e.path().display());
            }
            entry
        })
        .collect();
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

/// Entries a prune pass with `policy` would delete
pub fn plan_prune<'a>(entries: &'a [BackupEntry], policy: &RetentionPolicy) -> Vec<&'a BackupEntry> {
    let Some(newest) = entries.iter().map(|e| e.game_date).max() else {
        return Vec::new();
    };
    let Some(cutoff) = policy.cutoff_year(newest.year()) else {
        return Vec::new();
    };
    entries
        .iter()
        .filter(|e| u32::from(e.game_date.year()) < cutoff)
        .collect()
}

/// Delete every backup in `backup_dir` that falls outside `policy`
///
/// Individual deletion failures are logged and reported in
/// [`PruneReport::failed`]; a backup that disappeared concurrently counts as
/// neither deleted nor failed. Running this twice in a row deletes nothing the
/// second time.
///
/// # Errors
///
/// Only listing the directory is fatal.
pub fn prune(backup_dir: &Path, policy: &RetentionPolicy) -> Result<PruneReport, RetentionError> {
    if *policy == RetentionPolicy::KeepAll {
        return Ok(PruneReport::default());
    }

    let entries = list_backups(backup_dir)?;
    Ok(remove_entries(plan_prune(&entries, policy)))
}

/// Delete `entries`, skipping the ones that are already gone
pub fn remove_entries<'a>(entries: impl IntoIterator<Item = &'a BackupEntry>) -> PruneReport {
    let mut report = PruneReport::default();
    for entry in entries {
        match fs::remove_file(&entry.path) {
            Ok(()) => {
                info!(
                    "Cleaned up old backup: {} (year {})",
                    entry.file_name(),
                    entry.game_date.year()
                );
                report.deleted.push(entry.clone());
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("{} already gone", entry.file_name());
            }
            Err(e) => {
                debug!("Failed to delete {}: {e}", entry.file_name());
                report.failed.push(PruneFailure {
                    entry: entry.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }
    report
}
