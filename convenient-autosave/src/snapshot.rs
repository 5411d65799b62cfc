//! Atomic snapshots of the live save
//!
//! Copies go through a hidden temp file in the backup directory:
//! 1. copy the save into `.{name}.tmp`
//! 2. fsync the temp file
//! 3. rename it to the final backup name
//! 4. fsync the directory (best effort)
//!
//! A crash before step 3 leaves only a temp file behind, never a truncated
//! file under a backup name. [`sweep_temp_files`] removes such leftovers.

use crate::backup::{BACKUP_EXTENSION, BackupEntry};
use crate::metadata::SaveMetadata;
use filetime::FileTime;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const TEMP_SUFFIX: &str = "tmp";

/// Snapshot errors
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// The backup directory could not be created
    #[error("failed to create backup directory {}: {source}", path.display())]
    CreateDir {
        /// Backup directory
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Copying the save failed
    #[error("failed to copy {} to {}: {source}", from.display(), to.display())]
    Copy {
        /// Source save
        from: PathBuf,
        /// Temp file being written
        to: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Moving the finished copy into place failed
    #[error("failed to rename {} to {}: {source}", from.display(), to.display())]
    Rename {
        /// Temp file
        from: PathBuf,
        /// Final backup path
        to: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// A backup with this exact name exists already
    #[error("backup {} already exists", .0.display())]
    AlreadyExists(PathBuf),
}

/// Temp path a backup is staged under before it gets its final name
pub fn temp_path_for(final_path: &Path) -> PathBuf {
    let name = final_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    final_path.with_file_name(format!(".{name}.{TEMP_SUFFIX}"))
}

fn is_temp_file_name(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(&format!(".{BACKUP_EXTENSION}.{TEMP_SUFFIX}"))
}

/// Copy `source` into `backup_dir` under the name derived from `metadata`
///
/// The backup directory is created if missing. The backup keeps the source's
/// modification time.
///
/// # Errors
///
/// Returns a [`SnapshotError`]; in every error case no file with the final
/// backup name has been created and the temp file has been removed.
pub fn snapshot(source: &Path, backup_dir: &Path, metadata: &SaveMetadata) -> Result<BackupEntry, SnapshotError> {
    fs::create_dir_all(backup_dir).map_err(|source| SnapshotError::CreateDir {
        path: backup_dir.to_path_buf(),
        source,
    })?;

    let entry = BackupEntry::for_metadata(backup_dir, metadata);
    if entry.path.exists() {
        return Err(SnapshotError::AlreadyExists(entry.path));
    }

    let temp_path = temp_path_for(&entry.path);
    if let Err(e) = copy_to_temp(source, &temp_path) {
        let _ = fs::remove_file(&temp_path);
        return Err(SnapshotError::Copy {
            from: source.to_path_buf(),
            to: temp_path,
            source: e,
        });
    }

    if let Err(e) = fs::rename(&temp_path, &entry.path) {
        let _ = fs::remove_file(&temp_path);
        return Err(SnapshotError::Rename {
            from: temp_path,
            to: entry.path,
            source: e,
        });
    }

    if let Ok(dir) = File::open(backup_dir) {
        let _ = dir.sync_all(); // Not supported everywhere
    }

    info!("Backup created: {}", entry.file_name());
    Ok(entry)
}

fn copy_to_temp(source: &Path, temp_path: &Path) -> io::Result<()> {
    let input = File::open(source)?;
    let source_mtime = FileTime::from_last_modification_time(&input.metadata()?);

    let output = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(temp_path)?;

    let mut writer = BufWriter::new(output);
    let copied = io::copy(&mut BufReader::new(input), &mut writer)?;
    writer.flush()?;

    let output = writer.into_inner().map_err(io::IntoInnerError::into_error)?;
    output.sync_all()?;
    drop(output);

    filetime::set_file_mtime(temp_path, source_mtime)?;
    debug!("Copied {copied} bytes to {}", temp_path.display());
    Ok(())
}

/// Remove temp files left behind by an interrupted snapshot
///
/// Returns the removed paths. A missing backup directory is not an error.
///
/// # Errors
///
/// Fails only if the directory exists but cannot be listed.
pub fn sweep_temp_files(backup_dir: &Path) -> io::Result<Vec<PathBuf>> {
    let read_dir = match fs::read_dir(backup_dir) {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut removed = Vec::new();
    for dir_entry in read_dir {
        let dir_entry = match dir_entry {
            Ok(dir_entry) => dir_entry,
            Err(e) => {
                debug!("Skipping unreadable entry in {}: {e}", backup_dir.display());
                continue;
            }
        };
        let name = dir_entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !is_temp_file_name(name) || !dir_entry.file_type().is_ok_and(|t| t.is_file()) {
            continue;
        }
        match fs::remove_file(dir_entry.path()) {
            Ok(()) => removed.push(dir_entry.path()),
            Err(e) => warn!("Could not remove stale temp file {name}: {e}"),
        }
    }
    Ok(removed)
}
