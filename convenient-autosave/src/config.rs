//! Monitoring session configuration
//!
//! Loading and persisting settings is the caller's job. The engine only
//! receives an immutable [`MonitorConfig`] and refuses to start a session with
//! one that fails [`MonitorConfig::validate`].

use crate::retention::RetentionPolicy;
use crate::signature::SignatureMode;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Default time between polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Name of the backup directory created next to the save by default
pub const DEFAULT_BACKUP_DIR_NAME: &str = "backups";

/// Invalid configuration, fatal for the session it was supplied to
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// No source path was given
    #[error("source save path is empty")]
    EmptySource,

    /// The source path points at a directory
    #[error("source {} is a directory, expected a save file", .0.display())]
    SourceIsDirectory(PathBuf),

    /// No backup directory was given
    #[error("backup directory is empty")]
    EmptyBackupDir,

    /// The backup directory is the save itself
    #[error("backup directory {} is the source file", .0.display())]
    BackupDirIsSource(PathBuf),

    /// The backup directory path is an existing file
    #[error("backup directory {} is an existing file", .0.display())]
    BackupDirIsFile(PathBuf),

    /// Zero poll interval
    #[error("poll interval must be greater than zero")]
    ZeroInterval,

    /// Retention value that is neither `all` nor a positive year count
    #[error("invalid retention '{0}': expected 'all' or a number of years >= 1")]
    InvalidRetention(String),
}

impl FromStr for RetentionPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        if value.eq_ignore_ascii_case("all") {
            return Ok(Self::KeepAll);
        }
        match value.parse::<u32>() {
            Ok(years) if years >= 1 => Ok(Self::KeepLastYears(years)),
            _ => Err(ConfigError::InvalidRetention(value.to_string())),
        }
    }
}

/// Everything a monitoring session needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Live save file to watch
    pub source: PathBuf,
    /// Directory receiving the backups
    pub backup_dir: PathBuf,
    /// Time between polls
    pub poll_interval: Duration,
    /// Which backups to keep
    pub retention: RetentionPolicy,
    /// How changes are detected
    pub signature_mode: SignatureMode,
}

impl MonitorConfig {
    /// Config with default interval, retention and signature mode
    pub fn new(source: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            backup_dir: backup_dir.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            retention: RetentionPolicy::default(),
            signature_mode: SignatureMode::default(),
        }
    }

    /// Set the poll interval
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Set the retention policy
    #[must_use]
    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    /// Set the signature mode
    #[must_use]
    pub fn with_signature_mode(mut self, signature_mode: SignatureMode) -> Self {
        self.signature_mode = signature_mode;
        self
    }

    /// The default backup directory for a save: `backups` next to it
    pub fn default_backup_dir(source: &Path) -> PathBuf {
        source
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(DEFAULT_BACKUP_DIR_NAME)
    }

    /// Check the config before a session starts
    ///
    /// The source file itself may be missing; the loop waits for it.
    ///
    /// # Errors
    ///
    /// Returns the first problem found as a [`ConfigError`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.as_os_str().is_empty() {
            return Err(ConfigError::EmptySource);
        }
        if self.source.is_dir() {
            return Err(ConfigError::SourceIsDirectory(self.source.clone()));
        }
        if self.backup_dir.as_os_str().is_empty() {
            return Err(ConfigError::EmptyBackupDir);
        }
        if self.backup_dir == self.source {
            return Err(ConfigError::BackupDirIsSource(self.backup_dir.clone()));
        }
        if self.backup_dir.is_file() {
            return Err(ConfigError::BackupDirIsFile(self.backup_dir.clone()));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        if self.retention == RetentionPolicy::KeepLastYears(0) {
            return Err(ConfigError::InvalidRetention("0".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_retention_from_str() {
        assert_eq!("all".parse::<RetentionPolicy>(), Ok(RetentionPolicy::KeepAll));
        assert_eq!(" ALL ".parse::<RetentionPolicy>(), Ok(RetentionPolicy::KeepAll));
        assert_eq!("50".parse::<RetentionPolicy>(), Ok(RetentionPolicy::KeepLastYears(50)));
        assert!(matches!("0".parse::<RetentionPolicy>(), Err(ConfigError::InvalidRetention(_))));
        assert!(matches!("-3".parse::<RetentionPolicy>(), Err(ConfigError::InvalidRetention(_))));
        assert!(matches!("forever".parse::<RetentionPolicy>(), Err(ConfigError::InvalidRetention(_))));
    }

    #[test]
    fn test_valid_config_with_missing_source() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("mp_autosave.eu4");
        let config = MonitorConfig::new(&source, MonitorConfig::default_backup_dir(&source));
        assert_eq!(config.backup_dir, tmp.path().join("backups"));
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_invalid_configs() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("mp_autosave.eu4");
        std::fs::write(&source, b"EU4txt").unwrap();

        let cases = [
            (MonitorConfig::new("", tmp.path().join("b")), ConfigError::EmptySource),
            (
                MonitorConfig::new(tmp.path(), tmp.path().join("b")),
                ConfigError::SourceIsDirectory(tmp.path().to_path_buf()),
            ),
            (MonitorConfig::new(&source, ""), ConfigError::EmptyBackupDir),
            (MonitorConfig::new(&source, &source), ConfigError::BackupDirIsSource(source.clone())),
            (
                MonitorConfig::new(tmp.path().join("other.eu4"), &source),
                ConfigError::BackupDirIsFile(source.clone()),
            ),
            (
                MonitorConfig::new(&source, tmp.path().join("b")).with_poll_interval(Duration::ZERO),
                ConfigError::ZeroInterval,
            ),
            (
                MonitorConfig::new(&source, tmp.path().join("b")).with_retention(RetentionPolicy::KeepLastYears(0)),
                ConfigError::InvalidRetention("0".to_string()),
            ),
        ];

        for (config, expected) in cases {
            assert_eq!(config.validate(), Err(expected));
        }
    }
}
