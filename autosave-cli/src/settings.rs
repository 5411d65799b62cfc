//! Persisted settings and default path detection
//!
//! Settings live in a JSON file. Keys written by older versions of the tool
//! (`SOURCE`, `BACKUP_DIR`) are still accepted.

use crate::cli::SettingsOverrides;
use convenient_autosave::{ConfigError, MonitorConfig, RetentionPolicy, SignatureMode};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// File the game keeps rewriting during a multiplayer session
pub const AUTOSAVE_FILE_NAME: &str = "mp_autosave.eu4";

const SAVE_GAMES_SUBDIR: [&str; 3] = ["Paradox Interactive", "Europa Universalis IV", "save games"];

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read settings {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write settings {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid settings file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("no save file configured and none found in the usual save game folders; pass --source")]
    NoSource,

    #[error("invalid interval {0}")]
    InvalidInterval(f64),

    #[error(transparent)]
    Signature(#[from] SignatureModeError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct SignatureModeError(String);

/// Retention as written in the settings file: `"all"` or a year count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeepYears {
    Years(u32),
    Keyword(String),
}

impl KeepYears {
    fn to_policy(&self) -> Result<RetentionPolicy, ConfigError> {
        match self {
            Self::Years(years) => years.to_string().parse(),
            Self::Keyword(keyword) => keyword.parse(),
        }
    }
}

impl From<RetentionPolicy> for KeepYears {
    fn from(policy: RetentionPolicy) -> Self {
        match policy {
            RetentionPolicy::KeepAll => Self::Keyword("all".to_string()),
            RetentionPolicy::KeepLastYears(years) => Self::Years(years),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default, alias = "SOURCE", skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,

    #[serde(default, alias = "BACKUP_DIR", skip_serializing_if = "Option::is_none")]
    pub backup_dir: Option<PathBuf>,

    /// Seconds between polls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_years: Option<KeepYears>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<SignatureMode>,
}

impl Settings {
    /// Load settings; a missing file yields empty settings
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No settings at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(SettingsError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write settings as pretty JSON, creating the parent directory
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let write_err = |source| SettingsError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| write_err(io::Error::other(e)))?;
        fs::write(path, json + "\n").map_err(write_err)
    }

    /// Apply command-line overrides on top of the file's values
    pub fn with_overrides(mut self, overrides: &SettingsOverrides) -> Result<Self, SettingsError> {
        if let Some(source) = &overrides.source {
            self.source = Some(source.clone());
        }
        if let Some(backup_dir) = &overrides.backup_dir {
            self.backup_dir = Some(backup_dir.clone());
        }
        if let Some(interval) = overrides.interval {
            self.interval = Some(interval);
        }
        if let Some(keep_years) = &overrides.keep_years {
            self.keep_years = Some(keep_years.parse::<RetentionPolicy>()?.into());
        }
        if let Some(signature) = &overrides.signature {
            self.signature = Some(signature.parse().map_err(SignatureModeError)?);
        }
        Ok(self)
    }

    /// Fill the gaps with detected paths and defaults
    pub fn to_config(&self) -> Result<MonitorConfig, SettingsError> {
        let source = match &self.source {
            Some(source) => source.clone(),
            None => detect_autosave().ok_or(SettingsError::NoSource)?,
        };
        let backup_dir = self
            .backup_dir
            .clone()
            .unwrap_or_else(|| MonitorConfig::default_backup_dir(&source));

        let mut config = MonitorConfig::new(source, backup_dir);
        if let Some(interval) = self.interval {
            let poll_interval =
                Duration::try_from_secs_f64(interval).map_err(|_| SettingsError::InvalidInterval(interval))?;
            config = config.with_poll_interval(poll_interval);
        }
        if let Some(keep_years) = &self.keep_years {
            config = config.with_retention(keep_years.to_policy()?);
        }
        if let Some(signature) = self.signature {
            config = config.with_signature_mode(signature);
        }
        Ok(config)
    }
}

/// `<config dir>/autosave/settings.json`, or `autosave.json` in the working
/// directory when there is no config dir
pub fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("autosave").join("settings.json"))
        .unwrap_or_else(|| PathBuf::from("autosave.json"))
}

/// Existing save game folders, most likely first
pub fn save_game_dirs() -> Vec<PathBuf> {
    let mut roots = Vec::new();
    roots.extend(dirs::document_dir());
    roots.extend(dirs::home_dir().map(|home| home.join("Documents")));
    roots.extend(dirs::data_local_dir());

    let mut found: Vec<PathBuf> = Vec::new();
    for root in roots {
        let dir = SAVE_GAMES_SUBDIR.iter().fold(root, |dir, part| dir.join(part));
        if dir.is_dir() && !found.contains(&dir) {
            found.push(dir);
        }
    }
    found
}

/// The multiplayer autosave in the first save game folder that has one
pub fn detect_autosave() -> Option<PathBuf> {
    save_game_dirs()
        .into_iter()
        .map(|dir| dir.join(AUTOSAVE_FILE_NAME))
        .find(|path| path.is_file())
}
