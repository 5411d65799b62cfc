//! Backup naming convention
//!
//! Backups are named `{tag}_{YYYY-MM-DD}_{YYYYMMDDTHHMMSS.mmmZ}.bak`. The
//! backup directory is the only index: every [`BackupEntry`] is rebuilt by
//! parsing a filename, so the writer and the retention pass must agree on this
//! module and nothing else.
//!
//! Tags never contain `_` (see [`sanitize_tag`](crate::metadata::sanitize_tag))
//! and the other two components never do either, so a filename splits back
//! into exactly three parts.

use crate::metadata::{GameDate, SaveMetadata};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Extension of finished backups
pub const BACKUP_EXTENSION: &str = "bak";

const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.3fZ";

/// A backup file in the backup directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupEntry {
    /// Full path of the backup file
    pub path: PathBuf,
    /// Player country tag
    pub player_tag: String,
    /// In-game date of the saved game
    pub game_date: GameDate,
    /// Wall-clock time the backup was taken
    pub captured_at: DateTime<Utc>,
}

impl BackupEntry {
    /// Parse a backup path, returning `None` for anything that does not follow
    /// the naming convention
    pub fn from_path(path: &Path) -> Option<Self> {
        let file_name = path.file_name()?.to_str()?;
        let (player_tag, game_date, captured_at) = parse_file_name(file_name)?;
        Some(Self {
            path: path.to_path_buf(),
            player_tag,
            game_date,
            captured_at,
        })
    }

    /// Final path a backup of `metadata` gets inside `backup_dir`
    pub fn for_metadata(backup_dir: &Path, metadata: &SaveMetadata) -> Self {
        Self {
            path: backup_dir.join(file_name_for(metadata)),
            player_tag: metadata.player_tag().to_string(),
            game_date: metadata.game_date(),
            captured_at: metadata.captured_at(),
        }
    }

    /// The filename component of [`BackupEntry::path`]
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Filename for a backup of `metadata`
pub fn file_name_for(metadata: &SaveMetadata) -> String {
    format!(
        "{}_{}_{}.{BACKUP_EXTENSION}",
        metadata.player_tag(),
        metadata.game_date().to_file_component(),
        metadata.captured_at().format(TIMESTAMP_FORMAT)
    )
}

/// Split a backup filename into tag, in-game date and capture time
pub fn parse_file_name(file_name: &str) -> Option<(String, GameDate, DateTime<Utc>)> {
    let stem = file_name.strip_suffix(BACKUP_EXTENSION)?.strip_suffix('.')?;

    let mut parts = stem.rsplitn(3, '_');
    let timestamp = parts.next()?;
    let date = parts.next()?;
    let tag = parts.next()?;

    if tag.is_empty() || tag.starts_with('.') || tag.contains('_') {
        return None;
    }

    let game_date = GameDate::parse_file_component(date)?;
    let captured_at = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT)
        .ok()?
        .and_utc();

    Some((tag.to_string(), game_date, captured_at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn metadata(tag: &str, year: u16) -> SaveMetadata {
        let captured = Utc.with_ymd_and_hms(2025, 3, 1, 12, 30, 5).unwrap()
            + chrono::Duration::milliseconds(42);
        SaveMetadata::new(tag, GameDate::new(year, 11, 11).unwrap(), captured)
    }

    #[test]
    fn test_file_name_format() {
        assert_eq!(
            file_name_for(&metadata("SWE", 1444)),
            "SWE_1444-11-11_20250301T123005.042Z.bak"
        );
    }

    #[test]
    fn test_file_name_round_trips() {
        let meta = metadata("TUR", 1502);
        let entry = BackupEntry::for_metadata(Path::new("/backups"), &meta);
        let parsed = BackupEntry::from_path(&entry.path).unwrap();

        assert_eq!(parsed, entry);
        assert_eq!(parsed.player_tag, meta.player_tag());
        assert_eq!(parsed.game_date, meta.game_date());
        assert_eq!(parsed.captured_at, meta.captured_at());
    }

    #[test]
    fn test_sanitized_tag_round_trips() {
        let meta = metadata("D0_1", 1600);
        assert_eq!(meta.player_tag(), "D0-1");
        let name = file_name_for(&meta);
        let (tag, _, _) = parse_file_name(&name).unwrap();
        assert_eq!(tag, "D0-1");
    }

    #[test]
    fn test_unsafe_tag_and_nanoseconds_round_trip() {
        let captured = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::nanoseconds(123_456_789);
        let meta = SaveMetadata::new("A_B", GameDate::new(1444, 1, 1).unwrap(), captured);
        let entry = BackupEntry::for_metadata(Path::new("/backups"), &meta);

        assert_eq!(entry.file_name(), "A-B_1444-01-01_20250101T000000.123Z.bak");
        assert_eq!(BackupEntry::from_path(&entry.path), Some(entry));
    }

    #[test]
    fn test_largest_year_round_trips() {
        let entry = BackupEntry::for_metadata(Path::new("/backups"), &metadata("SWE", 9999));
        let parsed = BackupEntry::from_path(&entry.path).unwrap();
        assert_eq!(parsed.game_date.year(), 9999);
        assert!(GameDate::new(10000, 1, 1).is_none());
    }

    #[test]
    fn test_lexicographic_order_is_chronological() {
        let mut names: Vec<String> = [1470, 1444, 1460, 1450]
            .into_iter()
            .map(|year| file_name_for(&metadata("SWE", year)))
            .collect();
        names.sort();
        let years: Vec<u16> = names
            .iter()
            .map(|n| parse_file_name(n).unwrap().1.year())
            .collect();
        assert_eq!(years, vec![1444, 1450, 1460, 1470]);
    }

    #[test]
    fn test_malformed_names_do_not_parse() {
        for name in [
            "notes.txt",
            "SWE_1444-11-11.bak",
            "_1444-11-11_20250301T123005.042Z.bak",
            "SWE_1444.11.11_20250301T123005.042Z.bak",
            "SWE_1444-11-11_2025-03-01_12-30-05.bak",
            "SWE_1444-11-11_20250301T123005.042Z.bak.tmp",
            ".SWE_1444-11-11_20250301T123005.042Z.bak.tmp",
            "mp_autosave_SWE_2025-03-01_12-30-05.eu4",
        ] {
            assert!(parse_file_name(name).is_none(), "{name} should not parse");
        }
    }
}
