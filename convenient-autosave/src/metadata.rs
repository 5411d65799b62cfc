//! Save metadata extraction
//!
//! Europa Universalis IV writes saves in three layouts:
//!
//! - plain text starting with the `EU4txt` header,
//! - a zip archive whose `meta` (or `gamestate`) entry is such a text,
//! - the binary `EU4bin` token format used by ironman games.
//!
//! Only the first two are readable here. The top-level `date=` and `player=`
//! lines are all that is needed to name a backup, and they sit at the very top
//! of the text, so only a bounded prefix is scanned.
//!
//! Extraction is read-only and tolerant: a half-written file, an unexpected
//! layout or a foreign file all come back as an [`ExtractionError`], never as
//! a panic.

use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::debug;

const TEXT_HEADER: &[u8] = b"EU4txt";
const BINARY_HEADER: &[u8] = b"EU4bin";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Only this many bytes of text are scanned for the header fields
const SCAN_LIMIT: u64 = 4 * 1024 * 1024;

/// Tag written by the game when nobody is playing a country
const NO_PLAYER: &str = "---";

/// Largest year that fits the four-digit year of a backup filename
pub const MAX_YEAR: u16 = 9999;

/// An in-game calendar date
///
/// The game calendar has no leap years and never maps onto wall-clock time,
/// so this is a plain ordered triple rather than a `chrono` date. Fields are
/// only set through [`GameDate::new`], so every date fits a backup filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct GameDate {
    year: u16,
    month: u8,
    day: u8,
}

impl GameDate {
    /// Create a date, rejecting years past [`MAX_YEAR`] and out-of-range
    /// months and days
    pub fn new(year: u16, month: u8, day: u8) -> Option<Self> {
        if year <= MAX_YEAR && (1..=12).contains(&month) && (1..=31).contains(&day) {
            Some(Self { year, month, day })
        } else {
            None
        }
    }

    /// Year, e.g. 1444
    pub fn year(&self) -> u16 {
        self.year
    }

    /// Month, 1-12
    pub fn month(&self) -> u8 {
        self.month
    }

    /// Day of month, 1-31
    pub fn day(&self) -> u8 {
        self.day
    }

    /// Parse the dotted save notation, e.g. `1444.11.11`
    pub fn parse_save_notation(s: &str) -> Option<Self> {
        Self::parse_with(s, '.')
    }

    /// Zero-padded form used inside backup filenames, e.g. `1444-11-11`
    pub fn to_file_component(&self) -> String {
        format!("{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }

    /// Inverse of [`GameDate::to_file_component`]
    pub fn parse_file_component(s: &str) -> Option<Self> {
        let mut parts = s.split('-');
        let (year, month, day) = (parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() || year.len() != 4 || month.len() != 2 || day.len() != 2 {
            return None;
        }
        Self::parse_with(s, '-')
    }

    fn parse_with(s: &str, sep: char) -> Option<Self> {
        let mut parts = s.trim().split(sep);
        let year = parts.next()?.trim().parse().ok()?;
        let month = parts.next()?.trim().parse().ok()?;
        let day = parts.next()?.trim().parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Self::new(year, month, day)
    }
}

impl std::fmt::Display for GameDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.year, self.month, self.day)
    }
}

/// Metadata used to name and retain a backup
///
/// Only built through [`SaveMetadata::new`], which keeps every value in the
/// form the backup filename round-trips.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveMetadata {
    player_tag: String,
    game_date: GameDate,
    captured_at: DateTime<Utc>,
}

impl SaveMetadata {
    /// Build metadata, sanitizing the tag and truncating the timestamp to
    /// what a backup filename can carry
    pub fn new(player_tag: &str, game_date: GameDate, captured_at: DateTime<Utc>) -> Self {
        Self {
            player_tag: sanitize_tag(player_tag),
            game_date,
            captured_at: captured_at.trunc_subsecs(3),
        }
    }

    /// Filename-safe player country tag
    pub fn player_tag(&self) -> &str {
        &self.player_tag
    }

    /// In-game date recorded in the save
    pub fn game_date(&self) -> GameDate {
        self.game_date
    }

    /// Wall-clock capture time (UTC, millisecond precision)
    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }
}

/// Replace everything but ASCII alphanumerics and `-` with `-`
pub fn sanitize_tag(tag: &str) -> String {
    tag.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect()
}

/// Extraction errors
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    /// The file could not be opened or read
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// Save file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Zero-length file, usually a save that is still being written
    #[error("{} is empty", .0.display())]
    Empty(PathBuf),

    /// Not a save file at all
    #[error("{} is not a save file", .0.display())]
    NotASave(PathBuf),

    /// A save layout that cannot be read
    #[error("{} uses the unsupported {format} format", path.display())]
    UnsupportedFormat {
        /// Save file
        path: PathBuf,
        /// Detected format
        format: String,
    },

    /// Compressed save that could not be unpacked
    #[error("failed to unpack {}: {reason}", path.display())]
    Archive {
        /// Save file
        path: PathBuf,
        /// Archive error
        reason: String,
    },

    /// A required header field is missing
    #[error("{} has no '{field}' field", path.display())]
    MissingField {
        /// Save file
        path: PathBuf,
        /// Field name
        field: &'static str,
    },

    /// A header field could not be parsed
    #[error("{} has an invalid '{field}' value: {value}", path.display())]
    InvalidField {
        /// Save file
        path: PathBuf,
        /// Field name
        field: &'static str,
        /// Raw value
        value: String,
    },
}

/// Extract metadata from the save at `path`, stamping it with the current time
///
/// # Errors
///
/// Returns an [`ExtractionError`] describing why the file cannot be named.
pub fn extract(path: &Path) -> Result<SaveMetadata, ExtractionError> {
    extract_at(path, Utc::now())
}

/// Extract metadata from the save at `path` with an explicit capture time
///
/// # Errors
///
/// Returns an [`ExtractionError`] describing why the file cannot be named.
pub fn extract_at(path: &Path, captured_at: DateTime<Utc>) -> Result<SaveMetadata, ExtractionError> {
    let io_err = |source| ExtractionError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).map_err(io_err)?;
    let mut magic = Vec::with_capacity(TEXT_HEADER.len());
    let _ = (&mut file)
        .take(TEXT_HEADER.len() as u64)
        .read_to_end(&mut magic)
        .map_err(io_err)?;

    if magic.is_empty() {
        return Err(ExtractionError::Empty(path.to_path_buf()));
    }

    let text = if magic.starts_with(ZIP_MAGIC) {
        let _ = file.seek(SeekFrom::Start(0)).map_err(io_err)?;
        read_archive_text(path, file)?
    } else if magic.starts_with(BINARY_HEADER) {
        return Err(ExtractionError::UnsupportedFormat {
            path: path.to_path_buf(),
            format: "EU4bin".to_string(),
        });
    } else if magic == TEXT_HEADER {
        let mut rest = Vec::new();
        let _ = file.take(SCAN_LIMIT).read_to_end(&mut rest).map_err(io_err)?;
        magic.extend_from_slice(&rest);
        magic
    } else {
        return Err(ExtractionError::NotASave(path.to_path_buf()));
    };

    let text = String::from_utf8_lossy(&text);
    let fields = scan_header_fields(&text);
    let metadata = fields.into_metadata(path, captured_at)?;
    debug!(
        "Extracted {} @ {} from {}",
        metadata.player_tag,
        metadata.game_date,
        path.display()
    );
    Ok(metadata)
}

fn read_archive_text(path: &Path, file: File) -> Result<Vec<u8>, ExtractionError> {
    let archive_err = |e: zip::result::ZipError| ExtractionError::Archive {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let mut archive = zip::ZipArchive::new(file).map_err(archive_err)?;
    let entry_name = ["meta", "gamestate"]
        .into_iter()
        .find(|name| archive.file_names().any(|n| n == *name))
        .ok_or_else(|| ExtractionError::NotASave(path.to_path_buf()))?;

    let mut text = Vec::new();
    let entry = archive.by_name(entry_name).map_err(archive_err)?;
    let _ = entry
        .take(SCAN_LIMIT)
        .read_to_end(&mut text)
        .map_err(|e| ExtractionError::Archive {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    if text.starts_with(BINARY_HEADER) {
        return Err(ExtractionError::UnsupportedFormat {
            path: path.to_path_buf(),
            format: "EU4bin".to_string(),
        });
    }
    if !text.starts_with(TEXT_HEADER) {
        return Err(ExtractionError::NotASave(path.to_path_buf()));
    }
    Ok(text)
}

#[derive(Debug, Default)]
struct HeaderFields<'a> {
    date: Option<&'a str>,
    player: Option<&'a str>,
}

impl HeaderFields<'_> {
    fn into_metadata(self, path: &Path, captured_at: DateTime<Utc>) -> Result<SaveMetadata, ExtractionError> {
        let raw_date = self.date.ok_or_else(|| ExtractionError::MissingField {
            path: path.to_path_buf(),
            field: "date",
        })?;
        let game_date = GameDate::parse_save_notation(raw_date).ok_or_else(|| ExtractionError::InvalidField {
            path: path.to_path_buf(),
            field: "date",
            value: raw_date.to_string(),
        })?;

        let player = self
            .player
            .filter(|tag| !tag.is_empty() && *tag != NO_PLAYER)
            .ok_or_else(|| ExtractionError::MissingField {
                path: path.to_path_buf(),
                field: "player",
            })?;

        Ok(SaveMetadata::new(player, game_date, captured_at))
    }
}

/// First unindented `date=` and `player=` values, unquoted
fn scan_header_fields(text: &str) -> HeaderFields<'_> {
    let mut fields = HeaderFields::default();
    for line in text.lines() {
        if line.starts_with(char::is_whitespace) {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"');
        match key.trim() {
            "date" if fields.date.is_none() => fields.date = Some(value),
            "player" if fields.player.is_none() => fields.player = Some(value),
            _ => {}
        }
        if fields.date.is_some() && fields.player.is_some() {
            break;
        }
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;
    use tempfile::TempDir;

    const SAVE: &str = "EU4txt\ndate=1444.11.11\nsave_game=\"mp_autosave.eu4\"\nplayer=\"SWE\"\ndisplayed_country_name=\"Sweden\"\n";

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 30, 0).unwrap()
    }

    #[test]
    fn test_plain_text_save() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("mp_autosave.eu4");
        std::fs::write(&path, SAVE).unwrap();

        let meta = extract_at(&path, fixed_time()).unwrap();
        assert_eq!(meta.player_tag, "SWE");
        assert_eq!(meta.game_date, GameDate::new(1444, 11, 11).unwrap());
        assert_eq!(meta.captured_at, fixed_time());
    }

    #[test]
    fn test_compressed_save_reads_meta_entry() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("mp_autosave.eu4");
        let file = std::fs::File::create(&path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        zip.start_file("meta", zip::write::FileOptions::default()).unwrap();
        zip.write_all(b"EU4txt\ndate=1502.3.4\nplayer=\"TUR\"\n").unwrap();
        zip.start_file("gamestate", zip::write::FileOptions::default()).unwrap();
        zip.write_all(b"EU4txt\ndate=1502.3.4\n").unwrap();
        let _ = zip.finish().unwrap();

        let meta = extract_at(&path, fixed_time()).unwrap();
        assert_eq!(meta.player_tag, "TUR");
        assert_eq!(meta.game_date, GameDate::new(1502, 3, 4).unwrap());
    }

    #[test]
    fn test_truncated_archive_is_an_archive_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("mp_autosave.eu4");
        std::fs::write(&path, b"PK\x03\x04\x14\x00\x00\x00").unwrap();

        let err = extract_at(&path, fixed_time()).unwrap_err();
        assert!(matches!(err, ExtractionError::Archive { .. }), "{err}");
    }

    #[test]
    fn test_binary_save_is_unsupported() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ironman.eu4");
        std::fs::write(&path, b"EU4bin\x01\x02\x03").unwrap();

        let err = extract_at(&path, fixed_time()).unwrap_err();
        assert!(matches!(err, ExtractionError::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_empty_and_foreign_files() {
        let tmp = TempDir::new().unwrap();
        let empty = tmp.path().join("empty.eu4");
        std::fs::write(&empty, b"").unwrap();
        assert!(matches!(extract_at(&empty, fixed_time()), Err(ExtractionError::Empty(_))));

        let foreign = tmp.path().join("notes.txt");
        std::fs::write(&foreign, "date=1444.11.11\nplayer=SWE\n").unwrap();
        assert!(matches!(extract_at(&foreign, fixed_time()), Err(ExtractionError::NotASave(_))));
    }

    #[test]
    fn test_partial_write_reports_missing_field() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("mp_autosave.eu4");
        std::fs::write(&path, "EU4txt\ndate=1444.11.11\nsave_ga").unwrap();

        let err = extract_at(&path, fixed_time()).unwrap_err();
        assert!(matches!(err, ExtractionError::MissingField { field: "player", .. }));
    }

    #[test]
    fn test_no_player_sentinel_is_missing() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("observer.eu4");
        std::fs::write(&path, "EU4txt\ndate=1444.11.11\nplayer=\"---\"\n").unwrap();

        let err = extract_at(&path, fixed_time()).unwrap_err();
        assert!(matches!(err, ExtractionError::MissingField { field: "player", .. }));
    }

    #[test]
    fn test_invalid_date() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.eu4");
        std::fs::write(&path, "EU4txt\ndate=1444.13.1\nplayer=\"SWE\"\n").unwrap();

        let err = extract_at(&path, fixed_time()).unwrap_err();
        assert!(matches!(err, ExtractionError::InvalidField { field: "date", .. }));
    }

    #[test]
    fn test_five_digit_year_is_invalid() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("far_future.eu4");
        std::fs::write(&path, "EU4txt\ndate=10000.1.1\nplayer=\"SWE\"\n").unwrap();

        let err = extract_at(&path, fixed_time()).unwrap_err();
        assert!(matches!(err, ExtractionError::InvalidField { field: "date", .. }));

        std::fs::write(&path, "EU4txt\ndate=9999.12.31\nplayer=\"SWE\"\n").unwrap();
        let meta = extract_at(&path, fixed_time()).unwrap();
        assert_eq!(meta.game_date().year(), 9999);
    }

    #[test]
    fn test_nested_fields_are_ignored() {
        let text = "EU4txt\ncountries={\n\tplayer=\"FRA\"\n\tdate=1400.1.1\n}\ndate=1450.2.3\nplayer=\"ENG\"\n";
        let fields = scan_header_fields(text);
        assert_eq!(fields.date, Some("1450.2.3"));
        assert_eq!(fields.player, Some("ENG"));
    }

    #[test]
    fn test_game_date_ordering_and_forms() {
        let early = GameDate::parse_save_notation("1444.11.11").unwrap();
        let late = GameDate::parse_save_notation("1445.1.1").unwrap();
        assert!(early < late);
        assert_eq!(early.to_string(), "1444.11.11");
        assert_eq!(late.to_file_component(), "1445-01-01");
        assert_eq!(GameDate::parse_file_component("1445-01-01"), Some(late));
        assert_eq!(GameDate::parse_file_component("1445-1-1"), None);
    }

    #[test]
    fn test_sanitize_tag() {
        assert_eq!(sanitize_tag("SWE"), "SWE");
        assert_eq!(sanitize_tag("D0_1 x"), "D0-1-x");
    }
}
