//! Cheap change fingerprints for the watched save file
//!
//! A [`FileSignature`] is computed from filesystem metadata (size and
//! modification time) and, in [`SignatureMode::Content`], a SHA-256 digest of
//! the file bytes. Two signatures compare equal iff nothing observable about
//! the file changed between the two polls.
//!
//! The file is never opened for exclusive access: metadata mode does not open
//! it at all, content mode opens it read-only while the game may still hold it.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// How a signature is computed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureMode {
    /// Size + modification time only
    #[default]
    Metadata,
    /// Size + modification time + SHA-256 of the content
    Content,
}

impl std::str::FromStr for SignatureMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "metadata" | "mtime" => Ok(Self::Metadata),
            "content" | "hash" => Ok(Self::Content),
            other => Err(format!("unknown signature mode '{other}'")),
        }
    }
}

/// Change fingerprint of a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSignature {
    /// File size in bytes
    pub size: u64,
    /// Last modification time
    pub modified: SystemTime,
    /// Hex SHA-256 of the content, only in [`SignatureMode::Content`]
    pub digest: Option<String>,
}

impl std::fmt::Display for FileSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let secs = self
            .modified
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        write!(f, "{} bytes @ {secs:.3}", self.size)?;
        if let Some(digest) = &self.digest {
            write!(f, " sha256:{}", &digest[..digest.len().min(12)])?;
        }
        Ok(())
    }
}

/// Signature errors
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    /// The watched file does not exist (yet)
    #[error("watched file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Metadata or content could not be read
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// File being fingerprinted
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },
}

impl SignatureError {
    fn from_io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            Self::NotFound(path.to_path_buf())
        } else {
            Self::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

/// Compute the signature of `path`
///
/// # Errors
///
/// Returns [`SignatureError::NotFound`] when the file is absent and
/// [`SignatureError::Io`] for any other read failure.
pub fn compute_signature(path: &Path, mode: SignatureMode) -> Result<FileSignature, SignatureError> {
    let metadata = fs::metadata(path).map_err(|e| SignatureError::from_io(path, e))?;
    if !metadata.is_file() {
        return Err(SignatureError::Io {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
        });
    }

    let modified = metadata
        .modified()
        .map_err(|e| SignatureError::from_io(path, e))?;

    let digest = match mode {
        SignatureMode::Metadata => None,
        SignatureMode::Content => Some(content_digest(path).map_err(|e| SignatureError::from_io(path, e))?),
    };

    Ok(FileSignature {
        size: metadata.len(),
        modified,
        digest,
    })
}

fn content_digest(path: &Path) -> io::Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
