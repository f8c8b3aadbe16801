//! Checksum verification for downloaded release archives.
//!
//! The release host publishes one manifest per version with a
//! `{sha256-hex}  {filename}` line for every archive. The downloaded
//! archive is hashed locally and compared against its line.

use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::errors::InstallError;

/// Parsed checksum manifest, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChecksumManifest {
    entries: Vec<(String, String)>,
}

impl ChecksumManifest {
    /// Parses manifest text.
    ///
    /// Lines are `{digest} {filename}` separated by any whitespace; a `*`
    /// binary-mode marker before the filename is dropped. Blank and
    /// malformed lines are skipped.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let entries = text
            .lines()
            .filter_map(|line| {
                let mut fields = line.split_whitespace();
                let digest = fields.next()?;
                let name = fields.next()?;
                if fields.next().is_some() || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
                    return None;
                }
                let name = name.strip_prefix('*').unwrap_or(name);
                Some((digest.to_string(), name.to_string()))
            })
            .collect();
        Self { entries }
    }

    /// Returns the digest listed for exactly `filename`, first match wins.
    #[must_use]
    pub fn lookup(&self, filename: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, name)| name == filename)
            .map(|(digest, _)| digest.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of a verification that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// The archive matches its manifest entry.
    Verified,
    /// The manifest has no line for the archive; nothing was checked.
    EntryNotFound,
}

/// Verifies `file_path` against the manifest line for `filename`.
///
/// # Errors
///
/// Returns [`InstallError::ChecksumMismatch`] when the digests differ, or
/// an error if the file cannot be read.
pub fn verify_artifact(
    manifest: &ChecksumManifest,
    filename: &str,
    file_path: &Path,
) -> Result<VerifyOutcome, InstallError> {
    let Some(expected) = manifest.lookup(filename) else {
        return Ok(VerifyOutcome::EntryNotFound);
    };
    verify_checksum(file_path, filename, expected)?;
    Ok(VerifyOutcome::Verified)
}

/// Verifies that a file matches the expected SHA256 checksum.
///
/// `expected` is compared case-insensitively.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the checksum differs.
pub fn verify_checksum(file_path: &Path, filename: &str, expected: &str) -> Result<(), InstallError> {
    let computed = compute_sha256(file_path)?;
    let expected = expected.to_ascii_lowercase();

    if computed != expected {
        return Err(InstallError::checksum_mismatch(filename, expected, computed));
    }
    tracing::debug!(file = filename, digest = %computed, "checksum verified");
    Ok(())
}

/// Computes the SHA256 hash of a file as a lowercase hex string.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn compute_sha256(file_path: &Path) -> Result<String, InstallError> {
    let read_error = |e: std::io::Error| InstallError::ChecksumRead {
        path: file_path.to_path_buf(),
        source: e,
    };

    let mut file = std::fs::File::open(file_path).map_err(read_error)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = file.read(&mut buffer).map_err(read_error)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}
