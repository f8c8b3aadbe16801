//! Archive extraction for downloaded releases.
//!
//! Release archives are gzip-compressed tarballs. The binary normally sits
//! at the archive root next to the license and readme; archives that wrap
//! everything in a single top-level folder have that folder stripped.

use std::io;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;

use crate::errors::InstallError;

/// Extracts a tar.gz archive to the destination directory.
///
/// Creates the destination directory if it does not exist. If all entries
/// share a common root folder, it is stripped during extraction
/// (`cli_1.2.3/miru` becomes `miru`).
///
/// # Errors
///
/// Returns [`InstallError::Extraction`] if the archive is unreadable or
/// corrupt, contains absolute or `..` paths, or a file cannot be written.
pub fn extract_tar_gz(archive_path: &Path, dest_dir: &Path) -> Result<(), InstallError> {
    std::fs::create_dir_all(dest_dir).map_err(|e| {
        InstallError::extraction(format!("failed to create {}", dest_dir.display()), Some(e))
    })?;

    let strip_prefix = find_common_root_folder(archive_path)?;
    let mut archive = open_archive(archive_path)?;

    let entries = archive.entries().map_err(|e| read_error(archive_path, e))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| read_error(archive_path, e))?;
        let entry_path = entry
            .path()
            .map_err(|e| read_error(archive_path, e))?
            .into_owned();

        reject_unsafe_path(&entry_path)?;

        let relative_path = match &strip_prefix {
            Some(prefix) => match entry_path.strip_prefix(prefix) {
                Ok(p) if p.as_os_str().is_empty() => continue,
                Ok(p) => p.to_path_buf(),
                Err(_) => entry_path.clone(),
            },
            None => entry_path.clone(),
        };

        let output_path = dest_dir.join(&relative_path);

        if entry.header().entry_type().is_dir() {
            std::fs::create_dir_all(&output_path).map_err(|e| {
                InstallError::extraction(
                    format!("failed to create {}", output_path.display()),
                    Some(e),
                )
            })?;
            continue;
        }

        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                InstallError::extraction(format!("failed to create {}", parent.display()), Some(e))
            })?;
        }

        entry.unpack(&output_path).map_err(|e| {
            InstallError::extraction(format!("failed to extract {}", output_path.display()), Some(e))
        })?;
    }

    tracing::debug!(archive = %archive_path.display(), dest = %dest_dir.display(), "extracted");
    Ok(())
}

/// Finds the executable named `binary` in an extracted archive.
///
/// Looks at the archive root first, then in `bin/`.
///
/// # Errors
///
/// Returns [`InstallError::Extraction`] if neither location has the file.
pub fn find_binary(extract_dir: &Path, binary: &str) -> Result<PathBuf, InstallError> {
    let candidates = [extract_dir.join(binary), extract_dir.join("bin").join(binary)];
    candidates
        .iter()
        .find(|p| p.is_file())
        .cloned()
        .ok_or_else(|| {
            InstallError::extraction(
                format!(
                    "'{binary}' not found in archive; expected at {} or {}",
                    candidates[0].display(),
                    candidates[1].display()
                ),
                None,
            )
        })
}

fn open_archive(archive_path: &Path) -> Result<Archive<GzDecoder<std::fs::File>>, InstallError> {
    let file = std::fs::File::open(archive_path).map_err(|e| {
        InstallError::extraction(format!("failed to open {}", archive_path.display()), Some(e))
    })?;
    Ok(Archive::new(GzDecoder::new(file)))
}

fn read_error(archive_path: &Path, e: io::Error) -> InstallError {
    InstallError::extraction(
        format!("failed to read archive {}", archive_path.display()),
        Some(e),
    )
}

/// Rejects absolute paths and `..` components (path traversal).
fn reject_unsafe_path(path: &Path) -> Result<(), InstallError> {
    if path.is_absolute()
        || path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
    {
        return Err(InstallError::extraction(
            format!(
                "refusing to extract path with parent directory or absolute reference: {}",
                path.display()
            ),
            None,
        ));
    }
    Ok(())
}

/// Finds a common root folder shared by all archive entries.
///
/// Returns `Some(prefix)` only if every entry starts with the same first
/// component and at least one entry is nested below it. A flat archive
/// with a single file is left alone.
fn find_common_root_folder(archive_path: &Path) -> Result<Option<PathBuf>, InstallError> {
    let mut archive = open_archive(archive_path)?;

    let mut common_root: Option<PathBuf> = None;
    let mut has_nested_entries = false;

    let entries = archive.entries().map_err(|e| read_error(archive_path, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| read_error(archive_path, e))?;
        let path = entry.path().map_err(|e| read_error(archive_path, e))?;

        let components: Vec<_> = path
            .components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect();
        if components.len() > 1 {
            has_nested_entries = true;
        }

        let Some(first_component) = components.first() else {
            continue;
        };
        let root = PathBuf::from(first_component.as_os_str());

        match &common_root {
            None => common_root = Some(root),
            Some(existing) if existing != &root => return Ok(None),
            Some(_) => {}
        }
    }

    Ok(if has_nested_entries { common_root } else { None })
}
