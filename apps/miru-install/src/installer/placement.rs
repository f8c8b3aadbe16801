//! Placement of the extracted binary into its install directory.
//!
//! The binary is moved, never copied in place, so the destination path only
//! ever holds a complete file. When the install directory is not writable by
//! the current user the staging copy, the rename and the `chmod` go through
//! `sudo`.

use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use super::platform::PlatformTarget;
use crate::config::InstallConfig;
use crate::errors::{Advisory, InstallError};

/// Where the binary goes and whether writing there needs `sudo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallTarget {
    pub directory: PathBuf,
    pub requires_elevation: bool,
}

impl InstallTarget {
    /// Picks the install directory and probes whether it is writable.
    ///
    /// An explicit directory from the configuration wins; otherwise the
    /// platform default is used, with the Apple-silicon alternate when
    /// `dir_exists` reports it.
    #[must_use]
    pub fn resolve(
        config: &InstallConfig,
        target: PlatformTarget,
        dir_exists: impl Fn(&Path) -> bool,
    ) -> Self {
        let directory = config
            .install_dir
            .clone()
            .unwrap_or_else(|| target.default_install_dir(dir_exists));
        let requires_elevation = !probe_writable(&directory);
        tracing::debug!(
            directory = %directory.display(),
            requires_elevation,
            "resolved install target"
        );
        Self {
            directory,
            requires_elevation,
        }
    }

    /// Full path of `file_name` inside the install directory.
    #[must_use]
    pub fn destination(&self, file_name: &str) -> PathBuf {
        self.directory.join(file_name)
    }
}

/// Returns `true` if the current user can create files in `dir`.
///
/// A directory that does not exist yet is judged by its nearest existing
/// ancestor, since it will be created there.
#[must_use]
pub fn probe_writable(dir: &Path) -> bool {
    let Some(existing) = dir.ancestors().find(|p| p.is_dir()) else {
        return false;
    };
    tempfile::Builder::new()
        .prefix(".miru-install-probe-")
        .tempfile_in(existing)
        .is_ok()
}

/// Moves `source` to `{directory}/{file_name}`, replacing any existing file.
///
/// # Errors
///
/// Returns [`InstallError::Install`] if the move fails, or if elevation is
/// required and `sudo` is unavailable or refused.
pub fn place_binary(
    source: &Path,
    target: &InstallTarget,
    file_name: &str,
) -> Result<PathBuf, InstallError> {
    if target.requires_elevation {
        return place_elevated(source, target, file_name, find_sudo().as_deref());
    }

    let dest = target.destination(file_name);
    let dir = &target.directory;

    std::fs::create_dir_all(dir)
        .map_err(|e| InstallError::install(dir, "could not create directory", Some(e)))?;

    match std::fs::rename(source, &dest) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            tracing::debug!("scratch and install directory are on different devices");
            move_across_devices(source, &dest, dir)?;
        }
        Err(e) => {
            return Err(InstallError::install(
                dir,
                format!("could not move binary to {}", dest.display()),
                Some(e),
            ));
        }
    }

    tracing::debug!(dest = %dest.display(), "placed binary");
    Ok(dest)
}

/// Copies `source` into the install directory with `sudo cp`, then renames
/// the copy over the destination with `sudo mv -f`.
///
/// The copy lands under a hidden name, so the destination path only ever
/// sees the rename. The staged file is removed if either step fails.
fn place_elevated(
    source: &Path,
    target: &InstallTarget,
    file_name: &str,
    sudo: Option<&Path>,
) -> Result<PathBuf, InstallError> {
    let dest = target.destination(file_name);
    let dir = &target.directory;

    println!(
        "Elevated permissions are required to install into {}.",
        dir.display()
    );
    let sudo = sudo.ok_or_else(|| {
        InstallError::install(dir, "the directory is not writable and sudo was not found", None)
    })?;

    if !dir.is_dir() {
        run_elevated(sudo, &[OsStr::new("mkdir"), OsStr::new("-p"), dir.as_os_str()])
            .map_err(|e| InstallError::install(dir, "could not create directory", Some(e)))?;
    }

    let staged = dir.join(format!(".miru-install-{}", std::process::id()));
    let result = run_elevated(
        sudo,
        &[OsStr::new("cp"), source.as_os_str(), staged.as_os_str()],
    )
    .map_err(|e| {
        InstallError::install(dir, "could not stage binary in install directory", Some(e))
    })
    .and_then(|()| {
        run_elevated(
            sudo,
            &[
                OsStr::new("mv"),
                OsStr::new("-f"),
                staged.as_os_str(),
                dest.as_os_str(),
            ],
        )
        .map_err(|e| InstallError::install(dir, "sudo mv failed", Some(e)))
    });

    if result.is_err() {
        let _ = run_elevated(
            sudo,
            &[OsStr::new("rm"), OsStr::new("-f"), staged.as_os_str()],
        );
    }
    result?;

    tracing::debug!(dest = %dest.display(), "placed binary with sudo");
    Ok(dest)
}

/// Copies into a temp file beside `dest`, then renames it over `dest`.
fn move_across_devices(source: &Path, dest: &Path, dir: &Path) -> Result<(), InstallError> {
    let staging_error = |e: io::Error| {
        InstallError::install(dir, "could not stage binary in install directory", Some(e))
    };

    let mut staged = tempfile::Builder::new()
        .prefix(".miru-install-")
        .tempfile_in(dir)
        .map_err(staging_error)?;
    let mut input = std::fs::File::open(source).map_err(staging_error)?;
    io::copy(&mut input, staged.as_file_mut()).map_err(staging_error)?;
    staged.as_file().sync_all().map_err(staging_error)?;

    staged.persist(dest).map_err(|e| {
        InstallError::install(
            dir,
            format!("could not move binary to {}", dest.display()),
            Some(e.error),
        )
    })?;

    let _ = std::fs::remove_file(source);
    Ok(())
}

/// Sets mode `0755` on the installed binary.
///
/// # Errors
///
/// Returns [`InstallError::Permission`] if the mode cannot be changed.
#[cfg(unix)]
pub fn set_executable(path: &Path, elevated: bool) -> Result<(), InstallError> {
    use std::os::unix::fs::PermissionsExt;

    if elevated {
        return chmod_elevated(path, find_sudo().as_deref());
    }

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .map_err(|e| InstallError::permission(path, "chmod failed", Some(e)))
}

#[cfg(unix)]
fn chmod_elevated(path: &Path, sudo: Option<&Path>) -> Result<(), InstallError> {
    let sudo = sudo.ok_or_else(|| InstallError::permission(path, "sudo was not found", None))?;
    run_elevated(
        sudo,
        &[OsStr::new("chmod"), OsStr::new("755"), path.as_os_str()],
    )
    .map_err(|e| InstallError::permission(path, "sudo chmod failed", Some(e)))
}

/// Windows has no executable bit; `.exe` is enough.
#[cfg(not(unix))]
pub fn set_executable(_path: &Path, _elevated: bool) -> Result<(), InstallError> {
    Ok(())
}

/// Checks that `binary` resolves on `search_path`.
///
/// Resolution to a different file than `installed` is only logged: the
/// install itself is correct, the environment shadows it.
#[must_use]
pub fn self_check(binary: &str, installed: &Path, search_path: Option<&OsStr>) -> Option<Advisory> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    match which::which_in(binary, search_path, cwd) {
        Ok(found) => {
            if found != installed {
                tracing::warn!(
                    found = %found.display(),
                    installed = %installed.display(),
                    "another '{binary}' comes first on PATH"
                );
            }
            None
        }
        Err(e) => {
            tracing::debug!(error = %e, "self-check lookup failed");
            Some(Advisory::SelfCheck {
                binary: binary.to_string(),
            })
        }
    }
}

fn find_sudo() -> Option<PathBuf> {
    which::which("sudo").ok()
}

/// Runs `sudo` with `args`, inheriting the terminal so it can prompt.
fn run_elevated(sudo: &Path, args: &[&OsStr]) -> io::Result<()> {
    tracing::debug!(?args, "running with sudo");
    let status = Command::new(sudo).args(args).status()?;
    if status.success() {
        Ok(())
    } else {
        Err(io::Error::other(format!("sudo exited with {status}")))
    }
}
