//! Platform detection for the miru installer.
//!
//! Maps the host kernel name and machine string to the tokens used in
//! release archive names (`cli_{OS}_{ARCH}.tar.gz`).
//!
//! ## Naming Table
//!
//! - kernel `darwin` -> `Darwin`, `linux` -> `Linux`, `windows*` -> `Windows`
//! - machine `x86_64` / `amd64` -> `x86_64`, `aarch64` / `arm64` -> `arm64`,
//!   `armv7l` -> `armv7`
//!
//! Kernel and machine are matched case-insensitively. Anything outside the
//! table is an error, never a default.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::errors::InstallError;

/// Generic install directory.
pub const DEFAULT_INSTALL_DIR: &str = "/usr/local/bin";

/// Homebrew's prefix on Apple silicon, preferred when present.
pub const APPLE_SILICON_INSTALL_DIR: &str = "/opt/homebrew/bin";

/// Oldest macOS release the published binaries run on.
const MIN_MACOS_VERSION: (u32, u32) = (10, 15);

/// Operating system token used in archive names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsToken {
    Darwin,
    Linux,
    Windows,
}

impl OsToken {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Darwin => "Darwin",
            Self::Linux => "Linux",
            Self::Windows => "Windows",
        }
    }

    fn from_kernel(kernel: &str) -> Option<Self> {
        let kernel = kernel.trim().to_ascii_lowercase();
        match kernel.as_str() {
            "darwin" => Some(Self::Darwin),
            "linux" => Some(Self::Linux),
            k if k.starts_with("windows")
                || k.starts_with("mingw")
                || k.starts_with("msys")
                || k.starts_with("cygwin") =>
            {
                Some(Self::Windows)
            }
            _ => None,
        }
    }
}

/// CPU architecture token used in archive names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchToken {
    X86_64,
    Arm64,
    Armv7,
}

impl ArchToken {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::X86_64 => "x86_64",
            Self::Arm64 => "arm64",
            Self::Armv7 => "armv7",
        }
    }

    fn from_machine(machine: &str) -> Option<Self> {
        match machine.trim().to_ascii_lowercase().as_str() {
            "x86_64" | "amd64" => Some(Self::X86_64),
            "aarch64" | "arm64" => Some(Self::Arm64),
            "armv7l" => Some(Self::Armv7),
            _ => None,
        }
    }
}

/// The release artifact flavour for this machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlatformTarget {
    pub os: OsToken,
    pub arch: ArchToken,
}

impl PlatformTarget {
    /// Derives the target from a kernel name (`uname -s`) and machine
    /// string (`uname -m`).
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::UnsupportedPlatform`] for an unknown kernel
    /// and [`InstallError::UnsupportedArchitecture`] for an unknown CPU.
    pub fn from_host(kernel: &str, machine: &str) -> Result<Self, InstallError> {
        let os = OsToken::from_kernel(kernel).ok_or_else(|| {
            InstallError::unsupported_platform(format!(
                "kernel '{kernel}' (supported: Darwin, Linux, Windows)"
            ))
        })?;
        let arch = ArchToken::from_machine(machine)
            .ok_or_else(|| InstallError::unsupported_architecture(machine))?;
        Ok(Self { os, arch })
    }

    /// Returns `.exe` on Windows, empty otherwise.
    #[must_use]
    pub fn binary_suffix(self) -> &'static str {
        match self.os {
            OsToken::Windows => ".exe",
            OsToken::Darwin | OsToken::Linux => "",
        }
    }

    /// File name of the release archive, e.g. `cli_Linux_x86_64.tar.gz`.
    #[must_use]
    pub fn artifact_name(self) -> String {
        format!("cli_{}_{}.tar.gz", self.os.as_str(), self.arch.as_str())
    }

    /// File name of the executable for `name` on this platform.
    #[must_use]
    pub fn binary_file_name(self, name: &str) -> String {
        format!("{name}{}", self.binary_suffix())
    }

    #[must_use]
    pub fn is_apple_silicon(self) -> bool {
        self.os == OsToken::Darwin && self.arch == ArchToken::Arm64
    }

    /// Picks the install directory for this platform.
    ///
    /// Apple silicon Macs use the Homebrew prefix only when `exists`
    /// reports that it is there; everything else gets `/usr/local/bin`.
    #[must_use]
    pub fn default_install_dir(self, exists: impl Fn(&Path) -> bool) -> PathBuf {
        let alternate = Path::new(APPLE_SILICON_INSTALL_DIR);
        if self.is_apple_silicon() && exists(alternate) {
            return alternate.to_path_buf();
        }
        PathBuf::from(DEFAULT_INSTALL_DIR)
    }
}

impl fmt::Display for PlatformTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os.as_str(), self.arch.as_str())
    }
}

/// Raw host identification strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    pub kernel: String,
    pub machine: String,
}

impl HostInfo {
    /// Asks the host for its kernel name and machine hardware name.
    ///
    /// Uses `uname` where available and falls back to the compile-time
    /// target otherwise.
    #[must_use]
    pub fn probe() -> Self {
        let kernel = run_uname("-s").unwrap_or_else(|| compile_time_kernel().to_string());
        let machine = run_uname("-m").unwrap_or_else(|| compile_time_machine().to_string());
        tracing::debug!(%kernel, %machine, "probed host");
        Self { kernel, machine }
    }

    /// Derives the [`PlatformTarget`] for this host.
    ///
    /// # Errors
    ///
    /// See [`PlatformTarget::from_host`].
    pub fn target(&self) -> Result<PlatformTarget, InstallError> {
        PlatformTarget::from_host(&self.kernel, &self.machine)
    }
}

fn run_uname(flag: &str) -> Option<String> {
    let output = Command::new("uname").arg(flag).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if value.is_empty() { None } else { Some(value) }
}

fn compile_time_kernel() -> &'static str {
    match std::env::consts::OS {
        "macos" => "Darwin",
        "linux" => "Linux",
        "windows" => "Windows_NT",
        other => other,
    }
}

fn compile_time_machine() -> &'static str {
    match std::env::consts::ARCH {
        "arm" => "armv7l",
        other => other,
    }
}

/// Parses a macOS product version such as `14.2.1` into `(major, minor)`.
///
/// A missing minor component is read as `0`.
#[must_use]
pub fn parse_macos_version(version: &str) -> Option<(u32, u32)> {
    let mut parts = version.trim().split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = match parts.next() {
        Some(minor) => minor.parse().ok()?,
        None => 0,
    };
    Some((major, minor))
}

/// Rejects macOS releases older than 10.15.
///
/// Unparseable versions are let through with a warning.
///
/// # Errors
///
/// Returns [`InstallError::UnsupportedPlatform`] when the version is too old.
pub fn check_macos_version(version: &str) -> Result<(), InstallError> {
    let Some(parsed) = parse_macos_version(version) else {
        tracing::warn!(version, "could not parse macOS version, continuing");
        return Ok(());
    };
    if parsed < MIN_MACOS_VERSION {
        return Err(InstallError::unsupported_platform(format!(
            "macOS {} is not supported (requires {}.{} or newer)",
            version.trim(),
            MIN_MACOS_VERSION.0,
            MIN_MACOS_VERSION.1
        )));
    }
    Ok(())
}

/// Reads the macOS product version via `sw_vers`.
#[must_use]
pub fn probe_macos_version() -> Option<String> {
    let output = Command::new("sw_vers")
        .arg("-productVersion")
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
