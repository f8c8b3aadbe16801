//! Error types for the miru installer.
//!
//! Every fatal condition in the install pipeline is an [`InstallError`]. Each
//! variant knows which [`Stage`] it came from so the operator sees where the
//! run stopped. Non-fatal findings are [`Advisory`] values; they are printed
//! as warnings and never change the exit status.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Pipeline stage an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Platform,
    Release,
    Download,
    Verify,
    Extract,
    Install,
    Permissions,
}

impl Stage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Platform => "platform",
            Self::Release => "release",
            Self::Download => "download",
            Self::Verify => "verify",
            Self::Extract => "extract",
            Self::Install => "install",
            Self::Permissions => "permissions",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fatal installer errors.
///
/// Any of these aborts the run before the binary is placed, except
/// [`InstallError::Permission`], which can only occur after the move.
#[derive(Debug, Error)]
pub enum InstallError {
    /// The host kernel is not one we publish archives for, or the OS
    /// release is too old.
    #[error("unsupported platform: {detail}")]
    UnsupportedPlatform {
        /// What was detected.
        detail: String,
    },

    /// The host CPU is not one we publish archives for.
    #[error("unsupported architecture: {machine}")]
    UnsupportedArchitecture {
        /// The raw machine string reported by the host.
        machine: String,
    },

    /// The release index could not produce a version tag.
    #[error("could not resolve release: {message}")]
    ReleaseResolution {
        /// Description of what went wrong.
        message: String,
        /// The underlying error, when there is one.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The release archive could not be downloaded.
    #[error("download failed: {message}")]
    Download {
        /// Description of the download error.
        message: String,
        /// The underlying error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The archive digest differs from the checksum manifest entry.
    #[error("checksum mismatch for {file}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Archive file name.
        file: String,
        /// Digest listed in the manifest.
        expected: String,
        /// Digest computed locally.
        actual: String,
    },

    /// The downloaded archive could not be read back for hashing.
    #[error("could not read {} for checksum", .path.display())]
    ChecksumRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The archive could not be unpacked, or did not contain the binary.
    #[error("extraction failed: {message}")]
    Extraction {
        /// Description of the extraction error.
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// The binary could not be moved into the install directory.
    #[error("installation into {} failed: {message}", .directory.display())]
    Install {
        /// Target install directory.
        directory: PathBuf,
        /// Description of the failure.
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// The executable bit could not be set on the installed binary.
    #[error("could not make {} executable: {message}", .path.display())]
    Permission {
        /// Installed binary path.
        path: PathBuf,
        /// Description of the failure.
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// The run was interrupted by the operator.
    #[error("interrupted")]
    Interrupted,
}

impl InstallError {
    /// Returns the pipeline stage this error belongs to.
    ///
    /// `None` for [`InstallError::Interrupted`], which can arrive during any
    /// stage.
    #[must_use]
    pub fn stage(&self) -> Option<Stage> {
        let stage = match self {
            Self::UnsupportedPlatform { .. } | Self::UnsupportedArchitecture { .. } => {
                Stage::Platform
            }
            Self::ReleaseResolution { .. } => Stage::Release,
            Self::Download { .. } => Stage::Download,
            Self::ChecksumMismatch { .. } | Self::ChecksumRead { .. } => Stage::Verify,
            Self::Extraction { .. } => Stage::Extract,
            Self::Install { .. } => Stage::Install,
            Self::Permission { .. } => Stage::Permissions,
            Self::Interrupted => return None,
        };
        Some(stage)
    }

    /// Process exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Interrupted => 130,
            _ => 1,
        }
    }

    #[must_use]
    pub fn unsupported_platform(detail: impl Into<String>) -> Self {
        Self::UnsupportedPlatform {
            detail: detail.into(),
        }
    }

    #[must_use]
    pub fn unsupported_architecture(machine: impl Into<String>) -> Self {
        Self::UnsupportedArchitecture {
            machine: machine.into(),
        }
    }

    #[must_use]
    pub fn release(message: impl Into<String>) -> Self {
        Self::ReleaseResolution {
            message: message.into(),
            source: None,
        }
    }

    #[must_use]
    pub fn release_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::ReleaseResolution {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    #[must_use]
    pub fn download(message: impl Into<String>) -> Self {
        Self::Download {
            message: message.into(),
            source: None,
        }
    }

    #[must_use]
    pub fn download_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Download {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    #[must_use]
    pub fn checksum_mismatch(
        file: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::ChecksumMismatch {
            file: file.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    #[must_use]
    pub fn extraction(message: impl Into<String>, source: Option<std::io::Error>) -> Self {
        Self::Extraction {
            message: message.into(),
            source,
        }
    }

    #[must_use]
    pub fn install(
        directory: impl Into<PathBuf>,
        message: impl Into<String>,
        source: Option<std::io::Error>,
    ) -> Self {
        Self::Install {
            directory: directory.into(),
            message: message.into(),
            source,
        }
    }

    #[must_use]
    pub fn permission(
        path: impl Into<PathBuf>,
        message: impl Into<String>,
        source: Option<std::io::Error>,
    ) -> Self {
        Self::Permission {
            path: path.into(),
            message: message.into(),
            source,
        }
    }
}

/// Non-fatal findings reported during or after the install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advisory {
    /// The checksum manifest could not be fetched; verification skipped.
    ManifestUnavailable { url: String, reason: String },
    /// The manifest has no line for the downloaded archive.
    ChecksumNotFound { file: String },
    /// The installed binary does not resolve on the search path.
    SelfCheck { binary: String },
    /// The install directory is not on `PATH`.
    PathAdvisory { directory: PathBuf },
    /// No shell profile references the install directory.
    ProfileAdvisory {
        directory: PathBuf,
        checked: Vec<PathBuf>,
    },
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ManifestUnavailable { url, reason } => write!(
                f,
                "checksum manifest unavailable ({reason}): {url}\nSkipping checksum verification."
            ),
            Self::ChecksumNotFound { file } => write!(
                f,
                "no checksum found for {file} in the manifest; skipping verification"
            ),
            Self::SelfCheck { binary } => write!(
                f,
                "'{binary}' was installed but is not resolvable on your PATH yet"
            ),
            Self::PathAdvisory { directory } => write!(
                f,
                "{} is not in your PATH\nAdd it with:\n  export PATH=\"{}:$PATH\"",
                directory.display(),
                directory.display()
            ),
            Self::ProfileAdvisory { directory, checked } => {
                write!(
                    f,
                    "none of your shell profiles reference {}",
                    directory.display()
                )?;
                for profile in checked {
                    write!(f, "\n  checked {}", profile.display())?;
                }
                write!(
                    f,
                    "\nAdd this line to your shell profile:\n  export PATH=\"{}:$PATH\"",
                    directory.display()
                )
            }
        }
    }
}
