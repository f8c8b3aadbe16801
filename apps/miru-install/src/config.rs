//! Run configuration for the miru installer.
//!
//! [`InstallConfig`] is built once in `main` from the command line and the
//! process environment, then passed by reference to every stage. Nothing
//! downstream reads flags or environment variables on its own.
//!
//! ## Environment Variables
//!
//! - `MIRU_INSTALL_REPO`: release repository as `owner/name`
//! - `MIRU_INSTALL_API_URL`: release index base URL (default `https://api.github.com`)
//! - `MIRU_INSTALL_DOWNLOAD_URL`: archive host base URL (default `https://github.com`)
//! - `MIRU_INSTALL_DIR`: install directory, bypassing detection
//! - `GITHUB_TOKEN`: optional token for the release index
//!
//! Empty or whitespace-only values are treated as unset.

use std::fmt;
use std::path::PathBuf;

pub const REPO_ENV: &str = "MIRU_INSTALL_REPO";
pub const API_URL_ENV: &str = "MIRU_INSTALL_API_URL";
pub const DOWNLOAD_URL_ENV: &str = "MIRU_INSTALL_DOWNLOAD_URL";
pub const INSTALL_DIR_ENV: &str = "MIRU_INSTALL_DIR";
pub const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";

const DEFAULT_REPO: &str = "mirurobotics/cli";
const DEFAULT_API_URL: &str = "https://api.github.com";
const DEFAULT_DOWNLOAD_URL: &str = "https://github.com";

/// Name of the installed executable, without platform suffix.
pub const BINARY_NAME: &str = "miru";

/// Which release stream to install from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReleaseChannel {
    /// The release the index marks as latest.
    #[default]
    Stable,
    /// The most recent release flagged as a pre-release.
    Prerelease,
}

impl ReleaseChannel {
    #[must_use]
    pub fn from_flag(prerelease: bool) -> Self {
        if prerelease {
            Self::Prerelease
        } else {
            Self::Stable
        }
    }
}

impl fmt::Display for ReleaseChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stable => f.write_str("stable"),
            Self::Prerelease => f.write_str("pre-release"),
        }
    }
}

/// Immutable settings for a single installer run.
#[derive(Debug, Clone)]
pub struct InstallConfig {
    pub channel: ReleaseChannel,
    pub debug: bool,
    /// Release repository as `owner/name`.
    pub repo: String,
    /// Base URL of the release index API, without trailing slash.
    pub api_url: String,
    /// Base URL archives are downloaded from, without trailing slash.
    pub download_url: String,
    pub binary_name: String,
    /// Explicit install directory; skips default/alternate detection.
    pub install_dir: Option<PathBuf>,
    pub github_token: Option<String>,
}

impl InstallConfig {
    /// Builds the configuration from CLI flags and the process environment.
    #[must_use]
    pub fn from_env(channel: ReleaseChannel, debug: bool) -> Self {
        Self::from_lookup(channel, debug, |key| std::env::var(key).ok())
    }

    /// Builds the configuration using `lookup` in place of the environment.
    pub fn from_lookup<F>(channel: ReleaseChannel, debug: bool, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Self {
            channel,
            debug,
            repo: get(REPO_ENV)
                .map(|r| r.trim_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_REPO.to_string()),
            api_url: normalize_base(get(API_URL_ENV).as_deref().unwrap_or(DEFAULT_API_URL)),
            download_url: normalize_base(
                get(DOWNLOAD_URL_ENV)
                    .as_deref()
                    .unwrap_or(DEFAULT_DOWNLOAD_URL),
            ),
            binary_name: BINARY_NAME.to_string(),
            install_dir: get(INSTALL_DIR_ENV).map(PathBuf::from),
            github_token: get(GITHUB_TOKEN_ENV),
        }
    }
}

fn normalize_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}
