//! The install run, start to finish.
//!
//! Stages run strictly in order: platform, release, download, verify,
//! extract, install, permissions, then the advisory checks. The first fatal
//! error ends the run. The scratch workspace is created right before the
//! first download and removed when it goes out of scope, including when the
//! whole future is dropped on Ctrl-C.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::config::{InstallConfig, ReleaseChannel};
use crate::errors::{Advisory, InstallError};
use crate::installer::platform::{
    OsToken, PlatformTarget, check_macos_version, probe_macos_version,
};
use crate::installer::{
    HostInfo, InstallTarget, ResolvedRelease, ScratchWorkspace, VerifyOutcome, advisory, archive,
    fetch_artifact, fetch_manifest, http_client, place_binary, resolve_release, self_check,
    set_executable, verify_artifact,
};

/// Everything the pipeline learns from the machine it runs on.
#[derive(Debug, Clone)]
pub struct HostEnvironment {
    pub host: HostInfo,
    /// `sw_vers` product version; only probed on Darwin.
    pub macos_version: Option<String>,
    /// Where the scratch workspace is created.
    pub scratch_parent: PathBuf,
    /// Value of `PATH`, used for the post-install checks.
    pub search_path: Option<OsString>,
    pub home_dir: Option<PathBuf>,
    /// Existence check used to pick between candidate install directories.
    pub dir_exists: fn(&Path) -> bool,
}

impl HostEnvironment {
    #[must_use]
    pub fn probe() -> Self {
        let host = HostInfo::probe();
        let macos_version = if host.kernel.eq_ignore_ascii_case("darwin") {
            probe_macos_version()
        } else {
            None
        };
        Self {
            host,
            macos_version,
            scratch_parent: std::env::temp_dir(),
            search_path: std::env::var_os("PATH"),
            home_dir: dirs::home_dir(),
            dir_exists: Path::is_dir,
        }
    }
}

/// What a successful run did.
#[derive(Debug)]
pub struct InstallReport {
    pub release: ResolvedRelease,
    pub installed_path: PathBuf,
    /// `None` when the checksum manifest could not be fetched.
    pub verification: Option<VerifyOutcome>,
    /// Every warning printed during the run, in order.
    pub advisories: Vec<Advisory>,
}

/// Installs the binary described by `config` on the host described by `env`.
///
/// # Errors
///
/// Returns the first fatal [`InstallError`]. Nothing is written to the
/// install directory unless every stage before placement succeeded.
pub async fn run(config: &InstallConfig, env: &HostEnvironment) -> Result<InstallReport, InstallError> {
    let (target, install_target) = locate(config, env)?;
    let client = http_client()?;

    let wanted = match config.channel {
        ReleaseChannel::Stable => "latest release",
        ReleaseChannel::Prerelease => "latest pre-release",
    };
    println!("Resolving {wanted} of {}...", config.repo);
    let release = resolve_release(&client, config, target).await?;
    println!(
        "Installing {} {} for {target}...",
        config.binary_name, release.version_tag
    );

    let workspace = ScratchWorkspace::create_in(&env.scratch_parent)?;
    let mut advisories = Vec::new();

    println!("Downloading {}...", release.artifact_url);
    let archive_path = fetch_artifact(&client, &release, &workspace).await?;

    let verification = match fetch_manifest(&client, &release, &workspace).await {
        Ok(manifest) => {
            println!("Verifying checksum...");
            let outcome = verify_artifact(&manifest, &release.artifact_name, &archive_path)?;
            if outcome == VerifyOutcome::EntryNotFound {
                warn(
                    &mut advisories,
                    Advisory::ChecksumNotFound {
                        file: release.artifact_name.clone(),
                    },
                );
            }
            Some(outcome)
        }
        Err(advisory) => {
            warn(&mut advisories, advisory);
            None
        }
    };

    println!("Extracting...");
    let extract_dir = workspace.path().join("extract");
    archive::extract_tar_gz(&archive_path, &extract_dir)?;
    let file_name = target.binary_file_name(&config.binary_name);
    let binary = archive::find_binary(&extract_dir, &file_name)?;

    let installed_path = place_binary(&binary, &install_target, &file_name)?;
    set_executable(&installed_path, install_target.requires_elevation)?;
    drop(workspace);

    println!(
        "{} {} installed to {}",
        config.binary_name,
        release.version_tag,
        installed_path.display()
    );

    let mut post_install = advisory::collect(
        target,
        &install_target.directory,
        env.search_path.as_deref(),
        env.home_dir.as_deref(),
    );
    let path_reported = post_install
        .iter()
        .any(|a| matches!(a, Advisory::PathAdvisory { .. }));
    if !path_reported
        && let Some(missing) = self_check(
            &config.binary_name,
            &installed_path,
            env.search_path.as_deref(),
        )
    {
        post_install.insert(0, missing);
    }
    advisory::report(&post_install);
    advisories.extend(post_install);

    Ok(InstallReport {
        release,
        installed_path,
        verification,
        advisories,
    })
}

/// Identifies the platform and picks the install directory.
///
/// # Errors
///
/// Returns [`InstallError::UnsupportedPlatform`] or
/// [`InstallError::UnsupportedArchitecture`] for hosts without archives.
pub fn locate(
    config: &InstallConfig,
    env: &HostEnvironment,
) -> Result<(PlatformTarget, InstallTarget), InstallError> {
    let target = env.host.target()?;
    if target.os == OsToken::Darwin
        && let Some(version) = &env.macos_version
    {
        check_macos_version(version)?;
    }
    tracing::debug!(%target, "platform supported");

    Ok((target, InstallTarget::resolve(config, target, env.dir_exists)))
}

fn warn(advisories: &mut Vec<Advisory>, advisory: Advisory) {
    advisory::report(std::slice::from_ref(&advisory));
    advisories.push(advisory);
}
