//! HTTP downloads for the miru installer.
//!
//! Everything is fetched into a [`ScratchWorkspace`], a temporary
//! directory removed when the guard is dropped. Each resource gets a single
//! attempt with the transport's default timeouts.
//!
//! The release archive is mandatory; the checksum manifest is best-effort
//! and [`fetch_manifest`] reports a missing manifest as an [`Advisory`].

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use futures_util::StreamExt;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;

use super::release::ResolvedRelease;
use super::verify::ChecksumManifest;
use crate::errors::{Advisory, InstallError};

/// User-Agent header for HTTP requests.
const USER_AGENT: &str = concat!("miru-install/", env!("CARGO_PKG_VERSION"));

/// Prefix of the scratch directory name.
const SCRATCH_PREFIX: &str = "miru-install-";

/// Minimum interval between progress updates in milliseconds.
const CLI_PROGRESS_INTERVAL_MS: u128 = 250;

/// Builds the HTTP client shared by every request of a run.
///
/// # Errors
///
/// Returns [`InstallError::Download`] if the TLS backend cannot be set up.
pub fn http_client() -> Result<reqwest::Client, InstallError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| InstallError::download_with_source("failed to create HTTP client", e))
}

/// Exclusively owned temporary directory for one installer run.
///
/// The directory and everything in it is deleted when this value is
/// dropped, on success and error paths alike.
#[derive(Debug)]
pub struct ScratchWorkspace {
    dir: TempDir,
}

impl ScratchWorkspace {
    /// Creates a fresh scratch directory inside `parent`.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::Download`] if the directory cannot be created.
    pub fn create_in(parent: impl AsRef<Path>) -> Result<Self, InstallError> {
        let dir = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir_in(parent)
            .map_err(|e| {
                InstallError::download_with_source("failed to create scratch directory", e)
            })?;
        tracing::debug!(path = %dir.path().display(), "created scratch directory");
        Ok(Self { dir })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path for a file named `name` inside the workspace.
    #[must_use]
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

/// Downloads the release archive into the workspace.
///
/// # Errors
///
/// Returns [`InstallError::Download`] on connection failure, a non-success
/// status, or a write error.
pub async fn fetch_artifact(
    client: &reqwest::Client,
    release: &ResolvedRelease,
    workspace: &ScratchWorkspace,
) -> Result<PathBuf, InstallError> {
    let dest = workspace.file(&release.artifact_name);
    download_file(client, &release.artifact_url, &dest, true).await?;
    Ok(dest)
}

/// Downloads and parses the checksum manifest, if the host has one.
///
/// Any failure is turned into an [`Advisory::ManifestUnavailable`], which
/// tells the caller to skip verification for this run.
pub async fn fetch_manifest(
    client: &reqwest::Client,
    release: &ResolvedRelease,
    workspace: &ScratchWorkspace,
) -> Result<ChecksumManifest, Advisory> {
    let url = &release.checksum_manifest_url;
    let dest = workspace.file(&format!("cli_{}_checksums.txt", release.version()));

    let unavailable = |reason: String| Advisory::ManifestUnavailable {
        url: url.clone(),
        reason,
    };

    download_file(client, url, &dest, false)
        .await
        .map_err(|e| unavailable(e.to_string()))?;

    let text = tokio::fs::read_to_string(&dest)
        .await
        .map_err(|e| unavailable(e.to_string()))?;

    let manifest = ChecksumManifest::parse(&text);
    if manifest.is_empty() {
        tracing::warn!(%url, "checksum manifest has no entries");
    } else {
        tracing::debug!(entries = manifest.len(), "parsed checksum manifest");
    }
    Ok(manifest)
}

/// Streams `url` into `dest`, optionally printing a progress line.
async fn download_file(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    show_progress: bool,
) -> Result<(), InstallError> {
    tracing::debug!(%url, dest = %dest.display(), "downloading");

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| InstallError::download_with_source(format!("failed to connect to {url}"), e))?;

    if !response.status().is_success() {
        return Err(InstallError::download(format!(
            "HTTP error {}: {url}",
            response.status()
        )));
    }

    let total_size = response.content_length().unwrap_or(0);

    let mut file = tokio::fs::File::create(dest).await.map_err(|e| {
        InstallError::download_with_source(format!("failed to create {}", dest.display()), e)
    })?;

    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;
    let start_time = Instant::now();
    let mut last_update = Instant::now();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            InstallError::download_with_source(format!("failed to read chunk from {url}"), e)
        })?;
        file.write_all(&chunk).await.map_err(|e| {
            InstallError::download_with_source(format!("failed to write {}", dest.display()), e)
        })?;
        downloaded += chunk.len() as u64;

        let now = Instant::now();
        if show_progress && now.duration_since(last_update).as_millis() >= CLI_PROGRESS_INTERVAL_MS
        {
            print_progress(downloaded, total_size, start_time.elapsed().as_secs_f64());
            last_update = now;
        }
    }

    file.flush().await.map_err(|e| {
        InstallError::download_with_source(format!("failed to flush {}", dest.display()), e)
    })?;

    if show_progress {
        print_progress(downloaded, total_size, start_time.elapsed().as_secs_f64());
        eprintln!();
    }

    tracing::debug!(bytes = downloaded, %url, "download complete");
    Ok(())
}

/// Prints a simple text-based progress line to stderr.
#[allow(clippy::cast_precision_loss)]
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
fn print_progress(downloaded: u64, total: u64, elapsed_secs: f64) {
    let percent = if total > 0 {
        (downloaded as f64 / total as f64 * 100.0) as u8
    } else {
        0
    };
    let speed = if elapsed_secs > 0.0 {
        downloaded as f64 / elapsed_secs
    } else {
        0.0
    };

    let mut stderr = std::io::stderr();
    let _ = write!(
        stderr,
        "\r{}/{} ({percent}%) {}     ",
        format_bytes(downloaded),
        format_bytes(total),
        format_speed(speed)
    );
    let _ = stderr.flush();
}

/// Formats bytes into a human-readable string (KB, MB, GB).
fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    #[allow(clippy::cast_precision_loss)]
    let bytes_f = bytes as f64;

    if bytes_f >= GB {
        format!("{:.2} GB", bytes_f / GB)
    } else if bytes_f >= MB {
        format!("{:.2} MB", bytes_f / MB)
    } else if bytes_f >= KB {
        format!("{:.2} KB", bytes_f / KB)
    } else {
        format!("{bytes} B")
    }
}

/// Formats speed (bytes/sec) into a human-readable string.
fn format_speed(speed: f64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;

    if speed >= MB {
        format!("{:.2} MB/s", speed / MB)
    } else if speed >= KB {
        format!("{:.2} KB/s", speed / KB)
    } else {
        format!("{speed:.0} B/s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DOWNLOAD_URL_ENV, InstallConfig, ReleaseChannel};
    use crate::installer::platform::PlatformTarget;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn release_for(server: &MockServer) -> ResolvedRelease {
        let uri = server.uri();
        let config = InstallConfig::from_lookup(ReleaseChannel::Stable, false, |key| {
            (key == DOWNLOAD_URL_ENV).then(|| uri.clone())
        });
        let target = PlatformTarget::from_host("Linux", "x86_64").unwrap();
        ResolvedRelease::compose(&config, target, "v1.0.0")
    }

    const ARTIFACT_PATH: &str = "/mirurobotics/cli/releases/download/v1.0.0/cli_Linux_x86_64.tar.gz";
    const MANIFEST_PATH: &str = "/mirurobotics/cli/releases/download/v1.0.0/cli_1.0.0_checksums.txt";

    #[test]
    fn scratch_workspace_is_removed_on_drop() {
        let parent = tempfile::tempdir().unwrap();
        let workspace = ScratchWorkspace::create_in(parent.path()).unwrap();
        let dir = workspace.path().to_path_buf();
        std::fs::write(workspace.file("partial.tar.gz"), b"junk").unwrap();
        assert!(dir.exists());
        assert!(
            dir.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with(SCRATCH_PREFIX)
        );

        drop(workspace);
        assert!(!dir.exists());
    }

    #[test]
    fn scratch_workspace_fails_in_missing_parent() {
        let err = ScratchWorkspace::create_in("/nonexistent/parent/dir").unwrap_err();
        assert!(matches!(err, InstallError::Download { .. }));
    }

    #[tokio::test]
    async fn fetch_artifact_writes_body_to_workspace() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(ARTIFACT_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"archive-bytes".to_vec()))
            .mount(&server)
            .await;

        let workspace = ScratchWorkspace::create_in(std::env::temp_dir()).unwrap();
        let release = release_for(&server);
        let dest = fetch_artifact(&http_client().unwrap(), &release, &workspace)
            .await
            .unwrap();

        assert_eq!(dest, workspace.file("cli_Linux_x86_64.tar.gz"));
        assert_eq!(std::fs::read(&dest).unwrap(), b"archive-bytes");
    }

    #[tokio::test]
    async fn fetch_artifact_fails_on_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let workspace = ScratchWorkspace::create_in(std::env::temp_dir()).unwrap();
        let err = fetch_artifact(&http_client().unwrap(), &release_for(&server), &workspace)
            .await
            .unwrap_err();
        assert!(matches!(err, InstallError::Download { .. }));
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn missing_manifest_is_advisory() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(MANIFEST_PATH))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let workspace = ScratchWorkspace::create_in(std::env::temp_dir()).unwrap();
        let advisory = fetch_manifest(&http_client().unwrap(), &release_for(&server), &workspace)
            .await
            .unwrap_err();
        match advisory {
            Advisory::ManifestUnavailable { url, .. } => {
                assert!(url.ends_with("cli_1.0.0_checksums.txt"));
            }
            other => panic!("unexpected advisory: {other:?}"),
        }
    }

    #[tokio::test]
    async fn manifest_is_parsed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(MANIFEST_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "aaaa  cli_Darwin_arm64.tar.gz\nbbbb  cli_Linux_x86_64.tar.gz\n",
            ))
            .mount(&server)
            .await;

        let workspace = ScratchWorkspace::create_in(std::env::temp_dir()).unwrap();
        let manifest = fetch_manifest(&http_client().unwrap(), &release_for(&server), &workspace)
            .await
            .unwrap();
        assert_eq!(manifest.lookup("cli_Linux_x86_64.tar.gz"), Some("bbbb"));
    }

    #[test]
    fn format_bytes_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.00 MB");
    }

    #[test]
    fn format_speed_units() {
        assert_eq!(format_speed(100.0), "100 B/s");
        assert_eq!(format_speed(1536.0), "1.50 KB/s");
    }
}
