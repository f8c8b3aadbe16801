//! Release resolution against the remote release index.
//!
//! The index is a GitHub-style REST API:
//!
//! - `GET {api}/repos/{repo}/releases/latest` returns one release object
//! - `GET {api}/repos/{repo}/releases` returns releases, newest first
//!
//! Only `tag_name` and `prerelease` are read. Download URLs are composed
//! from the tag and platform tokens; the index's asset list is ignored.
//!
//! ## URL Format
//!
//! ```text
//! {download}/{repo}/releases/download/v1.2.3/cli_Linux_x86_64.tar.gz
//! {download}/{repo}/releases/download/v1.2.3/cli_1.2.3_checksums.txt
//! ```
//!
//! The archive is keyed by platform tokens, the manifest by the bare
//! version number (tag without the leading `v`).

use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::platform::PlatformTarget;
use crate::config::{InstallConfig, ReleaseChannel};
use crate::errors::InstallError;

const GITHUB_JSON: &str = "application/vnd.github+json";

/// One entry of the release index. Unknown fields are ignored.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ReleaseEntry {
    #[serde(default)]
    pub tag_name: Option<String>,
    #[serde(default)]
    pub prerelease: bool,
}

/// The release chosen for this run and where to fetch it from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRelease {
    /// Tag as published, e.g. `v1.2.3`.
    pub version_tag: String,
    /// Archive file name, e.g. `cli_Linux_x86_64.tar.gz`.
    pub artifact_name: String,
    pub artifact_url: String,
    pub checksum_manifest_url: String,
}

impl ResolvedRelease {
    /// Composes the download URLs for `tag` on `target`.
    #[must_use]
    pub fn compose(config: &InstallConfig, target: PlatformTarget, tag: &str) -> Self {
        let base = format!(
            "{}/{}/releases/download/{tag}",
            config.download_url, config.repo
        );
        let artifact_name = target.artifact_name();
        let version = bare_version(tag);
        Self {
            version_tag: tag.to_string(),
            artifact_url: format!("{base}/{artifact_name}"),
            checksum_manifest_url: format!("{base}/cli_{version}_checksums.txt"),
            artifact_name,
        }
    }

    /// Version number without the leading `v`.
    #[must_use]
    pub fn version(&self) -> &str {
        bare_version(&self.version_tag)
    }
}

/// Strips a single leading `v` from a tag (`v2.3.4` -> `2.3.4`).
#[must_use]
pub fn bare_version(tag: &str) -> &str {
    tag.strip_prefix('v').unwrap_or(tag)
}

/// Resolves the release to install for `config.channel` on `target`.
///
/// # Errors
///
/// Returns [`InstallError::ReleaseResolution`] if the index cannot be
/// queried, the response cannot be parsed, or no suitable tag exists.
pub async fn resolve_release(
    client: &reqwest::Client,
    config: &InstallConfig,
    target: PlatformTarget,
) -> Result<ResolvedRelease, InstallError> {
    let tag = match config.channel {
        ReleaseChannel::Stable => latest_stable_tag(client, config).await?,
        ReleaseChannel::Prerelease => latest_prerelease_tag(client, config).await?,
    };
    tracing::debug!(%tag, channel = %config.channel, "resolved release tag");
    Ok(ResolvedRelease::compose(config, target, &tag))
}

async fn latest_stable_tag(
    client: &reqwest::Client,
    config: &InstallConfig,
) -> Result<String, InstallError> {
    let url = format!("{}/repos/{}/releases/latest", config.api_url, config.repo);
    let release: ReleaseEntry = get_json(client, config, &url).await?;
    release
        .tag_name
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| InstallError::release(format!("empty tag in latest release from {url}")))
}

async fn latest_prerelease_tag(
    client: &reqwest::Client,
    config: &InstallConfig,
) -> Result<String, InstallError> {
    let url = format!("{}/repos/{}/releases", config.api_url, config.repo);
    let releases: Vec<ReleaseEntry> = get_json(client, config, &url).await?;
    select_prerelease(&releases, &config.repo)
}

/// Picks the first release flagged as a pre-release, keeping index order.
///
/// # Errors
///
/// Fails with "no releases found" for an empty list, "no pre-release found"
/// when nothing is flagged, and "empty tag" when the match has no tag.
pub fn select_prerelease(releases: &[ReleaseEntry], repo: &str) -> Result<String, InstallError> {
    if releases.is_empty() {
        return Err(InstallError::release(format!("no releases found for {repo}")));
    }
    let entry = releases
        .iter()
        .find(|r| r.prerelease)
        .ok_or_else(|| InstallError::release(format!("no pre-release found for {repo}")))?;
    entry
        .tag_name
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .ok_or_else(|| InstallError::release(format!("empty tag in pre-release for {repo}")))
}

async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    config: &InstallConfig,
    url: &str,
) -> Result<T, InstallError> {
    let mut request = client.get(url).header(ACCEPT, GITHUB_JSON);
    if let Some(token) = &config.github_token {
        request = request.bearer_auth(token);
    }

    let response = request
        .send()
        .await
        .map_err(|e| InstallError::release_with_source(format!("failed to query {url}"), e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(handle_http_error(status, url, &config.repo));
    }

    let text = response
        .text()
        .await
        .map_err(|e| InstallError::release_with_source(format!("failed to read {url}"), e))?;

    serde_json::from_str(&text)
        .map_err(|e| InstallError::release_with_source(format!("failed to parse {url}"), e))
}

/// Handles HTTP errors with user-friendly messages.
fn handle_http_error(status: StatusCode, url: &str, repo: &str) -> InstallError {
    match status.as_u16() {
        404 => InstallError::release(format!("no releases found for {repo} ({url})")),
        403 | 429 => InstallError::release(format!(
            "release index refused the request ({status}); \
             set GITHUB_TOKEN if you are being rate limited: {url}"
        )),
        code => InstallError::release(format!("HTTP error {code}: {url}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::API_URL_ENV;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn linux_x64() -> PlatformTarget {
        PlatformTarget::from_host("Linux", "x86_64").unwrap()
    }

    fn config_for(server: &MockServer, channel: ReleaseChannel) -> InstallConfig {
        let uri = server.uri();
        InstallConfig::from_lookup(channel, false, |key| {
            (key == API_URL_ENV).then(|| uri.clone())
        })
    }

    fn entry(tag: &str, prerelease: bool) -> ReleaseEntry {
        ReleaseEntry {
            tag_name: Some(tag.to_string()),
            prerelease,
        }
    }

    #[test]
    fn manifest_url_uses_bare_version_and_artifact_keeps_tag() {
        let config = InstallConfig::from_lookup(ReleaseChannel::Stable, false, |_| None);
        let release = ResolvedRelease::compose(&config, linux_x64(), "v2.3.4");

        assert_eq!(release.version(), "2.3.4");
        assert_eq!(
            release.artifact_url,
            "https://github.com/mirurobotics/cli/releases/download/v2.3.4/cli_Linux_x86_64.tar.gz"
        );
        assert_eq!(
            release.checksum_manifest_url,
            "https://github.com/mirurobotics/cli/releases/download/v2.3.4/cli_2.3.4_checksums.txt"
        );
        assert_eq!(release.artifact_name, "cli_Linux_x86_64.tar.gz");
    }

    #[test]
    fn bare_version_strips_only_one_leading_v() {
        assert_eq!(bare_version("v1.0.0"), "1.0.0");
        assert_eq!(bare_version("1.0.0"), "1.0.0");
        assert_eq!(bare_version("vv1"), "v1");
    }

    #[test]
    fn select_prerelease_takes_first_flagged_in_index_order() {
        let releases = vec![
            entry("v1.3.0", false),
            entry("v1.3.0-rc.2", true),
            entry("v1.3.0-rc.1", true),
        ];
        assert_eq!(select_prerelease(&releases, "acme/cli").unwrap(), "v1.3.0-rc.2");
    }

    #[test]
    fn select_prerelease_does_not_fall_back_to_stable() {
        let releases = vec![entry("v1.3.0", false), entry("v1.2.0", false)];
        let err = select_prerelease(&releases, "acme/cli").unwrap_err();
        assert!(err.to_string().contains("no pre-release found"));
    }

    #[test]
    fn select_prerelease_on_empty_index() {
        let err = select_prerelease(&[], "acme/cli").unwrap_err();
        assert!(err.to_string().contains("no releases found"));
    }

    #[test]
    fn select_prerelease_rejects_blank_tag() {
        let releases = vec![ReleaseEntry {
            tag_name: Some("  ".to_string()),
            prerelease: true,
        }];
        let err = select_prerelease(&releases, "acme/cli").unwrap_err();
        assert!(err.to_string().contains("empty tag"));
    }

    #[test]
    fn release_entry_ignores_unknown_fields() {
        let json = r#"{"tag_name":"v0.4.0","prerelease":false,"assets":[],"draft":false}"#;
        let parsed: ReleaseEntry = serde_json::from_str(json).unwrap();
        assert_eq!(parsed, entry("v0.4.0", false));
    }

    #[tokio::test]
    async fn stable_channel_reads_latest_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/mirurobotics/cli/releases/latest"))
            .and(header("accept", GITHUB_JSON))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"tag_name":"v1.0.0"}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let config = config_for(&server, ReleaseChannel::Stable);
        let client = reqwest::Client::new();
        let release = resolve_release(&client, &config, linux_x64()).await.unwrap();

        assert_eq!(release.version_tag, "v1.0.0");
        assert!(release.artifact_url.ends_with("/v1.0.0/cli_Linux_x86_64.tar.gz"));
        assert!(release.checksum_manifest_url.ends_with("/v1.0.0/cli_1.0.0_checksums.txt"));
    }

    #[tokio::test]
    async fn stable_channel_fails_on_missing_tag() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/mirurobotics/cli/releases/latest"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"name":"x"}"#))
            .mount(&server)
            .await;

        let config = config_for(&server, ReleaseChannel::Stable);
        let err = resolve_release(&reqwest::Client::new(), &config, linux_x64())
            .await
            .unwrap_err();
        assert!(matches!(err, InstallError::ReleaseResolution { .. }));
        assert!(err.to_string().contains("empty tag"));
    }

    #[tokio::test]
    async fn stable_channel_404_means_no_releases() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let config = config_for(&server, ReleaseChannel::Stable);
        let err = resolve_release(&reqwest::Client::new(), &config, linux_x64())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no releases found"));
    }

    #[tokio::test]
    async fn prerelease_channel_reads_release_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/mirurobotics/cli/releases"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"[
                    {"tag_name":"v2.0.0","prerelease":false},
                    {"tag_name":"v2.1.0-beta.1","prerelease":true}
                ]"#,
            ))
            .mount(&server)
            .await;

        let config = config_for(&server, ReleaseChannel::Prerelease);
        let release = resolve_release(&reqwest::Client::new(), &config, linux_x64())
            .await
            .unwrap();
        assert_eq!(release.version_tag, "v2.1.0-beta.1");
        assert_eq!(release.version(), "2.1.0-beta.1");
    }

    #[tokio::test]
    async fn prerelease_channel_without_prereleases_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/mirurobotics/cli/releases"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"[{"tag_name":"v2.0.0","prerelease":false}]"#),
            )
            .mount(&server)
            .await;

        let config = config_for(&server, ReleaseChannel::Prerelease);
        let err = resolve_release(&reqwest::Client::new(), &config, linux_x64())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no pre-release found"));
    }

    #[tokio::test]
    async fn malformed_json_is_resolution_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let config = config_for(&server, ReleaseChannel::Prerelease);
        let err = resolve_release(&reqwest::Client::new(), &config, linux_x64())
            .await
            .unwrap_err();
        assert!(matches!(err, InstallError::ReleaseResolution { .. }));
        assert!(err.to_string().contains("failed to parse"));
    }
}
