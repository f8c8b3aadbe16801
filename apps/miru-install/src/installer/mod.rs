//! Install pipeline stages for the miru CLI.
//!
//! ## Module Structure
//!
//! - [`platform`] - OS and architecture detection, install directory defaults
//! - [`release`] - Release index queries and artifact URL composition
//! - [`download`] - Scratch workspace and HTTP downloads with progress
//! - [`verify`] - Checksum manifest parsing and SHA256 verification
//! - [`archive`] - tar.gz extraction and binary lookup
//! - [`placement`] - Move into the install directory, chmod, self-check
//! - [`advisory`] - Post-install PATH and shell profile checks

pub mod advisory;
pub mod archive;
pub mod download;
pub mod placement;
pub mod platform;
pub mod release;
pub mod verify;

pub use download::{ScratchWorkspace, fetch_artifact, fetch_manifest, http_client};
pub use placement::{InstallTarget, place_binary, self_check, set_executable};
pub use platform::HostInfo;
pub use release::{ResolvedRelease, resolve_release};
pub use verify::{VerifyOutcome, verify_artifact};
