#![warn(clippy::pedantic)]

//! # miru installer
//!
//! Installs the `miru` CLI from its published release archives. One run
//! detects the platform, resolves the newest stable (or pre-release) tag,
//! downloads and verifies the archive, and moves the binary into
//! `/usr/local/bin` (or `/opt/homebrew/bin` on Apple silicon).
//!
//! ## Usage
//!
//! ```bash
//! miru-install                   # latest stable release
//! miru-install --prerelease      # latest pre-release
//! miru-install --debug=true      # diagnostic output on stderr
//! ```
//!
//! Arguments other than the flags above are ignored.

mod config;
mod errors;
mod installer;
mod pipeline;

use std::ffi::{OsStr, OsString};

use anyhow::Result;
use clap::{ArgAction, Parser};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use config::{InstallConfig, ReleaseChannel};
use errors::InstallError;
use pipeline::HostEnvironment;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("MIRU_INSTALL_GIT_COMMIT"),
    ")"
);

/// Flags accepted on the command line; anything else is dropped before parsing.
const VALUE_FLAGS: [&str; 2] = ["--debug", "--prerelease"];
const PLAIN_FLAGS: [&str; 4] = ["-h", "--help", "-V", "--version"];

/// Installer for the miru CLI.
#[derive(Parser, Debug)]
#[command(
    name = "miru-install",
    version,
    long_version = LONG_VERSION,
    about = "Install the miru CLI from its release archives",
    after_help = "\
ENVIRONMENT VARIABLES:
    MIRU_INSTALL_DIR            Install directory (default: /usr/local/bin)
    MIRU_INSTALL_REPO           Release repository (default: mirurobotics/cli)
    MIRU_INSTALL_API_URL        Release index URL (default: https://api.github.com)
    MIRU_INSTALL_DOWNLOAD_URL   Archive host URL (default: https://github.com)
    GITHUB_TOKEN                Token for the release index
    RUST_LOG                    Log filter, overrides --debug"
)]
struct Cli {
    /// Print diagnostic output on stderr.
    #[arg(
        long,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_value_t = false,
        default_missing_value = "true",
        value_name = "BOOL"
    )]
    debug: bool,

    /// Install the most recent pre-release instead of the latest stable release.
    #[arg(
        long,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_value_t = false,
        default_missing_value = "true",
        value_name = "BOOL"
    )]
    prerelease: bool,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        let exit_code = handle_error(&e);
        std::process::exit(exit_code);
    }
}

/// Prints the error with its failing stage and returns the exit code.
fn handle_error(e: &anyhow::Error) -> i32 {
    match e.downcast_ref::<InstallError>() {
        Some(err) => {
            match err.stage() {
                Some(stage) => eprintln!("Error ({stage} stage): {e:?}"),
                None => {
                    eprintln!();
                    eprintln!("{err}.");
                }
            }
            err.exit_code()
        }
        None => {
            eprintln!("Error: {e:?}");
            1
        }
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse_from(recognized_args(std::env::args_os()));
    let config = InstallConfig::from_env(ReleaseChannel::from_flag(cli.prerelease), cli.debug);
    init_tracing(&config);

    tracing::debug!(
        channel = %config.channel,
        repo = %config.repo,
        api_url = %config.api_url,
        download_url = %config.download_url,
        "configuration loaded"
    );
    let env = HostEnvironment::probe();

    tokio::select! {
        result = pipeline::run(&config, &env) => {
            result?;
        }
        Ok(()) = tokio::signal::ctrl_c() => {
            return Err(InstallError::Interrupted.into());
        }
    }
    Ok(())
}

/// Keeps the program name and the flags we understand.
fn recognized_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let mut args = args.into_iter();
    let program = args.next();
    program
        .into_iter()
        .chain(args.filter(|arg| is_recognized(arg)))
        .collect()
}

fn is_recognized(arg: &OsStr) -> bool {
    let Some(arg) = arg.to_str() else {
        return false;
    };
    PLAIN_FLAGS.contains(&arg)
        || VALUE_FLAGS.iter().any(|flag| {
            arg.strip_prefix(flag)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('='))
        })
}

/// Initialize tracing: `warn` by default, `debug` with `--debug`, `RUST_LOG` wins.
fn init_tracing(config: &InstallConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if config.debug {
            EnvFilter::new("miru_install=debug,warn")
        } else {
            EnvFilter::new("warn")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}
