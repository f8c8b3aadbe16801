//! Post-install environment checks.
//!
//! These run only after the binary is in place. They read `PATH` and, on
//! macOS, the usual shell profiles, and never write anything.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use super::platform::{OsToken, PlatformTarget};
use crate::errors::Advisory;

/// Shell profiles inspected on macOS, relative to the home directory.
const PROFILE_FILES: [&str; 5] = [
    ".zshrc",
    ".zprofile",
    ".bash_profile",
    ".bashrc",
    ".profile",
];

/// Warns when `directory` is not an entry of `path_var`.
#[must_use]
pub fn path_advisory(directory: &Path, path_var: Option<&OsStr>) -> Option<Advisory> {
    let on_path = path_var.is_some_and(|paths| {
        std::env::split_paths(paths).any(|entry| same_directory(&entry, directory))
    });
    if on_path {
        None
    } else {
        Some(Advisory::PathAdvisory {
            directory: directory.to_path_buf(),
        })
    }
}

#[must_use]
pub fn profile_candidates(home_dir: &Path) -> Vec<PathBuf> {
    PROFILE_FILES.iter().map(|name| home_dir.join(name)).collect()
}

/// Warns when none of the existing shell profiles mention `directory`.
#[must_use]
pub fn profile_advisory(directory: &Path, home_dir: &Path) -> Option<Advisory> {
    let needle = directory.display().to_string();
    let checked: Vec<PathBuf> = profile_candidates(home_dir)
        .into_iter()
        .filter(|p| p.is_file())
        .collect();

    let referenced = checked.iter().any(|profile| {
        std::fs::read_to_string(profile).is_ok_and(|content| content.contains(&needle))
    });
    if referenced {
        return None;
    }
    Some(Advisory::ProfileAdvisory {
        directory: directory.to_path_buf(),
        checked,
    })
}

/// Runs every check that applies to `target`.
#[must_use]
pub fn collect(
    target: PlatformTarget,
    directory: &Path,
    path_var: Option<&OsStr>,
    home_dir: Option<&Path>,
) -> Vec<Advisory> {
    let mut advisories: Vec<Advisory> = path_advisory(directory, path_var).into_iter().collect();
    if target.os == OsToken::Darwin
        && let Some(home) = home_dir
        && let Some(advisory) = profile_advisory(directory, home)
    {
        advisories.push(advisory);
    }
    advisories
}

/// Prints advisories as warnings on stderr.
pub fn report(advisories: &[Advisory]) {
    for advisory in advisories {
        eprintln!("Warning: {advisory}");
    }
}

fn same_directory(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    fn join_paths(entries: &[&Path]) -> OsString {
        std::env::join_paths(entries).unwrap()
    }

    #[test]
    fn directory_on_path_has_no_advisory() {
        let path = join_paths(&[Path::new("/usr/bin"), Path::new("/usr/local/bin")]);
        assert!(path_advisory(Path::new("/usr/local/bin"), Some(&path)).is_none());
    }

    #[test]
    fn directory_missing_from_path_is_reported() {
        let path = join_paths(&[Path::new("/usr/bin"), Path::new("/bin")]);
        assert_eq!(
            path_advisory(Path::new("/opt/homebrew/bin"), Some(&path)),
            Some(Advisory::PathAdvisory {
                directory: PathBuf::from("/opt/homebrew/bin")
            })
        );
    }

    #[test]
    fn unset_path_is_reported() {
        assert!(path_advisory(Path::new("/usr/local/bin"), None).is_some());
    }

    #[test]
    fn trailing_slash_entry_matches() {
        let temp = tempfile::tempdir().unwrap();
        let with_slash = PathBuf::from(format!("{}/", temp.path().display()));
        let path = join_paths(&[&with_slash]);
        assert!(path_advisory(temp.path(), Some(&path)).is_none());
    }

    #[test]
    fn profile_referencing_directory_is_accepted() {
        let home = tempfile::tempdir().unwrap();
        std::fs::write(
            home.path().join(".zprofile"),
            "eval \"$(/opt/homebrew/bin/brew shellenv)\"\n",
        )
        .unwrap();
        assert!(profile_advisory(Path::new("/opt/homebrew/bin"), home.path()).is_none());
    }

    #[test]
    fn profiles_without_reference_are_listed() {
        let home = tempfile::tempdir().unwrap();
        std::fs::write(home.path().join(".zshrc"), "alias ll='ls -l'\n").unwrap();
        std::fs::write(home.path().join(".profile"), "umask 022\n").unwrap();

        let Some(Advisory::ProfileAdvisory { directory, checked }) =
            profile_advisory(Path::new("/opt/homebrew/bin"), home.path())
        else {
            panic!("expected profile advisory");
        };
        assert_eq!(directory, PathBuf::from("/opt/homebrew/bin"));
        assert_eq!(
            checked,
            vec![home.path().join(".zshrc"), home.path().join(".profile")]
        );
    }

    #[test]
    fn profile_check_does_not_modify_files() {
        let home = tempfile::tempdir().unwrap();
        let zshrc = home.path().join(".zshrc");
        std::fs::write(&zshrc, "export EDITOR=vim\n").unwrap();

        let _ = profile_advisory(Path::new("/usr/local/bin"), home.path());
        assert_eq!(
            std::fs::read_to_string(&zshrc).unwrap(),
            "export EDITOR=vim\n"
        );
    }

    #[test]
    fn profile_check_only_on_darwin() {
        let home = tempfile::tempdir().unwrap();
        let dir = Path::new("/usr/local/bin");
        let path = join_paths(&[dir]);

        let linux = PlatformTarget::from_host("Linux", "x86_64").unwrap();
        assert!(collect(linux, dir, Some(&path), Some(home.path())).is_empty());

        let mac = PlatformTarget::from_host("Darwin", "arm64").unwrap();
        let advisories = collect(mac, dir, Some(&path), Some(home.path()));
        assert_eq!(advisories.len(), 1);
        assert!(matches!(advisories[0], Advisory::ProfileAdvisory { .. }));
    }
}
