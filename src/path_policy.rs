// SPDX-FileCopyrightText: Copyright © 2026 TanmiDock Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Safe-path validation, home expansion, and project fingerprinting
//! (spec §4.2).

use std::path::{Path, PathBuf};

use md5::{Digest, Md5};

/// System roots (and their descendants) that a project or store path must
/// never resolve inside of.
const FORBIDDEN_ROOTS: &[&str] = &["/usr", "/bin", "/etc", "/var", "/System", "/tmp"];

/// Outcome of [`is_path_safe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeCheck {
    pub safe: bool,
    pub reason: Option<String>,
}

impl SafeCheck {
    fn ok() -> Self {
        SafeCheck {
            safe: true,
            reason: None,
        }
    }

    fn unsafe_because(reason: impl Into<String>) -> Self {
        SafeCheck {
            safe: false,
            reason: Some(reason.into()),
        }
    }
}

/// Reject system roots and anything not under the user's home or a mounted
/// volume. `path` should already be absolute (callers typically run it
/// through [`expand_home`] first).
pub fn is_path_safe(path: impl AsRef<Path>) -> SafeCheck {
    let path = path.as_ref();

    if !path.is_absolute() {
        return SafeCheck::unsafe_because("path is not absolute");
    }

    for root in FORBIDDEN_ROOTS {
        let root_path = Path::new(root);
        if path == root_path || path.starts_with(root_path) {
            return SafeCheck::unsafe_because(format!("path is under forbidden root {root}"));
        }
    }

    let home = dirs::home_dir();
    let under_home = home.as_ref().is_some_and(|h| path.starts_with(h));
    // A "mounted volume" is approximated as anything outside of `/` proper
    // that isn't one of the forbidden system roots above, e.g. `/Volumes/x`
    // on macOS or a second disk mounted under `/mnt`/`/media` on Linux.
    let under_mount = path.starts_with("/Volumes") || path.starts_with("/mnt") || path.starts_with("/media");

    if under_home || under_mount {
        SafeCheck::ok()
    } else {
        SafeCheck::unsafe_because("path is neither under the home directory nor a mounted volume")
    }
}

/// Expand a leading `~` using the process's home directory. Paths without a
/// leading `~` are returned unchanged.
pub fn expand_home(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();

    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }

    path.to_path_buf()
}

/// First 12 hex characters of the MD5 digest of `path`'s UTF-8 bytes
/// (spec §4.2, glossary "Project fingerprint").
pub fn hash_path(path: impl AsRef<Path>) -> String {
    let bytes = path.as_ref().to_string_lossy();
    let mut hasher = Md5::new();
    hasher.update(bytes.as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)[..12].to_string()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn forbidden_roots_are_rejected() {
        for root in ["/usr", "/usr/local/lib", "/etc/foo", "/tmp/x"] {
            let check = is_path_safe(root);
            assert!(!check.safe, "{root} should be unsafe");
        }
    }

    #[test]
    fn relative_paths_are_rejected() {
        assert!(!is_path_safe("relative/path").safe);
    }

    #[test]
    fn home_expansion_replaces_tilde_prefix() {
        if let Some(home) = dirs::home_dir() {
            let expanded = expand_home("~/projects/foo");
            assert_eq!(expanded, home.join("projects/foo"));
        }
    }

    #[test]
    fn home_expansion_is_noop_without_tilde() {
        let expanded = expand_home("/already/absolute");
        assert_eq!(expanded, PathBuf::from("/already/absolute"));
    }

    #[test]
    fn hash_path_is_deterministic_and_twelve_hex_chars() {
        let a = hash_path("/home/user/project");
        let b = hash_path("/home/user/project");
        assert_eq!(a, b);
        assert_eq!(a.len(), 12);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn hash_path_differs_for_distinct_paths() {
        let a = hash_path("/home/user/project-a");
        let b = hash_path("/home/user/project-b");
        assert_ne!(a, b);
    }
}
