// SPDX-FileCopyrightText: Copyright © 2026 TanmiDock Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Symlink creation for single-platform/multi-platform/general modes,
//! status probing, and restore-from-link (spec §4.6).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::platform::{Platform, PlatformKey};
use crate::store::{fsops, Store};

/// Outcome of probing a local path against its expected store target
/// (spec §4.6 `getPathStatus`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathStatus {
    Linked,
    WrongLink,
    Directory,
    Missing,
}

/// `lstat` based check: is `path` itself a symlink (spec §4.6 `isSymlink`).
pub fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path).map(|m| m.file_type().is_symlink()).unwrap_or(false)
}

/// Symlink present and its target resolves (spec §4.6 `isValidLink`).
pub fn is_valid_link(path: &Path) -> bool {
    is_symlink(path) && fs::metadata(path).is_ok()
}

/// Symlink and resolved target prefix-matches `expected_target`
/// (spec §4.6 `isCorrectLink`).
pub fn is_correct_link(path: &Path, expected_target: &Path) -> bool {
    if !is_symlink(path) {
        return false;
    }

    let Ok(raw_target) = fs::read_link(path) else {
        return false;
    };

    let resolved = if raw_target.is_absolute() {
        raw_target
    } else {
        match path.parent() {
            Some(parent) => parent.join(raw_target),
            None => return false,
        }
    };

    resolved.starts_with(expected_target) || expected_target.starts_with(&resolved)
}

pub fn get_path_status(local: &Path, expected_target: &Path) -> PathStatus {
    let Ok(metadata) = fs::symlink_metadata(local) else {
        return PathStatus::Missing;
    };

    if metadata.file_type().is_symlink() {
        if is_correct_link(local, expected_target) {
            PathStatus::Linked
        } else {
            PathStatus::WrongLink
        }
    } else if metadata.is_dir() {
        PathStatus::Directory
    } else {
        PathStatus::Missing
    }
}

/// Dispatches to single- or multi-platform linking depending on how many
/// platforms are requested (spec §4.6).
pub fn link_library(local: &Path, store: &Store, lib_name: &str, commit: &str, platforms: &[Platform]) -> Result<(), Error> {
    match platforms {
        [] => Err(Error::NoPlatformsRequested),
        [only] => link_single_platform(local, store, lib_name, commit, *only),
        many => link_multi_platform(local, store, lib_name, commit, many),
    }
}

/// Create one symlink at `local` pointing into the store (spec §4.6).
/// Windows uses a directory junction; elsewhere a directory symlink.
pub fn link_single_platform(local: &Path, store: &Store, lib_name: &str, commit: &str, platform: Platform) -> Result<(), Error> {
    let target = store.platform_path(lib_name, commit, PlatformKey::Concrete(platform));
    create_dir_link(local, &target)
}

/// `local` becomes a real directory containing one symlink per requested
/// platform; `_shared` contents are copied in, except `.git`, which is
/// linked so the tree still looks like a git working copy (spec §4.6).
pub fn link_multi_platform(local: &Path, store: &Store, lib_name: &str, commit: &str, platforms: &[Platform]) -> Result<(), Error> {
    if local.is_symlink_or_dangling() {
        fs::remove_file(local)?;
    }
    fs::create_dir_all(local)?;

    for platform in platforms {
        let target = store.platform_path(lib_name, commit, PlatformKey::Concrete(*platform));
        let link_path = local.join(platform.as_str());
        create_dir_link(&link_path, &target)?;
    }

    let shared = store.shared_path(lib_name, commit);
    if shared.is_dir() {
        for entry in fs_err::read_dir(&shared)? {
            let entry = entry?;
            let name = entry.file_name();
            let dest = local.join(&name);

            if name == ".git" {
                create_dir_link(&dest, &entry.path())?;
            } else if entry.file_type()?.is_dir() {
                fsops::copy_recursive(&entry.path(), &dest, None)?;
            } else {
                fs_err::copy(entry.path(), &dest)?;
            }
        }
    }

    Ok(())
}

/// Single symlink at `local` pointing at `_shared`, replacing any
/// pre-existing directory there (spec §4.6).
pub fn link_general(local: &Path, shared_path: &Path) -> Result<(), Error> {
    create_dir_link(local, shared_path)
}

fn create_dir_link(local: &Path, target: &Path) -> Result<(), Error> {
    if let Some(parent) = local.parent() {
        fs::create_dir_all(parent)?;
    }

    if local.is_symlink_or_dangling() {
        fs::remove_file(local)?;
    } else if local.is_dir() {
        fs::remove_dir_all(local)?;
    }

    #[cfg(unix)]
    std::os::unix::fs::symlink(target, local)?;

    #[cfg(windows)]
    std::os::windows::fs::symlink_dir(target, local)?;

    Ok(())
}

/// Reverses a single-platform or general link: read the symlink target,
/// delete the symlink, copy the target's contents into `local`
/// (spec §4.6).
pub fn restore_from_link(local: &Path) -> Result<(), Error> {
    if !is_symlink(local) {
        return Err(Error::NotASymlink(local.to_path_buf()));
    }

    let target = fs::read_link(local)?;
    let resolved = if target.is_absolute() {
        target
    } else {
        local.parent().map(|p| p.join(&target)).unwrap_or(target)
    };

    fs::remove_file(local)?;
    fsops::copy_recursive(&resolved, local, None)?;
    Ok(())
}

/// Reverses a multi-platform layout: every symlinked entry in `local` is
/// replaced by a copy of its target (spec §4.6).
pub fn restore_multi_platform(local: &Path) -> Result<(), Error> {
    for entry in fs_err::read_dir(local)? {
        let entry = entry?;
        let path = entry.path();

        if entry.file_type()?.is_symlink() {
            let target = fs::read_link(&path)?;
            let resolved = if target.is_absolute() {
                target
            } else {
                path.parent().map(|p| p.join(&target)).unwrap_or(target)
            };
            fs::remove_file(&path)?;
            fsops::copy_recursive(&resolved, &path, None)?;
        }
    }
    Ok(())
}

/// If `local` is already the correct symlink, no-op and return `None`; if
/// `local` is a non-symlink directory, optionally back it up to
/// `<local>.backup.<ts>` before creating the symlink, returning the backup
/// path if one was made (spec §4.6).
pub fn replace_with_link(local: &Path, store_target: &Path, backup: bool) -> Result<Option<PathBuf>, Error> {
    if is_correct_link(local, store_target) {
        return Ok(None);
    }

    let backup_path = if local.is_dir() && !is_symlink(local) && backup {
        let ts = chrono::Utc::now().timestamp();
        let backup_path = local.with_extension(format!("backup.{ts}"));
        fs::rename(local, &backup_path)?;
        Some(backup_path)
    } else {
        None
    };

    create_dir_link(local, store_target)?;

    Ok(backup_path)
}

trait IsSymlinkOrDangling {
    fn is_symlink_or_dangling(&self) -> bool;
}

impl IsSymlinkOrDangling for Path {
    fn is_symlink_or_dangling(&self) -> bool {
        is_symlink(self)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("no platforms requested for link")]
    NoPlatformsRequested,
    #[error("{0:?} is not a symlink")]
    NotASymlink(PathBuf),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn is_symlink_true_for_symlink_false_for_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("target");
        std::fs::create_dir(&target).unwrap();
        let link = tmp.path().join("link");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        assert!(is_symlink(&link));
        assert!(!is_symlink(&target));
    }

    #[test]
    fn path_status_reports_missing_linked_wrong_and_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let target_a = tmp.path().join("store_a");
        let target_b = tmp.path().join("store_b");
        std::fs::create_dir_all(&target_a).unwrap();
        std::fs::create_dir_all(&target_b).unwrap();

        let missing = tmp.path().join("missing");
        assert_eq!(get_path_status(&missing, &target_a), PathStatus::Missing);

        let correct = tmp.path().join("correct");
        std::os::unix::fs::symlink(&target_a, &correct).unwrap();
        assert_eq!(get_path_status(&correct, &target_a), PathStatus::Linked);

        let wrong = tmp.path().join("wrong");
        std::os::unix::fs::symlink(&target_b, &wrong).unwrap();
        assert_eq!(get_path_status(&wrong, &target_a), PathStatus::WrongLink);

        let dir = tmp.path().join("dir");
        std::fs::create_dir(&dir).unwrap();
        assert_eq!(get_path_status(&dir, &target_a), PathStatus::Directory);
    }

    #[test]
    fn single_platform_link_points_into_store() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::new(tmp.path().join("store"));
        std::fs::create_dir_all(store.platform_path("lib", "c1", PlatformKey::Concrete(Platform::MacOS))).unwrap();

        let local = tmp.path().join("project").join("3rdparty").join("lib");
        link_single_platform(&local, &store, "lib", "c1", Platform::MacOS).unwrap();

        assert!(is_symlink(&local));
        assert!(is_correct_link(&local, &store.platform_path("lib", "c1", PlatformKey::Concrete(Platform::MacOS))));
    }

    #[test]
    fn multi_platform_link_creates_real_dir_with_inner_symlinks() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::new(tmp.path().join("store"));
        std::fs::create_dir_all(store.platform_path("lib", "c1", PlatformKey::Concrete(Platform::MacOS))).unwrap();
        std::fs::create_dir_all(store.platform_path("lib", "c1", PlatformKey::Concrete(Platform::Android))).unwrap();
        std::fs::create_dir_all(store.shared_path("lib", "c1")).unwrap();
        std::fs::write(store.shared_path("lib", "c1").join("common.h"), "x").unwrap();

        let local = tmp.path().join("project").join("3rdparty").join("lib");
        link_multi_platform(&local, &store, "lib", "c1", &[Platform::MacOS, Platform::Android]).unwrap();

        assert!(local.is_dir());
        assert!(!is_symlink(&local));
        assert!(is_symlink(&local.join("macOS")));
        assert!(is_symlink(&local.join("android")));
        assert!(local.join("common.h").is_file());
    }

    #[test]
    fn replace_with_link_backs_up_existing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::new(tmp.path().join("store"));
        let target = store.platform_path("lib", "c1", PlatformKey::Concrete(Platform::MacOS));
        std::fs::create_dir_all(&target).unwrap();

        let local = tmp.path().join("local");
        std::fs::create_dir_all(&local).unwrap();
        std::fs::write(local.join("stale.txt"), "old").unwrap();

        let backup = replace_with_link(&local, &target, true).unwrap();
        assert!(backup.is_some());
        assert!(is_correct_link(&local, &target));
        assert!(backup.unwrap().join("stale.txt").is_file());
    }

    #[test]
    fn replace_with_link_is_noop_when_already_correct() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::new(tmp.path().join("store"));
        let target = store.platform_path("lib", "c1", PlatformKey::Concrete(Platform::MacOS));
        std::fs::create_dir_all(&target).unwrap();

        let local = tmp.path().join("local");
        create_dir_link(&local, &target).unwrap();

        let backup = replace_with_link(&local, &target, true).unwrap();
        assert!(backup.is_none());
    }
}
