// SPDX-FileCopyrightText: Copyright © 2026 TanmiDock Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Per-dependency status classification against the Store and the local
//! `3rdparty/<libName>` path (spec §4.9).

use std::path::Path;
use std::process::Command;

use crate::linker::{self, PathStatus};
use crate::platform::{Platform, PlatformKey};
use crate::registry::DependencyRef;
use crate::store::Store;

/// Per-dependency classification result (spec §4.9).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// Local is the correct link and the Store has every requested
    /// platform.
    Linked,
    /// Symlink present but pointing at the wrong target (different commit
    /// or platform).
    Relink,
    /// Local is a real directory and the Store already has the requested
    /// platforms — safe to discard local and link.
    Replace,
    /// Local is a real directory whose git commit matches `commit` and the
    /// Store does not have it yet — adopt local into the Store.
    Absorb,
    /// Local is absent, Store has it.
    LinkNew,
    /// Local is absent, Store is absent too. `missing` names exactly the
    /// requested platforms that need downloading (spec §4.9 "requested
    /// platforms not present in Store ... trigger a MISSING for just the
    /// missing subset").
    Missing { missing: Vec<Platform> },
}

/// Read the locally materialized commit, preferring `.git/commit_hash`
/// (a plain text pointer file some workflows leave behind) and falling
/// back to `git rev-parse HEAD` (spec §4.9).
pub fn local_git_commit(local: &Path) -> Option<String> {
    let commit_hash_file = local.join(".git").join("commit_hash");
    if let Ok(contents) = fs_err::read_to_string(&commit_hash_file) {
        let trimmed = contents.trim();
        if !trimmed.is_empty() {
            return Some(trimmed.to_string());
        }
    }

    let output = Command::new("git").arg("-C").arg(local).arg("rev-parse").arg("HEAD").output().ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8(output.stdout).ok()?;
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn commit_matches(local_commit: &str, declared: &str) -> bool {
    declared.starts_with(local_commit) || local_commit.starts_with(declared)
}

/// Classify one dependency given its declared reference, the requested
/// platform set for this link, and the local `3rdparty/<libName>` path
/// (spec §4.9).
pub fn classify(store: &Store, local: &Path, dep: &DependencyRef, requested: &[Platform]) -> Status {
    let is_general = store.is_general_lib(&dep.lib_name, &dep.commit);

    if is_general {
        let expected = store.shared_path(&dep.lib_name, &dep.commit);
        return match linker::get_path_status(local, &expected) {
            PathStatus::Linked => Status::Linked,
            PathStatus::WrongLink => Status::Relink,
            PathStatus::Directory => classify_directory(local, &dep.commit, store, &dep.lib_name, requested),
            PathStatus::Missing => {
                if expected.is_dir() {
                    Status::LinkNew
                } else {
                    Status::Missing { missing: requested.to_vec() }
                }
            }
        };
    }

    let completeness = store.check_platform_completeness(&dep.lib_name, &dep.commit, requested);

    if requested.len() == 1 {
        let expected = store.platform_path(&dep.lib_name, &dep.commit, PlatformKey::Concrete(requested[0]));
        match linker::get_path_status(local, &expected) {
            PathStatus::Linked if completeness.missing.is_empty() => Status::Linked,
            PathStatus::Linked => Status::Missing { missing: completeness.missing },
            PathStatus::WrongLink => Status::Relink,
            PathStatus::Directory => classify_directory(local, &dep.commit, store, &dep.lib_name, requested),
            PathStatus::Missing if completeness.existing.is_empty() => Status::Missing { missing: completeness.missing },
            PathStatus::Missing => Status::LinkNew,
        }
    } else {
        // Multi-platform: `local` is a real directory containing per-platform
        // symlinks when linked correctly.
        if !local.exists() {
            return if completeness.existing.is_empty() {
                Status::Missing { missing: completeness.missing }
            } else if completeness.missing.is_empty() {
                Status::LinkNew
            } else {
                Status::Missing { missing: completeness.missing }
            };
        }

        if !local.is_dir() || linker::is_symlink(local) {
            return Status::Relink;
        }

        let all_correct = requested.iter().all(|platform| {
            let link_path = local.join(platform.as_str());
            let expected = store.platform_path(&dep.lib_name, &dep.commit, PlatformKey::Concrete(*platform));
            linker::is_correct_link(&link_path, &expected)
        });

        if all_correct && completeness.missing.is_empty() {
            Status::Linked
        } else if all_correct {
            Status::Missing { missing: completeness.missing }
        } else if completeness.missing.is_empty() {
            Status::Replace
        } else {
            classify_directory(local, &dep.commit, store, &dep.lib_name, requested)
        }
    }
}

fn classify_directory(local: &Path, declared_commit: &str, store: &Store, lib_name: &str, requested: &[Platform]) -> Status {
    let completeness = store.check_platform_completeness(lib_name, declared_commit, requested);

    if !completeness.missing.is_empty() && completeness.existing.is_empty() {
        match local_git_commit(local) {
            Some(local_commit) if commit_matches(&local_commit, declared_commit) => Status::Absorb,
            _ => Status::Replace,
        }
    } else {
        Status::Replace
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::registry::DependencyRef;

    fn dep(lib: &str, commit: &str, platform: Platform) -> DependencyRef {
        DependencyRef::new(lib, commit, platform)
    }

    #[test]
    fn missing_when_store_and_local_both_absent() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::new(tmp.path().join("store"));
        let local = tmp.path().join("3rdparty").join("libX");

        let status = classify(&store, &local, &dep("libX", "c1", Platform::MacOS), &[Platform::MacOS]);
        assert_eq!(status, Status::Missing { missing: vec![Platform::MacOS] });
    }

    #[test]
    fn link_new_when_store_has_it_and_local_absent() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::new(tmp.path().join("store"));
        std::fs::create_dir_all(store.platform_path("libX", "c1", PlatformKey::Concrete(Platform::MacOS))).unwrap();
        let local = tmp.path().join("3rdparty").join("libX");

        let status = classify(&store, &local, &dep("libX", "c1", Platform::MacOS), &[Platform::MacOS]);
        assert_eq!(status, Status::LinkNew);
    }

    #[test]
    fn linked_when_correct_symlink_and_store_complete() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::new(tmp.path().join("store"));
        let target = store.platform_path("libX", "c1", PlatformKey::Concrete(Platform::MacOS));
        std::fs::create_dir_all(&target).unwrap();
        let local = tmp.path().join("3rdparty").join("libX");
        std::fs::create_dir_all(local.parent().unwrap()).unwrap();
        std::os::unix::fs::symlink(&target, &local).unwrap();

        let status = classify(&store, &local, &dep("libX", "c1", Platform::MacOS), &[Platform::MacOS]);
        assert_eq!(status, Status::Linked);
    }

    #[test]
    fn relink_when_symlink_points_elsewhere() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::new(tmp.path().join("store"));
        std::fs::create_dir_all(store.platform_path("libX", "c1", PlatformKey::Concrete(Platform::MacOS))).unwrap();
        let wrong_target = tmp.path().join("elsewhere");
        std::fs::create_dir_all(&wrong_target).unwrap();
        let local = tmp.path().join("3rdparty").join("libX");
        std::fs::create_dir_all(local.parent().unwrap()).unwrap();
        std::os::unix::fs::symlink(&wrong_target, &local).unwrap();

        let status = classify(&store, &local, &dep("libX", "c1", Platform::MacOS), &[Platform::MacOS]);
        assert_eq!(status, Status::Relink);
    }

    #[test]
    fn replace_when_local_dir_and_store_already_has_it() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::new(tmp.path().join("store"));
        std::fs::create_dir_all(store.platform_path("libX", "c1", PlatformKey::Concrete(Platform::MacOS))).unwrap();
        let local = tmp.path().join("3rdparty").join("libX");
        std::fs::create_dir_all(&local).unwrap();

        let status = classify(&store, &local, &dep("libX", "c1", Platform::MacOS), &[Platform::MacOS]);
        assert_eq!(status, Status::Replace);
    }

    #[test]
    fn absorb_when_local_dir_matches_commit_and_store_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::new(tmp.path().join("store"));
        let local = tmp.path().join("3rdparty").join("libX");
        std::fs::create_dir_all(local.join(".git")).unwrap();
        std::fs::write(local.join(".git").join("commit_hash"), "c1commit\n").unwrap();

        let status = classify(&store, &local, &dep("libX", "c1commit", Platform::MacOS), &[Platform::MacOS]);
        assert_eq!(status, Status::Absorb);
    }

    #[test]
    fn replace_when_local_dir_commit_mismatches_declared() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::new(tmp.path().join("store"));
        let local = tmp.path().join("3rdparty").join("libX");
        std::fs::create_dir_all(local.join(".git")).unwrap();
        std::fs::write(local.join(".git").join("commit_hash"), "otherCommit\n").unwrap();

        let status = classify(&store, &local, &dep("libX", "declaredCommit", Platform::MacOS), &[Platform::MacOS]);
        assert_eq!(status, Status::Replace);
    }

    #[test]
    fn general_library_uses_single_symlink_semantics() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::new(tmp.path().join("store"));
        let shared = store.shared_path("libGen", "gcommit");
        std::fs::create_dir_all(&shared).unwrap();
        std::fs::write(shared.join("x.h"), "x").unwrap();

        let local = tmp.path().join("3rdparty").join("libGen");
        std::fs::create_dir_all(local.parent().unwrap()).unwrap();

        let status = classify(&store, &local, &dep("libGen", "gcommit", Platform::MacOS), &[Platform::MacOS]);
        assert_eq!(status, Status::LinkNew);
    }
}
