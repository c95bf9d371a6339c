// SPDX-FileCopyrightText: Copyright © 2026 TanmiDock Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! On-disk Store layout: absorb/absorbGeneral (cross-FS safe moves with
//! rollback), remove, size probes (spec §4.5).

pub(crate) mod fsops;

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::environment::GENERAL_PLATFORM_DIR;
use crate::platform::{Platform, PlatformKey};

pub use fsops::ProgressFn;

/// `v0.6` iff `_shared` exists; `v0.5` iff any double-nested
/// `<platform>/<platform>/` exists; else `Unknown` (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreVersion {
    V06,
    V05,
    Unknown,
}

#[derive(Debug, Clone, Default)]
pub struct PlatformCompleteness {
    pub existing: Vec<Platform>,
    pub missing: Vec<Platform>,
}

/// Result of [`Store::absorb_lib`]: which platform/shared entries were
/// newly moved in versus already content-addressed and skipped (spec §4.5
/// invariant 5, and boundary law L2).
#[derive(Debug, Clone, Default)]
pub struct AbsorbReport {
    pub absorbed_platforms: Vec<PlatformKey>,
    pub skipped_platforms: Vec<PlatformKey>,
    pub absorbed_shared: Vec<String>,
    pub skipped_shared: Vec<String>,
}

pub struct Store {
    root: PathBuf,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Store { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn lib_path(&self, lib_name: &str) -> PathBuf {
        self.root.join(lib_name)
    }

    fn commit_path(&self, lib_name: &str, commit: &str) -> PathBuf {
        self.lib_path(lib_name).join(commit)
    }

    pub fn platform_path(&self, lib_name: &str, commit: &str, platform: PlatformKey) -> PathBuf {
        self.commit_path(lib_name, commit).join(platform.as_str())
    }

    pub fn shared_path(&self, lib_name: &str, commit: &str) -> PathBuf {
        self.commit_path(lib_name, commit).join(GENERAL_PLATFORM_DIR)
    }

    // -- Probes --------------------------------------------------------------

    pub fn exists(&self, lib_name: &str, commit: &str, platform: PlatformKey) -> bool {
        self.platform_path(lib_name, commit, platform).is_dir()
    }

    pub fn get_path(&self, lib_name: &str, commit: &str, platform: PlatformKey) -> PathBuf {
        self.platform_path(lib_name, commit, platform)
    }

    pub fn get_size(&self, lib_name: &str, commit: &str, platform: PlatformKey) -> io::Result<u64> {
        fsops::dir_size(&self.platform_path(lib_name, commit, platform))
    }

    pub fn get_total_size(&self) -> io::Result<u64> {
        if !self.root.is_dir() {
            return Ok(0);
        }
        fsops::dir_size(&self.root)
    }

    /// Walk `<libName>/<commit>/<platform>` three deep.
    pub fn list_libraries(&self) -> io::Result<Vec<(String, String, PlatformKey)>> {
        let mut result = Vec::new();
        if !self.root.is_dir() {
            return Ok(result);
        }

        for lib_entry in fs_err::read_dir(&self.root)? {
            let lib_entry = lib_entry?;
            if !lib_entry.file_type()?.is_dir() {
                continue;
            }
            let lib_name = lib_entry.file_name().to_string_lossy().into_owned();

            for commit_entry in fs_err::read_dir(lib_entry.path())? {
                let commit_entry = commit_entry?;
                if !commit_entry.file_type()?.is_dir() {
                    continue;
                }
                let commit = commit_entry.file_name().to_string_lossy().into_owned();

                for platform_entry in fs_err::read_dir(commit_entry.path())? {
                    let platform_entry = platform_entry?;
                    if !platform_entry.file_type()?.is_dir() {
                        continue;
                    }
                    let name = platform_entry.file_name().to_string_lossy().into_owned();
                    if let Some(key) = PlatformKey::parse(&name) {
                        result.push((lib_name.clone(), commit.clone(), key));
                    }
                }
            }
        }

        Ok(result)
    }

    pub fn detect_store_version(&self, lib_name: &str, commit: &str) -> StoreVersion {
        let commit_path = self.commit_path(lib_name, commit);

        if commit_path.join(GENERAL_PLATFORM_DIR).is_dir() {
            return StoreVersion::V06;
        }

        if let Ok(entries) = fs_err::read_dir(&commit_path) {
            for entry in entries.flatten() {
                let name = entry.file_name().to_string_lossy().into_owned();
                if Platform::is_platform_dir(&name) && entry.path().join(&name).is_dir() {
                    return StoreVersion::V05;
                }
            }
        }

        StoreVersion::Unknown
    }

    pub fn ensure_compatible_store(&self, lib_name: &str, commit: &str) -> Result<(), Error> {
        match self.detect_store_version(lib_name, commit) {
            StoreVersion::V05 => Err(Error::IncompatibleStore {
                lib_name: lib_name.to_string(),
                commit: commit.to_string(),
                version: "v0.5".to_string(),
            }),
            _ => Ok(()),
        }
    }

    pub fn check_platform_completeness(&self, lib_name: &str, commit: &str, requested: &[Platform]) -> PlatformCompleteness {
        let mut completeness = PlatformCompleteness::default();
        for platform in requested {
            if self.exists(lib_name, commit, PlatformKey::Concrete(*platform)) {
                completeness.existing.push(*platform);
            } else {
                completeness.missing.push(*platform);
            }
        }
        completeness
    }

    /// True iff `_shared` exists with at least one entry and no canonical
    /// platform directory exists at the commit level (spec §4.5).
    pub fn is_general_lib(&self, lib_name: &str, commit: &str) -> bool {
        let commit_path = self.commit_path(lib_name, commit);
        let shared = commit_path.join(GENERAL_PLATFORM_DIR);

        let shared_has_contents = fs_err::read_dir(&shared)
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false);

        if !shared_has_contents {
            return false;
        }

        let has_platform_dir = fs_err::read_dir(&commit_path)
            .map(|entries| {
                entries.flatten().any(|e| {
                    let name = e.file_name().to_string_lossy().into_owned();
                    Platform::is_platform_dir(&name) && e.path().is_dir()
                })
            })
            .unwrap_or(false);

        !has_platform_dir
    }

    // -- Mutations -------------------------------------------------------------

    /// Legacy single-platform absorb (spec §4.5).
    pub fn absorb(&self, source_dir: &Path, lib_name: &str, commit: &str, platform: PlatformKey) -> Result<(), Error> {
        let target = self.platform_path(lib_name, commit, platform);

        if target.exists() {
            return Err(Error::AlreadyInStore {
                lib_name: lib_name.to_string(),
                commit: commit.to_string(),
                platform: platform.to_string(),
            });
        }

        if let Some(parent) = target.parent() {
            fs_err::create_dir_all(parent)?;
        }

        fsops::move_or_copy(source_dir, &target, None)?;
        Ok(())
    }

    /// Primary absorb entry point (spec §4.5 steps 1-7).
    pub fn absorb_lib(
        &self,
        lib_dir: &Path,
        platforms: &[Platform],
        lib_name: &str,
        commit: &str,
        progress: Option<&ProgressFn>,
    ) -> Result<AbsorbReport, Error> {
        let mut rollback = fsops::RollbackStack::new();
        let mut report = AbsorbReport::default();

        let result = self.absorb_lib_inner(lib_dir, platforms, lib_name, commit, progress, &mut rollback, &mut report);

        match result {
            Ok(()) => {
                rollback.commit_deferred_deletes();
                Ok(report)
            }
            Err(e) => {
                rollback.unwind();
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn absorb_lib_inner(
        &self,
        lib_dir: &Path,
        platforms: &[Platform],
        lib_name: &str,
        commit: &str,
        progress: Option<&ProgressFn>,
        rollback: &mut fsops::RollbackStack,
        report: &mut AbsorbReport,
    ) -> Result<(), Error> {
        let requested: HashSet<&'static str> = platforms.iter().map(|p| p.as_str()).collect();
        let commit_path = self.commit_path(lib_name, commit);
        fs_err::create_dir_all(&commit_path)?;

        for entry in fs_err::read_dir(lib_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let path = entry.path();

            if name == "dependencies" && path.is_dir() {
                self.absorb_dependencies_subdir(&path, lib_name, commit, rollback)?;
                continue;
            }

            if entry.file_type()?.is_dir() && Platform::is_platform_dir(&name) {
                let Some(canonical) = Platform::from_loose(&name) else {
                    continue;
                };
                if !requested.is_empty() && !requested.contains(canonical.as_str()) {
                    continue;
                }

                let key = PlatformKey::Concrete(canonical);
                let target = self.platform_path(lib_name, commit, key);

                if target.exists() {
                    report.skipped_platforms.push(key);
                    continue;
                }

                let outcome = fsops::move_or_copy(&path, &target, progress)?;
                rollback.push(fsops::RollbackOp {
                    source: path.clone(),
                    target: target.clone(),
                    cross_fs: outcome.cross_fs,
                });
                report.absorbed_platforms.push(key);
            } else {
                let target = self.shared_path(lib_name, commit).join(&name);

                if target.exists() {
                    report.skipped_shared.push(name);
                    continue;
                }

                if let Some(parent) = target.parent() {
                    fs_err::create_dir_all(parent)?;
                }

                let outcome = fsops::move_or_copy(&path, &target, progress)?;
                rollback.push(fsops::RollbackOp {
                    source: path.clone(),
                    target,
                    cross_fs: outcome.cross_fs,
                });
                report.absorbed_shared.push(name);
            }
        }

        Ok(())
    }

    /// Recurse into nested sub-libraries under `dependencies/` (spec §4.5
    /// step 4). Non-directory files, and directories that don't look like a
    /// nested library, are moved into `_shared/dependencies/<name>` of the
    /// enclosing library instead.
    fn absorb_dependencies_subdir(
        &self,
        dependencies_dir: &Path,
        lib_name: &str,
        commit: &str,
        rollback: &mut fsops::RollbackStack,
    ) -> Result<(), Error> {
        for entry in fs_err::read_dir(dependencies_dir)? {
            let entry = entry?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();

            if entry.file_type()?.is_dir() {
                let commit_hash_file = path.join(".git").join("commit_hash");
                if let Ok(nested_commit) = fs_err::read_to_string(&commit_hash_file) {
                    let nested_commit = nested_commit.trim().to_string();
                    if self.is_general_lib_candidate(&path) {
                        self.absorb_general(&path, &name, &nested_commit)?;
                    } else {
                        self.absorb_lib(&path, &[], &name, &nested_commit, None)?;
                    }
                    continue;
                }
            }

            let target = self.shared_path(lib_name, commit).join("dependencies").join(&name);
            if target.exists() {
                continue;
            }
            if let Some(parent) = target.parent() {
                fs_err::create_dir_all(parent)?;
            }
            let outcome = fsops::move_or_copy(&path, &target, None)?;
            rollback.push(fsops::RollbackOp {
                source: path,
                target,
                cross_fs: outcome.cross_fs,
            });
        }
        Ok(())
    }

    fn is_general_lib_candidate(&self, dir: &Path) -> bool {
        fs_err::read_dir(dir)
            .map(|entries| {
                !entries
                    .flatten()
                    .any(|e| Platform::is_platform_dir(&e.file_name().to_string_lossy()))
            })
            .unwrap_or(false)
    }

    /// `_shared`-only absorb for General libraries (spec §4.5).
    pub fn absorb_general(&self, lib_dir: &Path, lib_name: &str, commit: &str) -> Result<PathBuf, Error> {
        let target = self.shared_path(lib_name, commit);

        if target.exists() {
            return Ok(target);
        }

        if let Some(parent) = target.parent() {
            fs_err::create_dir_all(parent)?;
        }

        fsops::move_or_copy(lib_dir, &target, None)?;
        Ok(target)
    }

    /// If `platform` is the general sentinel, delete the whole
    /// `<storeRoot>/L/C/` tree. Otherwise delete only `<storeRoot>/L/C/P/`,
    /// then, if what remains is empty or only `_shared`, delete the whole
    /// commit dir; finally if `<storeRoot>/L/` is empty, delete it
    /// (spec §4.5).
    pub fn remove(&self, lib_name: &str, commit: &str, platform: PlatformKey) -> Result<(), Error> {
        let commit_path = self.commit_path(lib_name, commit);

        if platform.is_general() {
            if commit_path.is_dir() {
                fs_err::remove_dir_all(&commit_path)?;
            }
        } else {
            let platform_path = self.platform_path(lib_name, commit, platform);
            if platform_path.is_dir() {
                fs_err::remove_dir_all(&platform_path)?;
            }

            if commit_path.is_dir() {
                let remaining: Vec<_> = fs_err::read_dir(&commit_path)?.flatten().collect();
                let only_shared = remaining.iter().all(|e| e.file_name() == GENERAL_PLATFORM_DIR);
                if remaining.is_empty() || only_shared {
                    fs_err::remove_dir_all(&commit_path)?;
                }
            }
        }

        let lib_path = self.lib_path(lib_name);
        if lib_path.is_dir() && fs_err::read_dir(&lib_path)?.next().is_none() {
            fs_err::remove_dir_all(&lib_path)?;
        }

        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("{lib_name}@{commit} ({platform}) is already in the store")]
    AlreadyInStore { lib_name: String, commit: String, platform: String },
    #[error("{lib_name}@{commit} is an incompatible store layout ({version}); re-absorb it to upgrade")]
    IncompatibleStore { lib_name: String, commit: String, version: String },
}

#[cfg(test)]
mod test {
    use super::*;

    fn write_file(path: &Path, contents: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn absorb_lib_moves_platform_and_shared_content() {
        let tmp = tempfile::tempdir().unwrap();
        let lib_dir = tmp.path().join("libE2E");
        write_file(&lib_dir.join("macOS").join("lib.a"), "mac");
        write_file(&lib_dir.join("android").join("lib.so"), "android");
        write_file(&lib_dir.join("common.h"), "shared");

        let store = Store::new(tmp.path().join("store"));
        let report = store
            .absorb_lib(&lib_dir, &[Platform::MacOS, Platform::Android], "libE2E", "e2e1commit", None)
            .unwrap();

        assert_eq!(report.absorbed_platforms.len(), 2);
        assert!(store.exists("libE2E", "e2e1commit", PlatformKey::Concrete(Platform::MacOS)));
        assert!(store.exists("libE2E", "e2e1commit", PlatformKey::Concrete(Platform::Android)));
        assert!(store.shared_path("libE2E", "e2e1commit").join("common.h").is_file());
    }

    #[test]
    fn absorb_lib_is_idempotent_second_call_reports_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let lib_dir = tmp.path().join("lib");
        write_file(&lib_dir.join("macOS").join("a"), "x");

        let store = Store::new(tmp.path().join("store"));
        store.absorb_lib(&lib_dir, &[Platform::MacOS], "lib", "c1", None).unwrap();

        let empty_lib_dir = tmp.path().join("lib2");
        std::fs::create_dir_all(empty_lib_dir.join("macOS")).unwrap();
        let report = store.absorb_lib(&empty_lib_dir, &[Platform::MacOS], "lib", "c1", None).unwrap();

        assert_eq!(report.skipped_platforms, vec![PlatformKey::Concrete(Platform::MacOS)]);
        assert!(report.absorbed_platforms.is_empty());
    }

    #[test]
    fn absorb_general_places_everything_under_shared() {
        let tmp = tempfile::tempdir().unwrap();
        let lib_dir = tmp.path().join("libGen");
        write_file(&lib_dir.join("include").join("gen.h"), "x");

        let store = Store::new(tmp.path().join("store"));
        let shared = store.absorb_general(&lib_dir, "libGen", "gcommit").unwrap();

        assert!(shared.join("include").join("gen.h").is_file());
        assert!(store.is_general_lib("libGen", "gcommit"));
    }

    #[test]
    fn remove_platform_keeps_shared_and_siblings() {
        let tmp = tempfile::tempdir().unwrap();
        let lib_dir = tmp.path().join("lib");
        write_file(&lib_dir.join("macOS").join("a"), "x");
        write_file(&lib_dir.join("android").join("b"), "y");
        write_file(&lib_dir.join("common.h"), "z");

        let store = Store::new(tmp.path().join("store"));
        store
            .absorb_lib(&lib_dir, &[Platform::MacOS, Platform::Android], "lib", "c1", None)
            .unwrap();

        store.remove("lib", "c1", PlatformKey::Concrete(Platform::MacOS)).unwrap();

        assert!(!store.exists("lib", "c1", PlatformKey::Concrete(Platform::MacOS)));
        assert!(store.exists("lib", "c1", PlatformKey::Concrete(Platform::Android)));
        assert!(store.shared_path("lib", "c1").join("common.h").is_file());
    }

    #[test]
    fn remove_last_platform_and_shared_deletes_whole_lib_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let lib_dir = tmp.path().join("lib");
        write_file(&lib_dir.join("macOS").join("a"), "x");

        let store = Store::new(tmp.path().join("store"));
        store.absorb_lib(&lib_dir, &[Platform::MacOS], "lib", "c1", None).unwrap();
        store.remove("lib", "c1", PlatformKey::Concrete(Platform::MacOS)).unwrap();

        assert!(!store.lib_path("lib").is_dir());
    }

    #[test]
    fn detect_store_version_reports_v06_with_shared_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::new(tmp.path().join("store"));
        write_file(&store.shared_path("lib", "c1").join("x"), "y");
        assert_eq!(store.detect_store_version("lib", "c1"), StoreVersion::V06);
    }

    #[test]
    fn check_platform_completeness_splits_existing_and_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let lib_dir = tmp.path().join("lib");
        write_file(&lib_dir.join("macOS").join("a"), "x");

        let store = Store::new(tmp.path().join("store"));
        store.absorb_lib(&lib_dir, &[Platform::MacOS], "lib", "c1", None).unwrap();

        let completeness = store.check_platform_completeness("lib", "c1", &[Platform::MacOS, Platform::Android]);
        assert_eq!(completeness.existing, vec![Platform::MacOS]);
        assert_eq!(completeness.missing, vec![Platform::Android]);
    }
}
