// SPDX-FileCopyrightText: Copyright © 2026 TanmiDock Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Single-pass consistency check over Registry + Store, and the repair
//! actions `check --fix` offers for what it finds (spec §4.11).

use chrono::Utc;
use thiserror::Error;

use crate::linker;
use crate::platform::PlatformKey;
use crate::registry::{self, DependencyRef, Library, Registry, StoreEntry};
use crate::store::Store;

#[derive(Debug, Clone)]
pub struct DanglingLink {
    pub project_fingerprint: String,
    pub dependency: DependencyRef,
}

#[derive(Debug, Clone)]
pub struct OrphanLibrary {
    pub lib_name: String,
    pub commit: String,
    pub platform: PlatformKey,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct MissingLibrary {
    pub project_fingerprint: String,
    pub dependency: DependencyRef,
}

#[derive(Debug, Clone)]
pub struct StaleReference {
    pub store_key: String,
    pub project_fingerprint: String,
}

/// Result of one `check` pass (spec §4.11).
#[derive(Debug, Clone, Default)]
pub struct IntegrityReport {
    pub invalid_projects: Vec<String>,
    pub dangling_links: Vec<DanglingLink>,
    pub orphan_libraries: Vec<OrphanLibrary>,
    pub missing_libraries: Vec<MissingLibrary>,
    pub stale_references: Vec<StaleReference>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.invalid_projects.is_empty()
            && self.dangling_links.is_empty()
            && self.orphan_libraries.is_empty()
            && self.missing_libraries.is_empty()
            && self.stale_references.is_empty()
    }
}

/// Run the single consistency pass (spec §4.11).
pub fn check(registry: &Registry, store: &Store) -> Result<IntegrityReport, Error> {
    let mut report = IntegrityReport::default();

    for project in registry.list_projects() {
        let fingerprint = project.fingerprint();

        if !project.exists_on_disk() {
            report.invalid_projects.push(fingerprint.clone());
            continue;
        }

        for dep in &project.dependencies {
            let local = project.path.join(crate::environment::MANIFEST_3RDPARTY_SUBDIR).join(&dep.lib_name);
            let in_store = store.exists(&dep.lib_name, &dep.commit, PlatformKey::Concrete(dep.platform))
                || store.is_general_lib(&dep.lib_name, &dep.commit);

            if !local.exists() && !linker::is_symlink(&local) {
                if in_store {
                    report.dangling_links.push(DanglingLink {
                        project_fingerprint: fingerprint.clone(),
                        dependency: dep.clone(),
                    });
                } else {
                    report.missing_libraries.push(MissingLibrary {
                        project_fingerprint: fingerprint.clone(),
                        dependency: dep.clone(),
                    });
                }
            } else if linker::is_symlink(&local) && !linker::is_valid_link(&local) {
                report.dangling_links.push(DanglingLink {
                    project_fingerprint: fingerprint.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    for (lib_name, commit, platform) in store.list_libraries()? {
        let has_record = registry.get_store(&lib_name, &commit, platform).is_some();
        if !has_record {
            let size = store.get_size(&lib_name, &commit, platform).unwrap_or(0);
            report.orphan_libraries.push(OrphanLibrary { lib_name, commit, platform, size });
        }
    }

    for entry in registry.all_stores() {
        for project_fp in &entry.used_by {
            let still_links = registry.get_project(project_fp).is_some_and(|project| {
                project.dependencies.iter().any(|dep| {
                    dep.lib_name == entry.lib_name
                        && dep.commit == entry.commit
                        && project.path.join(crate::environment::MANIFEST_3RDPARTY_SUBDIR).join(&dep.lib_name).exists()
                })
            });

            if !still_links {
                report.stale_references.push(StaleReference {
                    store_key: entry.key(),
                    project_fingerprint: project_fp.clone(),
                });
            }
        }
    }

    Ok(report)
}

/// `removeProject` repair action (spec §4.11).
pub fn repair_invalid_project(registry: &mut Registry, fingerprint: &str) -> Result<(), Error> {
    registry.remove_project(fingerprint)?;
    Ok(())
}

/// Unlink the dangling symlink and drop the matching `DependencyRef` from
/// the project (spec §4.11).
pub fn repair_dangling_link(registry: &mut Registry, link: &DanglingLink) -> Result<(), Error> {
    registry.update_project(&link.project_fingerprint, |project| {
        project.dependencies.retain(|dep| dep.lib_name != link.dependency.lib_name || dep.commit != link.dependency.commit);
    })?;
    Ok(())
}

/// `prune`: delete the orphan's directory from disk.
pub fn repair_orphan_by_pruning(store: &Store, orphan: &OrphanLibrary) -> Result<(), Error> {
    store.remove(&orphan.lib_name, &orphan.commit, orphan.platform)?;
    Ok(())
}

/// `register`: add a `Library` (if absent) and a `StoreEntry` for the
/// orphan, with `usedBy` empty (spec §4.11).
pub fn repair_orphan_by_registering(registry: &mut Registry, orphan: &OrphanLibrary) -> Result<(), Error> {
    if registry.get_library(&orphan.lib_name, &orphan.commit).is_none() {
        registry.add_library(Library {
            lib_name: orphan.lib_name.clone(),
            commit: orphan.commit.clone(),
            branch: String::new(),
            url: String::new(),
            platforms: Default::default(),
            size: orphan.size,
            created_at: Utc::now(),
            last_access: Utc::now(),
            referenced_by: Vec::new(),
        });
    }

    registry.add_store(StoreEntry {
        lib_name: orphan.lib_name.clone(),
        commit: orphan.commit.clone(),
        platform: orphan.platform,
        branch: String::new(),
        url: String::new(),
        size: orphan.size,
        used_by: Default::default(),
        unlinked_at: None,
        created_at: Utc::now(),
        last_access: Utc::now(),
    });

    Ok(())
}

/// `removeStoreReference` repair action for a stale reference (spec §4.11).
pub fn repair_stale_reference(registry: &mut Registry, stale: &StaleReference) {
    registry.remove_store_reference(&stale.store_key, &stale.project_fingerprint);
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Registry(#[from] registry::Error),
    #[error(transparent)]
    Store(#[from] crate::store::Error),
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::platform::Platform;
    use crate::registry::DependencyRef;

    fn sample_project(path: &std::path::Path) -> crate::registry::Project {
        crate::registry::Project {
            path: path.to_path_buf(),
            config_path: path.join("codepac-dep.json"),
            last_linked: Utc::now(),
            platforms: [Platform::MacOS].into_iter().collect(),
            dependencies: vec![DependencyRef::new("libX", "c1", Platform::MacOS)],
            optional_configs: None,
        }
    }

    #[test]
    fn detects_invalid_project_missing_on_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::new(tmp.path().join("store"));
        let path = tmp.path().join("does-not-exist-project");

        let registry_path = tmp.path().join("registry.json");
        let mut registry = Registry::load(&registry_path).unwrap();
        registry.add_project(sample_project(&path));

        let report = check(&registry, &store).unwrap();
        assert_eq!(report.invalid_projects.len(), 1);
    }

    #[test]
    fn detects_orphan_library_with_no_registry_record() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::new(tmp.path().join("store"));
        std::fs::create_dir_all(store.platform_path("libOrphan", "x", PlatformKey::Concrete(Platform::MacOS))).unwrap();

        let registry_path = tmp.path().join("registry.json");
        let registry = Registry::load(&registry_path).unwrap();

        let report = check(&registry, &store).unwrap();
        assert_eq!(report.orphan_libraries.len(), 1);
        assert_eq!(report.orphan_libraries[0].lib_name, "libOrphan");
    }

    #[test]
    fn register_repair_adds_library_and_store_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::new(tmp.path().join("store"));
        std::fs::create_dir_all(store.platform_path("libOrphan", "x", PlatformKey::Concrete(Platform::MacOS))).unwrap();

        let registry_path = tmp.path().join("registry.json");
        let mut registry = Registry::load(&registry_path).unwrap();

        let report = check(&registry, &store).unwrap();
        let orphan = &report.orphan_libraries[0];
        repair_orphan_by_registering(&mut registry, orphan).unwrap();

        assert!(registry.get_library("libOrphan", "x").is_some());
        let entry = registry.get_store("libOrphan", "x", PlatformKey::Concrete(Platform::MacOS)).unwrap();
        assert!(entry.used_by.is_empty());
    }

    #[test]
    fn detects_stale_reference_when_project_no_longer_links() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::new(tmp.path().join("store"));
        let project_path = tmp.path().join("project");
        std::fs::create_dir_all(&project_path).unwrap();

        let registry_path = tmp.path().join("registry.json");
        let mut registry = Registry::load(&registry_path).unwrap();

        let mut project = sample_project(&project_path);
        project.dependencies.clear();
        let fingerprint = registry.add_project(project);

        let entry = StoreEntry {
            lib_name: "libX".to_string(),
            commit: "c1".to_string(),
            platform: PlatformKey::Concrete(Platform::MacOS),
            branch: "main".to_string(),
            url: "git@example.com:x.git".to_string(),
            size: 10,
            used_by: [fingerprint.clone()].into_iter().collect(),
            unlinked_at: None,
            created_at: Utc::now(),
            last_access: Utc::now(),
        };
        registry.add_store(entry);

        let report = check(&registry, &store).unwrap();
        assert_eq!(report.stale_references.len(), 1);
        assert_eq!(report.stale_references[0].project_fingerprint, fingerprint);
    }
}
