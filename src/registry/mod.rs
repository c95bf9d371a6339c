// SPDX-FileCopyrightText: Copyright © 2026 TanmiDock Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The Registry: load/save of the JSON catalog, entities, indexes,
//! reference counting, and migration of legacy references (spec §4.4).

pub mod model;

use std::collections::HashMap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use itertools::Itertools;
use thiserror::Error;

pub use model::{library_key, split_store_key, store_key, DependencyRef, Library, Project, RegistryData, StoreEntry};

use crate::platform::PlatformKey;

#[derive(Debug, Clone)]
pub struct Registry {
    data: RegistryData,
    /// Set by `load` when the legacy-reference migration touched anything;
    /// the caller is expected to `save` right away (spec §4.4).
    dirty_from_migration: bool,
}

impl Registry {
    /// Load `registry.json`, or synthesize an empty template if it doesn't
    /// exist yet, then run the legacy-reference migration pass. If the
    /// migration changed anything the registry is saved immediately,
    /// mirroring the teacher's "load always leaves disk state consistent"
    /// discipline for the config/db layers.
    pub fn load(path: impl AsRef<Path>) -> Result<Registry, Error> {
        let path = path.as_ref();

        let data = match File::open(path) {
            Ok(file) => serde_json::from_reader(file).map_err(|e| Error::Parse(path.to_path_buf(), e))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => RegistryData::default(),
            Err(e) => return Err(Error::Io(path.to_path_buf(), e)),
        };

        let mut registry = Registry {
            data,
            dirty_from_migration: false,
        };

        let migrated = registry.migrate_legacy_references();
        registry.dirty_from_migration = migrated;

        if migrated {
            registry.save(path)?;
        }

        Ok(registry)
    }

    pub fn did_migrate(&self) -> bool {
        self.dirty_from_migration
    }

    /// Atomic save: write to `registry.json.tmp`, fsync, rename (spec §4.4).
    /// Callers are expected to hold the global operation lock (spec §5)
    /// around this call; the lock itself lives in [`crate::lockfile`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let path = path.as_ref();
        let tmp_path = {
            let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
            name.push(".tmp");
            path.with_file_name(name)
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::Io(path.to_path_buf(), e))?;
        }

        let serialized = serde_json::to_string_pretty(&self.data)?;
        {
            let mut file = File::create(&tmp_path).map_err(|e| Error::Io(tmp_path.clone(), e))?;
            use std::io::Write;
            file.write_all(serialized.as_bytes()).map_err(|e| Error::Io(tmp_path.clone(), e))?;
            file.sync_all().map_err(|e| Error::Io(tmp_path.clone(), e))?;
        }
        fs::rename(&tmp_path, path).map_err(|e| Error::Io(path.to_path_buf(), e))?;

        Ok(())
    }

    // -- Legacy migration (spec §4.4, §9) -----------------------------------

    /// For every `Library` still carrying a non-empty legacy `referencedBy`,
    /// move those entries into the matching `StoreEntry.usedBy` (only
    /// keeping projects that currently exist), clear `unlinkedAt` where
    /// appropriate, and empty the legacy field. Two quirks are preserved
    /// deliberately (spec §9):
    ///   (i) only project references whose project still exists are kept;
    ///   (ii) `referencedBy` is *not* cleared for libraries that currently
    ///       have no `StoreEntry` at all, to avoid losing data for a
    ///       library that's mid-repair.
    fn migrate_legacy_references(&mut self) -> bool {
        let live_projects: std::collections::HashSet<String> = self.data.projects.keys().cloned().collect();

        let mut changed = false;
        let lib_keys: Vec<String> = self.data.libraries.keys().cloned().collect();

        for lib_key in lib_keys {
            let referenced_by = match self.data.libraries.get(&lib_key) {
                Some(lib) if !lib.referenced_by.is_empty() => lib.referenced_by.clone(),
                _ => continue,
            };

            let store_keys: Vec<String> = self
                .data
                .stores
                .keys()
                .filter(|k| k.starts_with(&format!("{lib_key}:")))
                .cloned()
                .collect();

            if store_keys.is_empty() {
                // Quirk (ii): leave referenced_by alone, nothing to migrate into.
                continue;
            }

            let kept: Vec<String> = referenced_by.into_iter().filter(|p| live_projects.contains(p)).collect();

            for store_key in &store_keys {
                if let Some(entry) = self.data.stores.get_mut(store_key) {
                    for project in &kept {
                        if entry.used_by.insert(project.clone()) {
                            changed = true;
                        }
                    }
                    if !entry.used_by.is_empty() && entry.unlinked_at.is_some() {
                        entry.unlinked_at = None;
                        changed = true;
                    }
                }
            }

            if let Some(lib) = self.data.libraries.get_mut(&lib_key) {
                if !lib.referenced_by.is_empty() {
                    lib.referenced_by.clear();
                    changed = true;
                }
            }
        }

        changed
    }

    // -- Projects ------------------------------------------------------------

    pub fn get_project(&self, fingerprint: &str) -> Option<&Project> {
        self.data.projects.get(fingerprint)
    }

    pub fn get_project_by_path(&self, path: &Path) -> Option<&Project> {
        let canon = model::canonicalize_best_effort(path);
        self.data.projects.values().find(|p| model::canonicalize_best_effort(&p.path) == canon)
    }

    pub fn list_projects(&self) -> impl Iterator<Item = &Project> {
        self.data.projects.values()
    }

    pub fn add_project(&mut self, project: Project) -> String {
        let fingerprint = project.fingerprint();
        self.data.projects.insert(fingerprint.clone(), project);
        fingerprint
    }

    pub fn update_project(&mut self, fingerprint: &str, patch: impl FnOnce(&mut Project)) -> Result<(), Error> {
        let project = self
            .data
            .projects
            .get_mut(fingerprint)
            .ok_or_else(|| Error::ProjectNotFound(fingerprint.to_string()))?;
        patch(project);
        Ok(())
    }

    /// Remove a project, additionally removing its fingerprint from every
    /// `StoreEntry.usedBy` for every platform of each of its dependencies
    /// (not just the primary platform), setting `unlinkedAt=now` on any
    /// entry that becomes empty (spec §4.4).
    pub fn remove_project(&mut self, fingerprint: &str) -> Result<Project, Error> {
        let project = self
            .data
            .projects
            .remove(fingerprint)
            .ok_or_else(|| Error::ProjectNotFound(fingerprint.to_string()))?;

        for dep in &project.dependencies {
            let lib_key = library_key(&dep.lib_name, &dep.commit);
            let prefix = format!("{lib_key}:");
            let store_keys: Vec<String> = self.data.stores.keys().filter(|k| k.starts_with(&prefix)).cloned().collect();
            for key in store_keys {
                self.remove_store_reference(&key, fingerprint);
            }
        }

        Ok(project)
    }

    // -- Libraries -------------------------------------------------------------

    pub fn get_library(&self, lib_name: &str, commit: &str) -> Option<&Library> {
        self.data.libraries.get(&library_key(lib_name, commit))
    }

    pub fn add_library(&mut self, library: Library) {
        let key = library_key(&library.lib_name, &library.commit);
        self.data.libraries.insert(key, library);
    }

    pub fn remove_library(&mut self, lib_name: &str, commit: &str) -> Option<Library> {
        self.data.libraries.remove(&library_key(lib_name, commit))
    }

    /// Derived platform set for `(libName, commit)`, from existing
    /// `StoreEntry` keys, not from `Library.platforms` (spec §4.4).
    pub fn get_library_platforms(&self, lib_name: &str, commit: &str) -> Vec<PlatformKey> {
        self.data
            .stores
            .values()
            .filter(|e| e.lib_name == lib_name && e.commit == commit)
            .map(|e| e.platform)
            .sorted()
            .collect()
    }

    // -- Store entries -----------------------------------------------------

    pub fn get_store(&self, lib_name: &str, commit: &str, platform: PlatformKey) -> Option<&StoreEntry> {
        self.data.stores.get(&store_key(lib_name, commit, platform))
    }

    pub fn get_store_by_key(&self, key: &str) -> Option<&StoreEntry> {
        self.data.stores.get(key)
    }

    pub fn add_store(&mut self, entry: StoreEntry) {
        self.data.stores.insert(entry.key(), entry);
    }

    pub fn update_store(&mut self, key: &str, patch: impl FnOnce(&mut StoreEntry)) -> Result<(), Error> {
        let entry = self.data.stores.get_mut(key).ok_or_else(|| Error::StoreNotFound(key.to_string()))?;
        patch(entry);
        Ok(())
    }

    pub fn remove_store(&mut self, key: &str) -> Option<StoreEntry> {
        self.data.stores.remove(key)
    }

    pub fn all_stores(&self) -> impl Iterator<Item = &StoreEntry> {
        self.data.stores.values()
    }

    /// Idempotent insert into `usedBy`, clearing `unlinkedAt` (spec §4.4).
    pub fn add_store_reference(&mut self, key: &str, project_fingerprint: &str) -> Result<bool, Error> {
        let entry = self.data.stores.get_mut(key).ok_or_else(|| Error::StoreNotFound(key.to_string()))?;
        let inserted = entry.used_by.insert(project_fingerprint.to_string());
        entry.unlinked_at = None;
        Ok(inserted)
    }

    /// Remove if present; if `usedBy` becomes empty and `unlinkedAt` is not
    /// already set, set it to now (spec §4.4).
    pub fn remove_store_reference(&mut self, key: &str, project_fingerprint: &str) -> bool {
        let Some(entry) = self.data.stores.get_mut(key) else {
            return false;
        };
        let removed = entry.used_by.remove(project_fingerprint);
        if entry.used_by.is_empty() && entry.unlinked_at.is_none() {
            entry.unlinked_at = Some(Utc::now());
        }
        removed
    }

    pub fn get_unreferenced_stores(&self) -> Vec<&StoreEntry> {
        self.data.stores.values().filter(|e| e.is_unreferenced()).collect()
    }

    /// Unreferenced and `unlinkedAt` older than `days` (spec §4.4).
    pub fn get_unused_stores(&self, days: u32) -> Vec<&StoreEntry> {
        let cutoff = Utc::now() - chrono::Duration::days(days as i64);
        self.data
            .stores
            .values()
            .filter(|e| e.is_unreferenced() && e.unlinked_at.is_some_and(|t| t < cutoff))
            .collect()
    }

    /// Unreferenced but still within the grace period (spec §4.4).
    pub fn get_pending_unused_stores(&self, days: u32) -> Vec<&StoreEntry> {
        let cutoff = Utc::now() - chrono::Duration::days(days as i64);
        self.data
            .stores
            .values()
            .filter(|e| e.is_unreferenced() && e.unlinked_at.is_some_and(|t| t >= cutoff))
            .collect()
    }

    /// Among unreferenced entries, sort ascending by `unlinkedAt` (unset
    /// treated as +infinity, so oldest-unlinked-first), accumulate sizes
    /// until at least half the total bytes are covered (spec §4.4).
    pub fn get_stores_for_half_clean(&self) -> Vec<&StoreEntry> {
        let mut unreferenced: Vec<&StoreEntry> = self.get_unreferenced_stores();
        unreferenced.sort_by_key(|e| e.unlinked_at.unwrap_or(chrono::DateTime::<Utc>::MAX_UTC));

        let total: u64 = unreferenced.iter().map(|e| e.size).sum();
        let half = total / 2;

        let mut accumulated = 0u64;
        let mut result = Vec::new();
        for entry in unreferenced {
            if accumulated >= half {
                break;
            }
            accumulated += entry.size;
            result.push(entry);
        }
        result
    }

    // -- Space stats (spec §4.4) ---------------------------------------------

    pub fn actual_size(&self) -> u64 {
        self.data.stores.values().map(|e| e.size).sum()
    }

    pub fn theoretical_size(&self) -> u64 {
        self.data.stores.values().map(|e| e.size * e.used_by.len().max(1) as u64).sum()
    }

    pub fn saved_size(&self) -> u64 {
        self.theoretical_size().saturating_sub(self.actual_size())
    }

    // -- Cleanup passes ------------------------------------------------------

    /// Remove any project whose `path` is missing on disk.
    pub fn clean_stale_projects(&mut self) -> Vec<Project> {
        let stale: Vec<String> = self
            .data
            .projects
            .iter()
            .filter(|(_, p)| !p.exists_on_disk())
            .map(|(k, _)| k.clone())
            .collect();

        stale.into_iter().filter_map(|fp| self.remove_project(&fp).ok()).collect()
    }

    /// Purge fingerprints from `usedBy` that no longer map to an existing
    /// Project, re-applying the `unlinkedAt` rule.
    pub fn clean_stale_references(&mut self) -> usize {
        let live: std::collections::HashSet<String> = self.data.projects.keys().cloned().collect();
        let mut purged = 0;

        let keys: Vec<String> = self.data.stores.keys().cloned().collect();
        for key in keys {
            let stale_refs: Vec<String> = self
                .data
                .stores
                .get(&key)
                .map(|e| e.used_by.iter().filter(|p| !live.contains(*p)).cloned().collect())
                .unwrap_or_default();

            for project in stale_refs {
                if self.remove_store_reference(&key, &project) {
                    purged += 1;
                }
            }
        }

        purged
    }

    pub fn data(&self) -> &RegistryData {
        &self.data
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("could not read registry at {0:?}: {1}")]
    Io(PathBuf, #[source] io::Error),
    #[error("could not parse registry at {0:?}: {1}")]
    Parse(PathBuf, #[source] serde_json::Error),
    #[error("failed to serialize registry: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("project {0} not found in registry")]
    ProjectNotFound(String),
    #[error("store entry {0} not found in registry")]
    StoreNotFound(String),
}
