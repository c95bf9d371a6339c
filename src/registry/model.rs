// SPDX-FileCopyrightText: Copyright © 2026 TanmiDock Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Entity types persisted in `registry.json` (spec §3.1).

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::platform::{Platform, PlatformKey};

/// `"<libName>:<commit>"` key into [`super::Registry::libraries`].
pub fn library_key(lib_name: &str, commit: &str) -> String {
    format!("{lib_name}:{commit}")
}

/// `"<libName>:<commit>:<platform>"` key into [`super::Registry::stores`].
pub fn store_key(lib_name: &str, commit: &str, platform: PlatformKey) -> String {
    format!("{lib_name}:{commit}:{platform}")
}

/// Split a store key back into its components. Used by derived-platform
/// lookups (`getLibraryPlatforms`) and integrity scans.
pub fn split_store_key(key: &str) -> Option<(&str, &str, &str)> {
    let mut parts = key.rsplitn(3, ':');
    let platform = parts.next()?;
    let commit = parts.next()?;
    let lib_name = parts.next()?;
    Some((lib_name, commit, platform))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DependencyRef {
    #[serde(rename = "libName")]
    pub lib_name: String,
    pub commit: String,
    pub platform: Platform,
    #[serde(rename = "linkedPath")]
    pub linked_path: String,
}

impl DependencyRef {
    pub fn new(lib_name: impl Into<String>, commit: impl Into<String>, platform: Platform) -> Self {
        let lib_name = lib_name.into();
        DependencyRef {
            linked_path: format!("{}/{lib_name}", crate::environment::MANIFEST_3RDPARTY_SUBDIR),
            lib_name,
            commit: commit.into(),
            platform,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub path: PathBuf,
    #[serde(rename = "configPath")]
    pub config_path: PathBuf,
    #[serde(rename = "lastLinked")]
    pub last_linked: DateTime<Utc>,
    pub platforms: HashSet<Platform>,
    pub dependencies: Vec<DependencyRef>,
    #[serde(rename = "optionalConfigs", skip_serializing_if = "Option::is_none", default)]
    pub optional_configs: Option<Vec<String>>,
}

impl Project {
    pub fn fingerprint(&self) -> String {
        crate::path_policy::hash_path(&self.path)
    }

    pub fn exists_on_disk(&self) -> bool {
        self.path.is_dir()
    }

    /// All `(libName, commit)` pairs this project currently references.
    pub fn dependency_lib_commits(&self) -> impl Iterator<Item = (&str, &str)> {
        self.dependencies.iter().map(|d| (d.lib_name.as_str(), d.commit.as_str()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Library {
    #[serde(rename = "libName")]
    pub lib_name: String,
    pub commit: String,
    pub branch: String,
    pub url: String,
    /// Informational only; derive authoritative membership from StoreEntry
    /// keys via `Registry::library_platforms` (spec §4.4).
    #[serde(default)]
    pub platforms: HashSet<PlatformKey>,
    pub size: u64,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "lastAccess")]
    pub last_access: DateTime<Utc>,
    /// Legacy field retained only so the one-time migration pass (spec §4.4,
    /// §9) has somewhere to read stale data from; always empty after
    /// `Registry::load` returns.
    #[serde(rename = "referencedBy", default, skip_serializing_if = "Vec::is_empty")]
    pub referenced_by: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreEntry {
    #[serde(rename = "libName")]
    pub lib_name: String,
    pub commit: String,
    pub platform: PlatformKey,
    pub branch: String,
    pub url: String,
    pub size: u64,
    #[serde(rename = "usedBy", default)]
    pub used_by: HashSet<String>,
    #[serde(rename = "unlinkedAt", skip_serializing_if = "Option::is_none", default)]
    pub unlinked_at: Option<DateTime<Utc>>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "lastAccess")]
    pub last_access: DateTime<Utc>,
}

impl StoreEntry {
    pub fn key(&self) -> String {
        store_key(&self.lib_name, &self.commit, self.platform)
    }

    pub fn is_unreferenced(&self) -> bool {
        self.used_by.is_empty()
    }
}

/// Serialized shape of `registry.json` (spec §3.1, §3.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryData {
    pub version: String,
    #[serde(default)]
    pub projects: HashMap<String, Project>,
    #[serde(default)]
    pub libraries: HashMap<String, Library>,
    #[serde(default)]
    pub stores: HashMap<String, StoreEntry>,
}

impl Default for RegistryData {
    fn default() -> Self {
        RegistryData {
            version: crate::environment::SCHEMA_VERSION.to_string(),
            projects: HashMap::new(),
            libraries: HashMap::new(),
            stores: HashMap::new(),
        }
    }
}

pub(super) fn project_display_path(project: &Project) -> String {
    project.path.to_string_lossy().into_owned()
}

pub(super) fn canonicalize_best_effort(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
