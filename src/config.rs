// SPDX-FileCopyrightText: Copyright © 2026 TanmiDock Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! `config.json` load/save (spec §6.4, SPEC_FULL §4.13). Structurally this
//! mirrors the teacher's `config.rs` (a typed domain loaded/saved through a
//! single serialization format) but drops the vendor/admin overlay search,
//! since there's exactly one config file per home, and swaps `serde_yaml`
//! for `serde_json` per spec.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// How unreferenced store entries are scheduled for cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanStrategy {
    /// Clean up as soon as `usedBy` becomes empty.
    Unreferenced,
    /// Clean up once `unlinkedAt` is older than `unusedDays`.
    Unused,
    /// Never clean automatically; only `unlink --remove` acts.
    Manual,
}

impl Default for CleanStrategy {
    fn default() -> Self {
        CleanStrategy::Unused
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub https: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_proxy: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    pub initialized: bool,
    #[serde(rename = "storePath")]
    pub store_path: String,
    #[serde(rename = "cleanStrategy", default)]
    pub clean_strategy: CleanStrategy,
    #[serde(rename = "unusedDays", default = "default_unused_days")]
    pub unused_days: u32,
    #[serde(rename = "maxStoreSize", skip_serializing_if = "Option::is_none", default)]
    pub max_store_size: Option<u64>,
    #[serde(rename = "autoDownload", default = "default_true")]
    pub auto_download: bool,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(rename = "logLevel", default = "default_log_level")]
    pub log_level: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub proxy: Option<ProxyConfig>,
}

fn default_true() -> bool {
    true
}

fn default_unused_days() -> u32 {
    crate::environment::DEFAULT_UNUSED_DAYS
}

fn default_concurrency() -> usize {
    4
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn new(store_path: impl Into<String>) -> Self {
        Config {
            version: crate::environment::SCHEMA_VERSION.to_string(),
            initialized: true,
            store_path: store_path.into(),
            clean_strategy: CleanStrategy::default(),
            unused_days: default_unused_days(),
            max_store_size: None,
            auto_download: true,
            concurrency: default_concurrency(),
            log_level: default_log_level(),
            proxy: None,
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Config, Error> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::Read(path.to_path_buf(), e))?;
        serde_json::from_reader(file).map_err(|e| Error::Parse(path.to_path_buf(), e))
    }

    /// Atomic save: write to `<path>.tmp`, fsync, rename over `path`
    /// (spec §4.4's save discipline, applied here too for config).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let path = path.as_ref();
        let tmp_path = tmp_path_for(path);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::Write(path.to_path_buf(), e))?;
        }

        let serialized = serde_json::to_string_pretty(self)?;
        {
            let mut file = File::create(&tmp_path).map_err(|e| Error::Write(tmp_path.clone(), e))?;
            use std::io::Write;
            file.write_all(serialized.as_bytes())
                .map_err(|e| Error::Write(tmp_path.clone(), e))?;
            file.sync_all().map_err(|e| Error::Write(tmp_path.clone(), e))?;
        }
        fs::rename(&tmp_path, path).map_err(|e| Error::Write(path.to_path_buf(), e))?;

        Ok(())
    }

    /// Get a value by dotted key for `config get <key>` (spec §6.1).
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "storePath" => Some(self.store_path.clone()),
            "cleanStrategy" => Some(serde_json::to_value(self.clean_strategy).ok()?.as_str()?.to_string()),
            "unusedDays" => Some(self.unused_days.to_string()),
            "autoDownload" => Some(self.auto_download.to_string()),
            "concurrency" => Some(self.concurrency.to_string()),
            "logLevel" => Some(self.log_level.clone()),
            "proxy.http" => self.proxy.as_ref()?.http.clone(),
            "proxy.https" => self.proxy.as_ref()?.https.clone(),
            "proxy.noProxy" => self.proxy.as_ref()?.no_proxy.clone(),
            _ => None,
        }
    }

    /// Set a value by dotted key for `config set <key> <value>` (spec §6.1).
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), Error> {
        match key {
            "storePath" => self.store_path = value.to_string(),
            "cleanStrategy" => {
                self.clean_strategy = match value {
                    "unreferenced" => CleanStrategy::Unreferenced,
                    "unused" => CleanStrategy::Unused,
                    "manual" => CleanStrategy::Manual,
                    other => return Err(Error::InvalidValue(key.to_string(), other.to_string())),
                }
            }
            "unusedDays" => {
                self.unused_days = value
                    .parse()
                    .map_err(|_| Error::InvalidValue(key.to_string(), value.to_string()))?
            }
            "autoDownload" => {
                self.auto_download = value
                    .parse()
                    .map_err(|_| Error::InvalidValue(key.to_string(), value.to_string()))?
            }
            "concurrency" => {
                self.concurrency = value
                    .parse()
                    .map_err(|_| Error::InvalidValue(key.to_string(), value.to_string()))?
            }
            "logLevel" => self.log_level = value.to_string(),
            "proxy.http" => self.proxy_mut().http = Some(validate_proxy_url(key, value)?),
            "proxy.https" => self.proxy_mut().https = Some(validate_proxy_url(key, value)?),
            "proxy.noProxy" => self.proxy_mut().no_proxy = Some(value.to_string()),
            _ => return Err(Error::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    fn proxy_mut(&mut self) -> &mut ProxyConfig {
        self.proxy.get_or_insert_with(|| ProxyConfig { http: None, https: None, no_proxy: None })
    }
}

/// `proxy.http`/`proxy.https` must be well-formed URLs (spec §6.4's
/// proxy sub-config is ambient configuration for [`crate::downloader`],
/// which hands it straight to `HTTP_PROXY`/`HTTPS_PROXY`).
fn validate_proxy_url(key: &str, value: &str) -> Result<String, Error> {
    Url::parse(value)
        .map(|_| value.to_string())
        .map_err(|_| Error::InvalidValue(key.to_string(), value.to_string()))
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("could not read config at {0:?}: {1}")]
    Read(PathBuf, #[source] io::Error),
    #[error("could not parse config at {0:?}: {1}")]
    Parse(PathBuf, #[source] serde_json::Error),
    #[error("could not write config at {0:?}: {1}")]
    Write(PathBuf, #[source] io::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("unknown config key {0:?}")]
    UnknownKey(String),
    #[error("invalid value {1:?} for key {0:?}")]
    InvalidValue(String, String),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let config = Config::new("/store");
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.store_path, "/store");
        assert_eq!(loaded.clean_strategy, CleanStrategy::Unused);
    }

    #[test]
    fn get_and_set_known_keys() {
        let mut config = Config::new("/store");
        config.set("unusedDays", "30").unwrap();
        assert_eq!(config.get("unusedDays"), Some("30".to_string()));
    }

    #[test]
    fn set_unknown_key_errors() {
        let mut config = Config::new("/store");
        assert!(matches!(config.set("bogus", "x"), Err(Error::UnknownKey(_))));
    }

    #[test]
    fn set_invalid_clean_strategy_errors() {
        let mut config = Config::new("/store");
        assert!(matches!(
            config.set("cleanStrategy", "nonsense"),
            Err(Error::InvalidValue(_, _))
        ));
    }

    #[test]
    fn set_proxy_http_validates_url() {
        let mut config = Config::new("/store");
        config.set("proxy.http", "http://proxy.example.com:8080").unwrap();
        assert_eq!(config.get("proxy.http"), Some("http://proxy.example.com:8080".to_string()));
    }

    #[test]
    fn set_proxy_http_rejects_malformed_url() {
        let mut config = Config::new("/store");
        assert!(matches!(config.set("proxy.http", "not a url"), Err(Error::InvalidValue(_, _))));
    }
}
