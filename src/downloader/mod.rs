// SPDX-FileCopyrightText: Copyright © 2026 TanmiDock Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Adapter around the external `codepac` downloader process (spec §4.10).
//! Builds a synthetic single-repo manifest, invokes the binary, streams its
//! stdout through a progress callback, and categorizes what lands in the
//! temp directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::config::ProxyConfig;
use crate::environment::{DOWNLOADER_BIN, GENERAL_PLATFORM_DIR};
use crate::parser::{Manifest, Repo, Repos, Sparse};
use crate::platform::{dedupe_base_keys, Platform};

pub struct DownloadRequest {
    pub url: String,
    pub commit: String,
    pub branch: String,
    pub lib_name: String,
    pub platforms: Vec<Platform>,
    pub sparse: Option<Sparse>,
    pub vars: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct DownloadResult {
    pub temp_dir: PathBuf,
    pub lib_dir: PathBuf,
    /// Platform variants the downloader materialized but the caller didn't
    /// request and which were discarded (spec §4.10 "clean unused variants").
    pub cleaned_platforms: Vec<Platform>,
}

/// Inject `HTTP_PROXY`/`HTTPS_PROXY`/`NO_PROXY` into the subprocess
/// environment (spec §4.10 "proxy configuration is ambient").
pub fn set_proxy_config(command: &mut Command, proxy: &ProxyConfig) {
    if let Some(http) = &proxy.http {
        command.env("HTTP_PROXY", http);
    }
    if let Some(https) = &proxy.https {
        command.env("HTTPS_PROXY", https);
    }
    if let Some(no_proxy) = &proxy.no_proxy {
        command.env("NO_PROXY", no_proxy);
    }
}

fn unique_temp_dir() -> PathBuf {
    let ts = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis()).unwrap_or(0);
    let rand_suffix: u32 = rand::thread_rng().gen();
    std::env::temp_dir().join(format!("tanmi-dock-{ts}-{rand_suffix:08x}"))
}

/// Download one dependency into a fresh temp dir (spec §4.10).
///
/// `on_progress` receives each line the downloader writes to stdout;
/// `on_temp_dir_created` fires once the temp dir exists, before the
/// subprocess is spawned, so callers can register it for transaction-log
/// rollback.
pub async fn download_to_temp(
    request: &DownloadRequest,
    proxy: Option<&ProxyConfig>,
    mut on_progress: impl FnMut(&str),
    on_temp_dir_created: impl FnOnce(&Path),
) -> Result<DownloadResult, Error> {
    let temp_dir = unique_temp_dir();
    fs_err::create_dir_all(&temp_dir)?;
    on_temp_dir_created(&temp_dir);

    let result = run_download(request, proxy, &temp_dir, &mut on_progress).await;

    match result {
        Ok(value) => Ok(value),
        Err(e) => {
            let _ = fs_err::remove_dir_all(&temp_dir);
            Err(e)
        }
    }
}

async fn run_download(
    request: &DownloadRequest,
    proxy: Option<&ProxyConfig>,
    temp_dir: &Path,
    on_progress: &mut impl FnMut(&str),
) -> Result<DownloadResult, Error> {
    let manifest_path = temp_dir.join("codepac-dep.json");
    let manifest = Manifest {
        version: "1".to_string(),
        vars: request.vars.clone(),
        repos: Repos {
            common: vec![Repo {
                url: request.url.clone(),
                commit: request.commit.clone(),
                branch: request.branch.clone(),
                dir: request.lib_name.clone(),
                sparse: request.sparse.clone(),
            }],
        },
        actions: None,
    };
    fs_err::write(&manifest_path, serde_json::to_string_pretty(&manifest)?)?;

    let base_keys = dedupe_base_keys(&request.platforms);

    let binary = which_downloader()?;
    let mut command = Command::new(binary);
    command
        .arg("install")
        .arg("-cf")
        .arg(&manifest_path)
        .arg("-td")
        .arg(temp_dir)
        .arg("-p")
        .args(base_keys)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped());

    if let Some(proxy) = proxy {
        set_proxy_config(&mut command, proxy);
    }

    let mut child = command.spawn().map_err(Error::Spawn)?;

    let stdout = child.stdout.take().expect("stdout piped");
    let mut lines = BufReader::new(stdout).lines();
    while let Some(line) = lines.next_line().await.map_err(Error::Spawn)? {
        on_progress(&line);
    }

    let output = child.wait_with_output().await.map_err(Error::Spawn)?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        return Err(Error::DownloaderFailed {
            code: output.status.code().unwrap_or(-1),
            stderr,
        });
    }

    categorize(temp_dir, &request.lib_name, &request.platforms)
}

fn which_downloader() -> Result<PathBuf, Error> {
    let path_var = std::env::var_os("PATH").ok_or(Error::DownloaderMissing)?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(DOWNLOADER_BIN);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    Err(Error::DownloaderMissing)
}

/// Walk `<tempDir>/<libName>`'s children and drop any platform directory the
/// caller did not request — the downloader returns every sanitizer variant
/// for a base key (spec §4.10). Non-platform children (`_shared` and other
/// shared files) are left in place for `Store::absorb_lib` to classify.
fn categorize(temp_dir: &Path, lib_name: &str, requested: &[Platform]) -> Result<DownloadResult, Error> {
    let lib_dir = temp_dir.join(lib_name);
    let mut cleaned_platforms = Vec::new();

    for entry in fs_err::read_dir(&lib_dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let path = entry.path();

        if name == GENERAL_PLATFORM_DIR || !entry.file_type()?.is_dir() || !Platform::is_platform_dir(&name) {
            continue;
        }

        let Some(canonical) = Platform::from_loose(&name) else { continue };
        if !requested.contains(&canonical) {
            fs_err::remove_dir_all(&path)?;
            cleaned_platforms.push(canonical);
        }
    }

    Ok(DownloadResult {
        temp_dir: temp_dir.to_path_buf(),
        lib_dir,
        cleaned_platforms,
    })
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize synthetic manifest: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("the `codepac` downloader binary could not be found on PATH")]
    DownloaderMissing,
    #[error("failed to spawn downloader: {0}")]
    Spawn(std::io::Error),
    #[error("downloader exited with code {code}: {stderr}")]
    DownloaderFailed { code: i32, stderr: String },
}
