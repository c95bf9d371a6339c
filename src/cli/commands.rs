// SPDX-FileCopyrightText: Copyright © 2026 TanmiDock Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Command handlers dispatched from [`super::run`]. Each mutating command
//! follows the same shape: resolve paths, acquire the global lock, open a
//! [`Transaction`], mutate the filesystem in plan order, then mutate the
//! Registry once in a single pass and save (spec §5).

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::classifier::{self, Status};
use crate::config::Config;
use crate::downloader::{self, DownloadRequest};
use crate::environment::MANIFEST_3RDPARTY_SUBDIR;
use crate::error::Error;
use crate::installation::{self, Installation};
use crate::integrity;
use crate::linker;
use crate::lockfile;
use crate::parser::{self, Manifest};
use crate::path_policy;
use crate::planner::{self, PlannedAction};
use crate::platform::{Platform, PlatformKey};
use crate::registry::{self, DependencyRef, Library, Project, Registry, StoreEntry};
use crate::signal::Cancellation;
use crate::store::Store;
use crate::transaction::{self, Operation, Transaction};

use super::report;
use super::ConfigAction;

fn require_initialized(installation: &Installation) -> Result<(), Error> {
    if !installation.is_initialized() {
        return Err(Error::NotInitialized);
    }
    Ok(())
}

fn load_config(installation: &Installation) -> Result<Config, Error> {
    Ok(Config::load(installation.config_path())?)
}

fn open_store(installation: &Installation, config: &Config) -> Store {
    Store::new(installation::resolve_store_path(&installation.home, &config.store_path))
}

fn resolve_project_path(path: Option<PathBuf>) -> Result<PathBuf, Error> {
    let raw = path.unwrap_or_else(|| PathBuf::from("."));
    std::fs::canonicalize(&raw).map_err(|e| Error::io(raw, e))
}

fn check_no_pending_transaction(installation: &Installation) -> Result<(), Error> {
    let pending = transaction::find_pending(&installation.transactions_dir())?;
    if let Some(tx) = pending.into_iter().next() {
        return Err(Error::TransactionPending(tx.id));
    }
    Ok(())
}

fn parse_platforms(args: &[String]) -> Result<Vec<Platform>, Error> {
    args.iter()
        .map(|raw| {
            Platform::from_cli_key(raw)
                .or_else(|| Platform::from_loose(raw))
                .ok_or_else(|| Error::UsageError(format!("unknown platform {raw:?}")))
        })
        .collect()
}

/// The path the linked dependency should resolve to inside the Store: a
/// single `_shared` symlink for General libraries, otherwise the first
/// requested platform's directory (informational for the transaction log;
/// multi-platform links fan out per-platform inside [`linker::link_multi_platform`]).
fn store_target(store: &Store, lib_name: &str, commit: &str, requested: &[Platform]) -> PathBuf {
    if store.is_general_lib(lib_name, commit) {
        store.shared_path(lib_name, commit)
    } else {
        store.platform_path(lib_name, commit, PlatformKey::Concrete(requested[0]))
    }
}

/// The set of per-entry `PlatformKey`s a dependency occupies in the
/// Registry: one `General` key for a general library, one `Concrete` key
/// per requested platform otherwise.
fn registry_keys_for(store: &Store, lib_name: &str, commit: &str, requested: &[Platform]) -> Vec<PlatformKey> {
    if store.is_general_lib(lib_name, commit) {
        vec![PlatformKey::General]
    } else {
        requested.iter().map(|p| PlatformKey::Concrete(*p)).collect()
    }
}

// -- init ---------------------------------------------------------------

pub async fn init(store_path: Option<String>, yes: bool) -> Result<(), Error> {
    let installation = Installation::discover();

    if installation.is_initialized() {
        println!("[info] tanmi-dock is already initialized at {:?}", installation.home);
        return Ok(());
    }

    installation.ensure_dirs_exist().map_err(|e| Error::io(installation.home.clone(), e))?;

    let store_path = store_path.unwrap_or_else(|| "store".to_string());
    let resolved_store = installation::resolve_store_path(&installation.home, &store_path);

    let check = path_policy::is_path_safe(&resolved_store);
    if !check.safe {
        if !yes {
            return Err(Error::PathUnsafe {
                path: resolved_store,
                reason: check.reason.unwrap_or_default(),
            });
        }
        log::warn!("store path {resolved_store:?} failed the safety check, proceeding because --yes was given");
    }

    fs_err::create_dir_all(&resolved_store).map_err(|e| Error::io(resolved_store.clone(), e))?;

    let config = Config::new(store_path);
    config.save(installation.config_path())?;

    let registry = Registry::load(installation.registry_path())?;
    registry.save(installation.registry_path())?;

    println!("[ok] initialized tanmi-dock at {:?}", installation.home);
    Ok(())
}

// -- link -----------------------------------------------------------------

enum ExecuteOutcome {
    Applied,
    SkippedNoDownload,
}

#[allow(clippy::too_many_arguments)]
async fn execute_action(
    action: &PlannedAction,
    repo: Option<&parser::Repo>,
    requested_platforms: &[Platform],
    manifest_vars: &std::collections::HashMap<String, String>,
    store: &Store,
    tx: &mut Transaction,
    transactions_dir: &Path,
    config: &Config,
    no_download: bool,
) -> Result<ExecuteOutcome, Error> {
    let dep = &action.dependency;
    let local = &action.local;
    let target = store_target(store, &dep.lib_name, &dep.commit, requested_platforms);

    match &action.status {
        Status::Linked => Ok(ExecuteOutcome::Applied),

        Status::Relink | Status::LinkNew => {
            tx.begin_operation(transactions_dir, Operation::Link { local: local.clone(), target: target.clone() })?;
            linker::link_library(local, store, &dep.lib_name, &dep.commit, requested_platforms)?;
            tx.complete_operation(transactions_dir)?;
            Ok(ExecuteOutcome::Applied)
        }

        Status::Replace => {
            tx.begin_operation(transactions_dir, Operation::Replace { local: local.clone(), target: target.clone(), backup: None })?;

            let backup = if requested_platforms.len() == 1 {
                linker::replace_with_link(local, &target, true)?
            } else {
                let backup = if local.is_dir() && !linker::is_symlink(local) {
                    let ts = chrono::Utc::now().timestamp();
                    let backup_path = local.with_extension(format!("backup.{ts}"));
                    fs_err::rename(local, &backup_path)?;
                    Some(backup_path)
                } else {
                    None
                };
                linker::link_library(local, store, &dep.lib_name, &dep.commit, requested_platforms)?;
                backup
            };

            tx.amend_last_operation(transactions_dir, Operation::Replace { local: local.clone(), target, backup })?;
            tx.complete_operation(transactions_dir)?;
            Ok(ExecuteOutcome::Applied)
        }

        Status::Absorb => {
            tx.begin_operation(transactions_dir, Operation::Move { source: local.clone(), target: target.clone(), cross_fs: false })?;
            store.absorb_lib(local, requested_platforms, &dep.lib_name, &dep.commit, None)?;
            if local.is_dir() {
                fs_err::remove_dir_all(local)?;
            }
            tx.complete_operation(transactions_dir)?;

            tx.begin_operation(transactions_dir, Operation::Link { local: local.clone(), target: target.clone() })?;
            linker::link_library(local, store, &dep.lib_name, &dep.commit, requested_platforms)?;
            tx.complete_operation(transactions_dir)?;
            Ok(ExecuteOutcome::Applied)
        }

        Status::Missing { missing } => {
            if no_download || !config.auto_download {
                return Ok(ExecuteOutcome::SkippedNoDownload);
            }

            let repo = repo.ok_or_else(|| Error::UsageError(format!("{} is not declared in the manifest", dep.lib_name)))?;

            let request = DownloadRequest {
                url: repo.url.clone(),
                commit: repo.commit.clone(),
                branch: repo.branch.clone(),
                lib_name: repo.dir.clone(),
                platforms: missing.clone(),
                sparse: repo.sparse.clone(),
                vars: manifest_vars.clone(),
            };

            let result = downloader::download_to_temp(
                &request,
                config.proxy.as_ref(),
                |line| log::debug!("codepac: {line}"),
                |temp_dir| {
                    let _ = tx.begin_operation(transactions_dir, Operation::Download { temp_dir: temp_dir.to_path_buf() });
                },
            )
            .await?;

            if !result.cleaned_platforms.is_empty() {
                log::info!(
                    "{} returned unrequested platform variant(s) {:?} for {}@{}, discarding",
                    crate::environment::DOWNLOADER_BIN,
                    result.cleaned_platforms,
                    dep.lib_name,
                    dep.commit
                );
            }
            store.absorb_lib(&result.lib_dir, missing, &dep.lib_name, &dep.commit, None)?;
            let _ = fs_err::remove_dir_all(&result.temp_dir);
            tx.complete_operation(transactions_dir)?;

            tx.begin_operation(transactions_dir, Operation::Link { local: local.clone(), target: target.clone() })?;
            linker::link_library(local, store, &dep.lib_name, &dep.commit, requested_platforms)?;
            tx.complete_operation(transactions_dir)?;
            Ok(ExecuteOutcome::Applied)
        }
    }
}

fn ensure_store_entry(registry: &mut Registry, store: &Store, lib_name: &str, commit: &str, key: PlatformKey) -> Result<(), Error> {
    if registry.get_library(lib_name, commit).is_none() {
        registry.add_library(Library {
            lib_name: lib_name.to_string(),
            commit: commit.to_string(),
            branch: String::new(),
            url: String::new(),
            platforms: Default::default(),
            size: 0,
            created_at: Utc::now(),
            last_access: Utc::now(),
            referenced_by: Vec::new(),
        });
    }

    let key_str = registry::store_key(lib_name, commit, key);
    if registry.get_store_by_key(&key_str).is_none() {
        let size = if key.is_general() {
            crate::store::fsops::dir_size(&store.shared_path(lib_name, commit)).unwrap_or(0)
        } else {
            store.get_size(lib_name, commit, key).unwrap_or(0)
        };
        registry.add_store(StoreEntry {
            lib_name: lib_name.to_string(),
            commit: commit.to_string(),
            platform: key,
            branch: String::new(),
            url: String::new(),
            size,
            used_by: Default::default(),
            unlinked_at: None,
            created_at: Utc::now(),
            last_access: Utc::now(),
        });
    }
    Ok(())
}

pub async fn link(
    path: Option<PathBuf>,
    platform: Vec<String>,
    config_args: Vec<String>,
    yes: bool,
    no_download: bool,
    dry_run: bool,
) -> Result<(), Error> {
    let installation = Installation::discover();
    require_initialized(&installation)?;
    let config = load_config(&installation)?;
    let mut registry = Registry::load(installation.registry_path())?;
    let store = open_store(&installation, &config);

    let project_path = resolve_project_path(path)?;
    let check = path_policy::is_path_safe(&project_path);
    if !check.safe && !yes {
        return Err(Error::PathUnsafe {
            path: project_path,
            reason: check.reason.unwrap_or_default(),
        });
    }

    let manifest_path =
        parser::discover_manifest(&project_path).ok_or_else(|| Error::UsageError(format!("no manifest found under {project_path:?}")))?;
    let base_manifest = Manifest::load(&manifest_path)?;
    let available_configs = parser::discover_optional_configs(&manifest_path);

    let existing_project = registry.get_project_by_path(&project_path).cloned();

    let selected_names: Vec<String> = if !config_args.is_empty() {
        for name in &config_args {
            if !available_configs.iter().any(|(n, _)| n == name) {
                return Err(Error::NestedConfigMissing(name.clone()));
            }
        }
        config_args
    } else if let Some(prior) = existing_project.as_ref().and_then(|p| p.optional_configs.clone()) {
        prior
    } else if available_configs.is_empty() {
        Vec::new()
    } else {
        return Err(Error::UsageError(format!(
            "{project_path:?} declares optional configs ({}); select with --config",
            available_configs.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>().join(", ")
        )));
    };

    let overlays = selected_names
        .iter()
        .map(|name| {
            let (_, overlay_path) = available_configs
                .iter()
                .find(|(n, _)| n == name)
                .ok_or_else(|| Error::NestedConfigMissing(name.clone()))?;
            Ok(Manifest::load(overlay_path)?)
        })
        .collect::<Result<Vec<Manifest>, Error>>()?;

    let manifest = parser::merge_manifests(base_manifest, overlays);

    let requested_platforms: Vec<Platform> = if !platform.is_empty() {
        parse_platforms(&platform)?
    } else if let Some(prior) = existing_project.as_ref().map(|p| p.platforms.clone()) {
        prior.into_iter().collect()
    } else {
        return Err(Error::UsageError(format!("{project_path:?} has no prior link; select a platform with --platform")));
    };

    if requested_platforms.is_empty() {
        return Err(Error::UsageError("at least one platform must be requested".to_string()));
    }

    let repos_by_dir: std::collections::HashMap<&str, &parser::Repo> = manifest.repos.common.iter().map(|r| (r.dir.as_str(), r)).collect();

    let actions: Vec<PlannedAction> = manifest
        .repos
        .common
        .iter()
        .map(|repo| {
            let dep = DependencyRef::new(&repo.dir, &repo.commit, requested_platforms[0]);
            let local = project_path.join(MANIFEST_3RDPARTY_SUBDIR).join(&repo.dir);
            let status = classifier::classify(&store, &local, &dep, &requested_platforms);
            PlannedAction { dependency: dep, local, status }
        })
        .collect();

    let planned = planner::plan(actions);

    if dry_run {
        report::print_plan(&planned);
        return Ok(());
    }

    check_no_pending_transaction(&installation)?;
    let lock = lockfile::acquire(installation.lock_path())?;

    let transactions_dir = installation.transactions_dir();
    let mut tx = Transaction::new(transaction::new_id(Utc::now(), &project_path), project_path.clone(), Utc::now());

    let cancellation = Cancellation::new();
    if cancellation.watch().is_err() {
        log::warn!("could not install signal handler, Ctrl-C will terminate immediately instead of stopping at a safe point");
    }

    let mut outcomes = Vec::with_capacity(planned.len());
    for action in &planned {
        if let Some(code) = crate::signal::exit_code_if_cancelled(&cancellation) {
            log::warn!("cancellation requested, stopping before the next mutation; re-run `check` to resolve the pending transaction");
            std::process::exit(code);
        }

        let repo = repos_by_dir.get(action.dependency.lib_name.as_str()).copied();
        let outcome = execute_action(action, repo, &requested_platforms, &manifest.vars, &store, &mut tx, &transactions_dir, &config, no_download).await?;
        outcomes.push(outcome);
    }

    let now = Utc::now();
    let platforms_set: HashSet<Platform> = requested_platforms.iter().copied().collect();

    let mut dependencies = Vec::new();
    let mut applied = 0usize;
    let mut skipped = 0usize;
    for (action, outcome) in planned.iter().zip(outcomes.iter()) {
        match outcome {
            ExecuteOutcome::Applied => {
                applied += 1;
                dependencies.push(DependencyRef::new(&action.dependency.lib_name, &action.dependency.commit, requested_platforms[0]));
            }
            ExecuteOutcome::SkippedNoDownload => skipped += 1,
        }
    }

    // A re-link can drop dependencies (removed from the manifest) or move a
    // `libName` to a new commit; either way the old `(libName, commit)` pair
    // is no longer declared, so its StoreEntry.usedBy must stop citing this
    // project (spec §8 seed scenario 3 "Upgrade", invariant 2 of §3.3).
    if let Some(existing) = &existing_project {
        let fp = existing.fingerprint();
        let new_keys: HashSet<(String, String)> = dependencies.iter().map(|d| (d.lib_name.clone(), d.commit.clone())).collect();
        for old_dep in &existing.dependencies {
            let pair = (old_dep.lib_name.clone(), old_dep.commit.clone());
            if !new_keys.contains(&pair) {
                for key in dependency_platform_keys(&store, old_dep, &existing.platforms) {
                    let key_str = registry::store_key(&old_dep.lib_name, &old_dep.commit, key);
                    registry.remove_store_reference(&key_str, &fp);
                }
            }
        }
    }

    let fingerprint = if let Some(existing) = &existing_project {
        let fp = existing.fingerprint();
        registry.update_project(&fp, |project| {
            project.last_linked = now;
            project.platforms = platforms_set.clone();
            project.dependencies = dependencies.clone();
            project.optional_configs = if selected_names.is_empty() { None } else { Some(selected_names.clone()) };
        })?;
        fp
    } else {
        registry.add_project(Project {
            path: project_path.clone(),
            config_path: manifest_path,
            last_linked: now,
            platforms: platforms_set,
            dependencies: dependencies.clone(),
            optional_configs: if selected_names.is_empty() { None } else { Some(selected_names) },
        })
    };

    for dep in &dependencies {
        for key in registry_keys_for(&store, &dep.lib_name, &dep.commit, &requested_platforms) {
            ensure_store_entry(&mut registry, &store, &dep.lib_name, &dep.commit, key)?;
            let key_str = registry::store_key(&dep.lib_name, &dep.commit, key);
            registry.add_store_reference(&key_str, &fingerprint)?;
        }
    }

    registry.save(installation.registry_path())?;
    tx.commit(&transactions_dir)?;
    lock.release()?;

    report::print_link_summary(&project_path, applied, skipped);
    Ok(())
}

// -- unlink ---------------------------------------------------------------

fn dependency_platform_keys(store: &Store, dep: &DependencyRef, project_platforms: &HashSet<Platform>) -> Vec<PlatformKey> {
    if store.is_general_lib(&dep.lib_name, &dep.commit) {
        vec![PlatformKey::General]
    } else {
        project_platforms.iter().map(|p| PlatformKey::Concrete(*p)).collect()
    }
}

pub async fn unlink(path: Option<PathBuf>, remove: bool) -> Result<(), Error> {
    let installation = Installation::discover();
    require_initialized(&installation)?;
    let config = load_config(&installation)?;
    let mut registry = Registry::load(installation.registry_path())?;
    let store = open_store(&installation, &config);

    let project_path = resolve_project_path(path)?;
    let project = registry
        .get_project_by_path(&project_path)
        .cloned()
        .ok_or_else(|| Error::UsageError(format!("{project_path:?} is not a linked project")))?;
    let fingerprint = project.fingerprint();

    check_no_pending_transaction(&installation)?;
    let lock = lockfile::acquire(installation.lock_path())?;

    let transactions_dir = installation.transactions_dir();
    let mut tx = Transaction::new(transaction::new_id(Utc::now(), &project_path), project_path.clone(), Utc::now());

    for dep in &project.dependencies {
        let local = project_path.join(MANIFEST_3RDPARTY_SUBDIR).join(&dep.lib_name);

        if linker::is_symlink(&local) {
            let restored_from = std::fs::read_link(&local).unwrap_or_else(|_| local.clone());
            tx.begin_operation(&transactions_dir, Operation::Unlink { local: local.clone(), restored_from })?;
            linker::restore_from_link(&local)?;
            tx.complete_operation(&transactions_dir)?;
        } else if local.is_dir() {
            tx.begin_operation(&transactions_dir, Operation::Unlink { local: local.clone(), restored_from: local.clone() })?;
            linker::restore_multi_platform(&local)?;
            tx.complete_operation(&transactions_dir)?;
        }

        for key in dependency_platform_keys(&store, dep, &project.platforms) {
            let key_str = registry::store_key(&dep.lib_name, &dep.commit, key);
            registry.remove_store_reference(&key_str, &fingerprint);
        }
    }

    registry.remove_project(&fingerprint)?;

    if remove {
        for dep in &project.dependencies {
            for key in dependency_platform_keys(&store, dep, &project.platforms) {
                let key_str = registry::store_key(&dep.lib_name, &dep.commit, key);
                let unreferenced = registry.get_store_by_key(&key_str).is_some_and(|e| e.is_unreferenced());
                if unreferenced {
                    store.remove(&dep.lib_name, &dep.commit, key)?;
                    registry.remove_store(&key_str);
                }
            }
        }
    }

    registry.save(installation.registry_path())?;
    tx.commit(&transactions_dir)?;
    lock.release()?;

    println!("[ok] unlinked {} dependencies from {}", project.dependencies.len(), project_path.display());
    Ok(())
}

// -- status -----------------------------------------------------------------

pub async fn status(path: Option<PathBuf>, all: bool, tree: bool, json: bool) -> Result<(), Error> {
    let installation = Installation::discover();
    require_initialized(&installation)?;
    let config = load_config(&installation)?;
    let registry = Registry::load(installation.registry_path())?;
    let store = open_store(&installation, &config);

    let statuses = if all {
        registry.list_projects().map(|project| report::build_project_status(&store, project)).collect::<Vec<_>>()
    } else {
        let project_path = resolve_project_path(path)?;
        let project = registry
            .get_project_by_path(&project_path)
            .ok_or_else(|| Error::UsageError(format!("{project_path:?} is not linked")))?;
        vec![report::build_project_status(&store, project)]
    };

    if json {
        report::print_json(&statuses);
    } else {
        report::print_human(&statuses, tree);
    }
    Ok(())
}

// -- config -----------------------------------------------------------------

pub async fn config(action: Option<ConfigAction>) -> Result<(), Error> {
    let installation = Installation::discover();
    require_initialized(&installation)?;
    let mut cfg = Config::load(installation.config_path())?;

    match action {
        None => {
            let serialized = serde_json::to_string_pretty(&cfg).map_err(crate::config::Error::from)?;
            println!("{serialized}");
        }
        Some(ConfigAction::Get { key }) => match cfg.get(&key) {
            Some(value) => println!("{value}"),
            None => return Err(Error::UsageError(format!("unknown config key {key:?}"))),
        },
        Some(ConfigAction::Set { key, value }) => {
            cfg.set(&key, &value)?;
            cfg.save(installation.config_path())?;
            println!("[ok] set {key} = {value}");
        }
    }
    Ok(())
}

// -- check / verify / repair -------------------------------------------------

pub async fn check(fix: bool, dry_run: bool, prune: bool, force: bool, json: bool) -> Result<(), Error> {
    let installation = Installation::discover();
    require_initialized(&installation)?;
    let config = load_config(&installation)?;
    let mut registry = Registry::load(installation.registry_path())?;
    let store = open_store(&installation, &config);

    let transactions_dir = installation.transactions_dir();
    let pending = transaction::find_pending(&transactions_dir)?;
    let will_fix = fix && !dry_run;

    if !pending.is_empty() {
        if will_fix {
            let lock = lockfile::acquire(installation.lock_path())?;
            for mut transaction in pending {
                if let Err(errors) = transaction.rollback(&transactions_dir) {
                    for e in errors {
                        log::warn!("rollback error for transaction {}: {e}", transaction.id);
                    }
                }
            }
            lock.release()?;
        } else {
            for transaction in &pending {
                println!(
                    "[warn] pending transaction {} for project {:?}; run `check --fix` to roll it back",
                    transaction.id, transaction.project_path
                );
            }
        }
    }

    let integrity_report = integrity::check(&registry, &store)?;

    if will_fix {
        let lock = lockfile::acquire(installation.lock_path())?;

        if force {
            for fingerprint in &integrity_report.invalid_projects {
                integrity::repair_invalid_project(&mut registry, fingerprint)?;
            }
        }
        for link in &integrity_report.dangling_links {
            integrity::repair_dangling_link(&mut registry, link)?;
        }
        for orphan in &integrity_report.orphan_libraries {
            if prune {
                integrity::repair_orphan_by_pruning(&store, orphan)?;
            } else {
                integrity::repair_orphan_by_registering(&mut registry, orphan)?;
            }
        }
        for stale in &integrity_report.stale_references {
            integrity::repair_stale_reference(&mut registry, stale);
        }

        registry.save(installation.registry_path())?;
        lock.release()?;
    }

    if json {
        report::print_integrity_json(&integrity_report);
    } else {
        report::print_integrity_human(&integrity_report, will_fix);
        if fix && dry_run {
            println!("[info] dry run: no changes applied");
        }
        if !force && !integrity_report.invalid_projects.is_empty() {
            println!("[info] {} invalid project(s) need --force to remove", integrity_report.invalid_projects.len());
        }
    }

    if !integrity_report.is_clean() && !will_fix {
        std::process::exit(crate::error::exit_code::GENERAL);
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::environment::HOME_ENV;
    use crate::platform::PlatformKey;

    fn write_manifest(project: &Path, commit: &str) {
        let manifest = serde_json::json!({
            "version": "1",
            "vars": {},
            "repos": {
                "common": [
                    {"url": "git@example.com:libX.git", "commit": commit, "branch": "main", "dir": "libX"}
                ]
            }
        });
        let subdir = project.join(MANIFEST_3RDPARTY_SUBDIR);
        fs_err::create_dir_all(&subdir).unwrap();
        fs_err::write(subdir.join("codepac-dep.json"), serde_json::to_string_pretty(&manifest).unwrap()).unwrap();
    }

    /// Seed scenario 3 ("Upgrade", spec §8): re-linking a project against a
    /// new commit of the same library must drop the old `(libName, commit)`
    /// StoreEntry's reference to the project, not just add a new one.
    #[tokio::test]
    async fn relinking_to_a_new_commit_clears_the_old_store_reference() {
        let home_dir = tempfile::tempdir().unwrap();
        let project_dir = tempfile::tempdir().unwrap();
        std::env::set_var(HOME_ENV, home_dir.path());

        let installation = Installation::discover();
        installation.ensure_dirs_exist().unwrap();

        let store_dir = home_dir.path().join("store");
        let config = Config::new(store_dir.to_string_lossy().into_owned());
        config.save(installation.config_path()).unwrap();

        let store = Store::new(store_dir.clone());
        fs_err::create_dir_all(store.platform_path("libX", "c1", PlatformKey::Concrete(Platform::MacOS))).unwrap();

        write_manifest(project_dir.path(), "c1");
        link(Some(project_dir.path().to_path_buf()), vec!["mac".to_string()], vec![], true, true, false)
            .await
            .unwrap();

        let project_path = std::fs::canonicalize(project_dir.path()).unwrap();
        let fingerprint = crate::path_policy::hash_path(&project_path);
        let c1_key = registry::store_key("libX", "c1", PlatformKey::Concrete(Platform::MacOS));
        let c2_key = registry::store_key("libX", "c2", PlatformKey::Concrete(Platform::MacOS));

        let registry = Registry::load(installation.registry_path()).unwrap();
        assert!(registry.get_store_by_key(&c1_key).unwrap().used_by.contains(&fingerprint));

        fs_err::create_dir_all(store.platform_path("libX", "c2", PlatformKey::Concrete(Platform::MacOS))).unwrap();
        write_manifest(project_dir.path(), "c2");
        link(Some(project_dir.path().to_path_buf()), vec!["mac".to_string()], vec![], true, true, false)
            .await
            .unwrap();

        let registry = Registry::load(installation.registry_path()).unwrap();
        let old_entry = registry.get_store_by_key(&c1_key).unwrap();
        assert!(!old_entry.used_by.contains(&fingerprint));
        assert!(old_entry.unlinked_at.is_some());
        assert!(registry.get_store_by_key(&c2_key).unwrap().used_by.contains(&fingerprint));

        std::env::remove_var(HOME_ENV);
    }
}
