// SPDX-FileCopyrightText: Copyright © 2026 TanmiDock Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Manifest discovery and parsing (spec §4.8, §6.5). Manifests are plain
//! JSON; `sparse` is a tagged variant resolved at parse time, and `vars`
//! interpolation is a separate pass that fails loudly on unresolved
//! references, per spec §9's "dynamic config parsing" note.

mod vars;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::environment::MANIFEST_FILENAME;

pub use vars::interpolate;

/// `sparse` is either a literal mapping of base key to platform value list,
/// or a `${VAR}` reference resolved against the manifest's `vars` (spec
/// §4.8, §6.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Sparse {
    VarRef(String),
    Literal(HashMap<String, Vec<String>>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repo {
    pub url: String,
    pub commit: String,
    pub branch: String,
    pub dir: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sparse: Option<Sparse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub command: String,
    pub dir: String,
}

/// A parsed `codepac install ...` action command (spec §4.8).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallAction {
    pub libraries: Vec<String>,
    pub disable_action: bool,
    pub configdir: Option<String>,
}

impl Action {
    /// Parse `self.command`, which is expected to start with
    /// `codepac install ...`. The token list between `install` and
    /// `--configdir` is the library selection (empty means "all");
    /// `--disable_action` stops further nesting.
    pub fn parse_install(&self) -> Result<InstallAction, Error> {
        let mut tokens = self.command.split_whitespace();

        match (tokens.next(), tokens.next()) {
            (Some("codepac"), Some("install")) => {}
            _ => {
                return Err(Error::InvalidAction {
                    command: self.command.clone(),
                    reason: "expected `codepac install ...`".to_string(),
                })
            }
        }

        let mut libraries = Vec::new();
        let mut disable_action = false;
        let mut configdir = None;

        let mut rest: Vec<&str> = tokens.collect();
        let mut i = 0;
        while i < rest.len() {
            match rest[i] {
                "--disable_action" => {
                    disable_action = true;
                    i += 1;
                }
                "--configdir" => {
                    i += 1;
                    configdir = rest.get(i).map(|s| s.to_string());
                    i += 1;
                }
                token => {
                    libraries.push(token.to_string());
                    i += 1;
                }
            }
        }
        rest.clear();

        Ok(InstallAction { libraries, disable_action, configdir })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repos {
    pub common: Vec<Repo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actions {
    pub common: Vec<Action>,
}

/// Raw JSON shape of a manifest (spec §6.5), before `vars` interpolation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    #[serde(default)]
    pub vars: HashMap<String, String>,
    pub repos: Repos,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub actions: Option<Actions>,
}

impl Manifest {
    pub fn parse(contents: &str, path: &Path) -> Result<Manifest, Error> {
        let manifest: Manifest =
            serde_json::from_str(contents).map_err(|e| Error::Invalid { path: path.to_path_buf(), reason: e.to_string() })?;
        vars::check_resolvable(&manifest)?;
        Ok(manifest)
    }

    pub fn load(path: &Path) -> Result<Manifest, Error> {
        let contents = fs_err::read_to_string(path).map_err(|e| Error::Io(e.into()))?;
        Manifest::parse(&contents, path)
    }

    /// Resolve every `sparse` field, replacing `${VAR}` references with
    /// their value from `vars` (spec §9 "vars interpolation").
    pub fn resolve_sparse(&self) -> Result<Vec<(String, HashMap<String, Vec<String>>)>, Error> {
        let mut resolved = Vec::new();
        for repo in &self.repos.common {
            if let Some(sparse) = &repo.sparse {
                resolved.push((repo.dir.clone(), vars::resolve_sparse(sparse, &self.vars)?));
            }
        }
        Ok(resolved)
    }
}

/// Search `3rdparty/codepac-dep.json`, then `./codepac-dep.json`, relative
/// to `project_path` (spec §4.8).
pub fn discover_manifest(project_path: &Path) -> Option<PathBuf> {
    let nested = project_path.join(crate::environment::MANIFEST_3RDPARTY_SUBDIR).join(MANIFEST_FILENAME);
    if nested.is_file() {
        return Some(nested);
    }

    let flat = project_path.join(MANIFEST_FILENAME);
    if flat.is_file() {
        return Some(flat);
    }

    None
}

/// Sibling `codepac-dep-<name>.json` files next to `manifest_path`, where
/// `<name>` does not start with `.` (spec §4.8, §6.5).
pub fn discover_optional_configs(manifest_path: &Path) -> Vec<(String, PathBuf)> {
    let mut result = Vec::new();
    let Some(dir) = manifest_path.parent() else {
        return result;
    };
    let Ok(entries) = fs_err::read_dir(dir) else {
        return result;
    };

    let prefix = "codepac-dep-";
    let suffix = ".json";

    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(middle) = name.strip_prefix(prefix).and_then(|s| s.strip_suffix(suffix)) {
            if !middle.starts_with('.') && !middle.is_empty() {
                result.push((middle.to_string(), entry.path()));
            }
        }
    }

    result.sort_by(|a, b| a.0.cmp(&b.0));
    result
}

/// Merge a base manifest with a set of selected optional configs. When
/// multiple manifests declare the same `dir` (library name), the *later*
/// one in `overlays` wins, matching the deterministic last-wins rule in
/// spec §4.8.
pub fn merge_manifests(base: Manifest, overlays: impl IntoIterator<Item = Manifest>) -> Manifest {
    let mut by_dir: HashMap<String, Repo> = base.repos.common.into_iter().map(|r| (r.dir.clone(), r)).collect();
    let mut order: Vec<String> = by_dir.keys().cloned().collect();
    let mut vars = base.vars;
    let mut actions = base.actions.map(|a| a.common).unwrap_or_default();

    for overlay in overlays {
        for (k, v) in overlay.vars {
            vars.insert(k, v);
        }
        for repo in overlay.repos.common {
            if !by_dir.contains_key(&repo.dir) {
                order.push(repo.dir.clone());
            }
            by_dir.insert(repo.dir.clone(), repo);
        }
        if let Some(overlay_actions) = overlay.actions {
            actions.extend(overlay_actions.common);
        }
    }

    let common = order.into_iter().filter_map(|dir| by_dir.remove(&dir)).collect();

    Manifest {
        version: base.version,
        vars,
        repos: Repos { common },
        actions: if actions.is_empty() { None } else { Some(Actions { common: actions }) },
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("could not read manifest: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid manifest at {path:?}: {reason}")]
    Invalid { path: PathBuf, reason: String },
    #[error("invalid action {command:?}: {reason}")]
    InvalidAction { command: String, reason: String },
    #[error("unresolved variable reference {0:?} in manifest")]
    UnresolvedVar(String),
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_json() -> &'static str {
        r#"{
            "version": "1",
            "vars": {"SPARSE_SET": "default"},
            "repos": {"common": [
                {"url": "git@example.com:lib.git", "commit": "abc123", "branch": "main", "dir": "libA", "sparse": "${SPARSE_SET}"}
            ]},
            "actions": {"common": [
                {"command": "codepac install libB libC --configdir ./cfg", "dir": "libA"}
            ]}
        }"#
    }

    #[test]
    fn parses_manifest_with_var_sparse_reference() {
        let manifest = Manifest::parse(sample_json(), Path::new("manifest.json")).unwrap();
        assert_eq!(manifest.repos.common.len(), 1);
        assert!(matches!(manifest.repos.common[0].sparse, Some(Sparse::VarRef(_))));
    }

    #[test]
    fn unresolved_var_reference_fails_loudly() {
        let json = r#"{
            "version": "1",
            "repos": {"common": [
                {"url": "u", "commit": "c", "branch": "b", "dir": "d", "sparse": "${MISSING}"}
            ]}
        }"#;
        let err = Manifest::parse(json, Path::new("m.json")).unwrap_err();
        assert!(matches!(err, Error::UnresolvedVar(_)));
    }

    #[test]
    fn parse_install_action_extracts_libraries_and_configdir() {
        let action = Action { command: "codepac install libB libC --configdir ./cfg".to_string(), dir: "libA".to_string() };
        let parsed = action.parse_install().unwrap();
        assert_eq!(parsed.libraries, vec!["libB".to_string(), "libC".to_string()]);
        assert_eq!(parsed.configdir, Some("./cfg".to_string()));
        assert!(!parsed.disable_action);
    }

    #[test]
    fn parse_install_action_honors_disable_action() {
        let action = Action { command: "codepac install --disable_action".to_string(), dir: "libA".to_string() };
        let parsed = action.parse_install().unwrap();
        assert!(parsed.disable_action);
        assert!(parsed.libraries.is_empty());
    }

    #[test]
    fn discover_optional_configs_excludes_dotfiles_and_sorts() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("codepac-dep.json"), "{}").unwrap();
        std::fs::write(tmp.path().join("codepac-dep-zeta.json"), "{}").unwrap();
        std::fs::write(tmp.path().join("codepac-dep-alpha.json"), "{}").unwrap();
        std::fs::write(tmp.path().join("codepac-dep-.hidden.json"), "{}").unwrap();

        let manifest_path = tmp.path().join("codepac-dep.json");
        let configs = discover_optional_configs(&manifest_path);

        assert_eq!(configs.iter().map(|(n, _)| n.clone()).collect::<Vec<_>>(), vec!["alpha", "zeta"]);
    }

    #[test]
    fn merge_manifests_last_wins_on_duplicate_dir() {
        let base = Manifest {
            version: "1".to_string(),
            vars: HashMap::new(),
            repos: Repos {
                common: vec![Repo { url: "base".to_string(), commit: "c1".to_string(), branch: "main".to_string(), dir: "libA".to_string(), sparse: None }],
            },
            actions: None,
        };
        let overlay = Manifest {
            version: "1".to_string(),
            vars: HashMap::new(),
            repos: Repos {
                common: vec![Repo { url: "overlay".to_string(), commit: "c2".to_string(), branch: "main".to_string(), dir: "libA".to_string(), sparse: None }],
            },
            actions: None,
        };

        let merged = merge_manifests(base, vec![overlay]);
        assert_eq!(merged.repos.common.len(), 1);
        assert_eq!(merged.repos.common[0].url, "overlay");
        assert_eq!(merged.repos.common[0].commit, "c2");
    }
}
