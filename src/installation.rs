// SPDX-FileCopyrightText: Copyright © 2026 TanmiDock Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Resolves the tool's home directory (spec §6.3 `TANMI_DOCK_HOME`, §3.2 the
//! on-disk layout under `<home>/`) and exposes path helpers to the rest of
//! the crate, the same role the teacher's `installation.rs` plays for a
//! system root.

use std::path::{Path, PathBuf};

use fs_err as fs;

use crate::environment::{DEFAULT_HOME_DIRNAME, HOME_ENV};

#[derive(Debug, Clone)]
pub struct Installation {
    pub home: PathBuf,
}

impl Installation {
    /// Resolve the home directory from `TANMI_DOCK_HOME`, falling back to
    /// `~/.tanmi-dock`.
    pub fn discover() -> Self {
        let home = std::env::var_os(HOME_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(default_home);

        Self { home }
    }

    pub fn config_path(&self) -> PathBuf {
        self.home.join("config.json")
    }

    pub fn registry_path(&self) -> PathBuf {
        self.home.join("registry.json")
    }

    pub fn transactions_dir(&self) -> PathBuf {
        self.home.join("transactions")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.home.join("tanmi-dock.lock")
    }

    pub fn update_check_path(&self) -> PathBuf {
        self.home.join("update-check.json")
    }

    /// Whether `init` has already been run: the config file exists.
    pub fn is_initialized(&self) -> bool {
        self.config_path().is_file()
    }

    /// Create `<home>/` and `<home>/transactions/`, idempotently.
    pub fn ensure_dirs_exist(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.home)?;
        fs::create_dir_all(self.transactions_dir())?;
        Ok(())
    }
}

fn default_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_HOME_DIRNAME)
}

/// Join a possibly-relative store path against `home`, expanding `~`.
pub fn resolve_store_path(home: &Path, configured: &str) -> PathBuf {
    let expanded = crate::path_policy::expand_home(configured);
    if expanded.is_absolute() {
        expanded
    } else {
        home.join(expanded)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn env_override_wins() {
        std::env::set_var(HOME_ENV, "/tmp/tanmi-dock-test-home");
        let installation = Installation::discover();
        assert_eq!(installation.home, PathBuf::from("/tmp/tanmi-dock-test-home"));
        std::env::remove_var(HOME_ENV);
    }

    #[test]
    fn default_home_ends_with_dirname() {
        std::env::remove_var(HOME_ENV);
        let installation = Installation::discover();
        assert!(installation.home.ends_with(DEFAULT_HOME_DIRNAME));
    }
}
