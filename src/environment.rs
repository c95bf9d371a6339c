// SPDX-FileCopyrightText: Copyright © 2026 TanmiDock Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Process-wide constants. Kept in one place so tuning doesn't require
//! hunting through the modules that use them.

use std::time::Duration;

/// Name of the environment variable that overrides the default home.
pub const HOME_ENV: &str = "TANMI_DOCK_HOME";
/// Name of the environment variable that enables test-friendly behaviors.
pub const TEST_MODE_ENV: &str = "TANMI_DOCK_TEST_MODE";

/// Default basename for the home directory, relative to the user's home.
pub const DEFAULT_HOME_DIRNAME: &str = ".tanmi-dock";

/// General (platform-neutral) store sentinel directory name.
pub const GENERAL_PLATFORM_DIR: &str = "_shared";

/// Stale timeout for advisory locks (file lock and global lock).
pub const LOCK_STALE_TIMEOUT: Duration = Duration::from_secs(30);

/// Buffer size used when copying files during cross-device moves, 64KiB.
pub const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// The external downloader binary name.
pub const DOWNLOADER_BIN: &str = "codepac";

/// Default grace period, in days, before an unreferenced store entry is
/// considered eligible for cleanup by the `unused` strategy.
pub const DEFAULT_UNUSED_DAYS: u32 = 14;

/// Registry/config schema version written by this version of the tool.
pub const SCHEMA_VERSION: &str = "1.0";

/// Name of the project manifest file.
pub const MANIFEST_FILENAME: &str = "codepac-dep.json";

/// Relative path, under a project, of the preferred manifest location.
pub const MANIFEST_3RDPARTY_SUBDIR: &str = "3rdparty";
