// SPDX-FileCopyrightText: Copyright © 2026 TanmiDock Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Logging setup. Verbosity is driven by `-v`/`--debug` and `RUST_LOG`;
//! color by `NO_COLOR`/`FORCE_COLOR` (spec §6.3).

use std::io::Write;

use log::LevelFilter;

/// Initialize the global logger. `verbose` raises the default level from
/// `Info` to `Debug`; `quiet` lowers it to `Warn` instead, suppressing
/// `[info]` lines; `RUST_LOG`, when set, wins over both.
pub fn init(verbose: bool, quiet: bool) {
    let default_level = match (verbose, quiet) {
        (true, _) => LevelFilter::Debug,
        (false, true) => LevelFilter::Warn,
        (false, false) => LevelFilter::Info,
    };

    let mut builder = env_logger::Builder::new();
    builder.filter_level(default_level);

    if let Ok(spec) = std::env::var("RUST_LOG") {
        builder.parse_filters(&spec);
    }

    if std::env::var_os("NO_COLOR").is_some() {
        builder.write_style(env_logger::WriteStyle::Never);
    } else if std::env::var_os("FORCE_COLOR").is_some() {
        builder.write_style(env_logger::WriteStyle::Always);
    }

    builder.format(|buf, record| {
        let prefix = match record.level() {
            log::Level::Error => "[err]",
            log::Level::Warn => "[warn]",
            log::Level::Info => "[info]",
            log::Level::Debug | log::Level::Trace => "[debug]",
        };
        writeln!(buf, "{prefix} {}", record.args())
    });

    let _ = builder.try_init();
}

/// True when `TANMI_DOCK_TEST_MODE=true` is set (spec §6.3).
pub fn test_mode() -> bool {
    std::env::var(crate::environment::TEST_MODE_ENV)
        .map(|v| v == "true")
        .unwrap_or(false)
}
