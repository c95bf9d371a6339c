// SPDX-FileCopyrightText: Copyright © 2026 TanmiDock Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Command-line surface (spec §6.1): argument parsing via `clap`'s derive
//! API, dispatch to [`commands`], and the human/JSON status reporters
//! (SPEC_FULL §4.14).

mod commands;
mod report;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::error::Error;

#[derive(Parser)]
#[command(name = "tanmi-dock", version, about = "Content-addressed dependency store and linker for native projects")]
pub struct Cli {
    /// Raise log verbosity to debug.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress `[info]` lines.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create config.json, an empty registry.json, and the Store dir.
    Init {
        #[arg(long = "store-path")]
        store_path: Option<String>,
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Link a project's declared dependencies, downloading as needed.
    Link {
        path: Option<PathBuf>,
        #[arg(short = 'p', long = "platform")]
        platform: Vec<String>,
        #[arg(long = "config")]
        config: Vec<String>,
        #[arg(long)]
        yes: bool,
        #[arg(long = "no-download")]
        no_download: bool,
        #[arg(long = "dry-run")]
        dry_run: bool,
    },
    /// Restore a project's linked dependencies to real directories.
    Unlink {
        path: Option<PathBuf>,
        #[arg(long)]
        remove: bool,
    },
    /// Report the link status of a project's dependencies.
    Status {
        path: Option<PathBuf>,
        #[arg(long)]
        all: bool,
        #[arg(long)]
        tree: bool,
        #[arg(long)]
        json: bool,
    },
    /// Read or write a config.json value.
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
    /// Consistency check, union of legacy verify/repair.
    Check {
        #[arg(long)]
        fix: bool,
        #[arg(long = "dry-run")]
        dry_run: bool,
        #[arg(long)]
        prune: bool,
        #[arg(long)]
        force: bool,
        #[arg(long)]
        json: bool,
    },
    /// Legacy alias: `check` without `--fix`.
    Verify {
        #[arg(long)]
        json: bool,
    },
    /// Legacy alias: `check --fix`.
    Repair {
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    Get { key: String },
    Set { key: String, value: String },
}

/// Whether `command` mutates Registry/Store and therefore needs the global
/// lock (spec §5).
pub fn is_mutating(command: &Command) -> bool {
    matches!(
        command,
        Command::Init { .. } | Command::Link { .. } | Command::Unlink { .. } | Command::Check { fix: true, .. } | Command::Repair { .. }
    )
}

pub async fn run(cli: Cli) -> Result<(), Error> {
    match cli.command {
        Command::Init { store_path, yes } => commands::init(store_path, yes).await,
        Command::Link { path, platform, config, yes, no_download, dry_run } => {
            commands::link(path, platform, config, yes, no_download, dry_run).await
        }
        Command::Unlink { path, remove } => commands::unlink(path, remove).await,
        Command::Status { path, all, tree, json } => commands::status(path, all, tree, json).await,
        Command::Config { action } => commands::config(action).await,
        Command::Check { fix, dry_run, prune, force, json } => commands::check(fix, dry_run, prune, force, json).await,
        Command::Verify { json } => commands::check(false, true, false, false, json).await,
        Command::Repair { force } => commands::check(true, false, false, force, false).await,
    }
}
