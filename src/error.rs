// SPDX-FileCopyrightText: Copyright © 2026 TanmiDock Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Top-level error taxonomy (spec §7) and the exit-code mapping (spec §6.2).
//! Per-module errors (`registry::Error`, `store::Error`, ...) are folded in
//! via `#[from]`, the same way `cli::Error` aggregates subcommand errors in
//! the teacher.

use std::path::PathBuf;

use thiserror::Error;

/// Fixed process exit codes (spec §6.2).
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_INITIALIZED: i32 = 10;
    pub const LOCK_HELD: i32 = 11;
    pub const DATA_FORMAT: i32 = 65;
    pub const INPUT_NOT_FOUND: i32 = 66;
    pub const SERVICE_UNAVAILABLE: i32 = 69;
    pub const INTERNAL: i32 = 70;
    pub const OS_ERROR: i32 = 71;
    pub const CANNOT_CREATE: i32 = 73;
    pub const IO: i32 = 74;
    pub const PERMISSION: i32 = 77;
    pub const CONFIGURATION: i32 = 78;
    pub const SIGINT: i32 = 130;
    pub const SIGTERM: i32 = 143;
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("tanmi-dock has not been initialized in this home (run `init` first)")]
    NotInitialized,

    #[error("usage error: {0}")]
    UsageError(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("another command is running, retry later")]
    LockHeld,

    #[error("i/o error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("permission denied at {0:?}")]
    PermissionDenied(PathBuf),

    #[error("unsafe path {path:?}: {reason}")]
    PathUnsafe { path: PathBuf, reason: String },

    #[error("{lib_name}@{commit} ({platform}) is already in the store")]
    AlreadyInStore {
        lib_name: String,
        commit: String,
        platform: String,
    },

    #[error("commit mismatch: expected {expected}, found {actual}")]
    CommitMismatch { expected: String, actual: String },

    #[error("incompatible store layout version {0}")]
    IncompatibleStore(String),

    #[error("the `codepac` downloader binary could not be found on PATH")]
    DownloaderMissing,

    #[error("downloader exited with code {code}: {stderr}")]
    DownloaderFailed { code: i32, stderr: String },

    #[error("invalid manifest at {path:?}: {reason}")]
    ManifestInvalid { path: PathBuf, reason: String },

    #[error("optional config {0:?} was not found")]
    NestedConfigMissing(String),

    #[error("dangling link at {0:?}")]
    DanglingLink(PathBuf),

    #[error("a previous command left transaction {0} pending; re-run with `check` to resolve it")]
    TransactionPending(String),

    #[error(transparent)]
    Registry(#[from] crate::registry::Error),

    #[error(transparent)]
    Store(#[from] crate::store::Error),

    #[error(transparent)]
    Linker(#[from] crate::linker::Error),

    #[error(transparent)]
    Transaction(#[from] crate::transaction::Error),

    #[error(transparent)]
    Parser(#[from] crate::parser::Error),

    #[error(transparent)]
    Downloader(#[from] crate::downloader::Error),

    #[error(transparent)]
    Lockfile(#[from] crate::lockfile::Error),

    #[error(transparent)]
    Config(#[from] crate::config::Error),

    #[error(transparent)]
    Integrity(#[from] crate::integrity::Error),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Error {
        Error::Io { path: path.into(), source }
    }

    /// Map this error to the fixed exit code table (spec §6.2). Falls back
    /// to matching common I/O-error substrings the way the spec's "string
    /// mapping" describes, for errors that arrive pre-flattened (e.g. from
    /// a transitive `#[from] std::io::Error` deep in a module error enum).
    pub fn exit_code(&self) -> i32 {
        use exit_code::*;

        match self {
            Error::NotInitialized => NOT_INITIALIZED,
            Error::UsageError(_) => USAGE,
            Error::ConfigError(_) => CONFIGURATION,
            Error::LockHeld => LOCK_HELD,
            Error::Io { source, .. } => io_exit_code(source),
            Error::PermissionDenied(_) => PERMISSION,
            Error::PathUnsafe { .. } => CONFIGURATION,
            Error::AlreadyInStore { .. } => GENERAL,
            Error::CommitMismatch { .. } => GENERAL,
            Error::IncompatibleStore(_) => DATA_FORMAT,
            Error::DownloaderMissing => SERVICE_UNAVAILABLE,
            Error::DownloaderFailed { .. } => SERVICE_UNAVAILABLE,
            Error::ManifestInvalid { .. } => DATA_FORMAT,
            Error::NestedConfigMissing(_) => INPUT_NOT_FOUND,
            Error::DanglingLink(_) => GENERAL,
            Error::TransactionPending(_) => GENERAL,
            Error::Registry(_) => INTERNAL,
            Error::Store(_) => IO,
            Error::Linker(_) => IO,
            Error::Transaction(_) => IO,
            Error::Parser(_) => DATA_FORMAT,
            Error::Downloader(_) => SERVICE_UNAVAILABLE,
            Error::Lockfile(_) => LOCK_HELD,
            Error::Config(_) => CONFIGURATION,
            Error::Integrity(_) => INTERNAL,
        }
    }

    /// The `[ok]`/`[warn]`/`[err]`/`[info]` severity prefix (spec §7).
    pub fn prefix(&self) -> &'static str {
        "[err]"
    }
}

fn io_exit_code(err: &std::io::Error) -> i32 {
    use std::io::ErrorKind;
    match err.kind() {
        ErrorKind::PermissionDenied => exit_code::PERMISSION,
        ErrorKind::NotFound => exit_code::INPUT_NOT_FOUND,
        ErrorKind::AlreadyExists => exit_code::CANNOT_CREATE,
        _ => exit_code::IO,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn lock_held_maps_to_fixed_code() {
        assert_eq!(Error::LockHeld.exit_code(), 11);
    }

    #[test]
    fn not_initialized_maps_to_fixed_code() {
        assert_eq!(Error::NotInitialized.exit_code(), 10);
    }

    #[test]
    fn io_not_found_maps_to_input_not_found() {
        let err = Error::Io {
            path: PathBuf::from("/x"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "nope"),
        };
        assert_eq!(err.exit_code(), 66);
    }
}
