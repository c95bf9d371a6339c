// SPDX-FileCopyrightText: Copyright © 2026 TanmiDock Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Write-ahead transaction log for crash-safe, reversible filesystem
//! operations (spec §4.7). Each mutating command appends an `Operation`
//! before performing it, so a crash mid-operation leaves a log entry
//! `findPending` can pick up and roll back on the next run.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::linker;
use crate::path_policy;

/// A single reversible filesystem action recorded in a transaction
/// (spec §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Operation {
    /// A symlink (or multi-platform directory) was created at `local`.
    Link { local: PathBuf, target: PathBuf },
    /// A symlink at `local` was removed, restoring a real directory.
    Unlink { local: PathBuf, restored_from: PathBuf },
    /// Content was moved from `source` into the store at `target`.
    Move { source: PathBuf, target: PathBuf, cross_fs: bool },
    /// `local` was replaced with a link; `backup`, if any, holds the
    /// displaced directory.
    Replace { local: PathBuf, target: PathBuf, backup: Option<PathBuf> },
    /// Dependencies were downloaded into a temporary directory.
    Download { temp_dir: PathBuf },
}

impl Operation {
    /// Whether this operation completed before the crash/interruption. A
    /// pending transaction log only ever contains operations appended
    /// right before they were attempted; `completed` is flipped to `true`
    /// immediately after the underlying filesystem call succeeds.
    fn rollback(&self) -> Result<(), Error> {
        match self {
            Operation::Link { local, .. } => {
                if linker::is_symlink(local) {
                    fs::remove_file(local)?;
                }
                Ok(())
            }
            Operation::Unlink { local, restored_from } => {
                if !local.exists() {
                    linker::link_general(local, restored_from).map_err(Error::Linker)?;
                }
                Ok(())
            }
            Operation::Move { source, target, cross_fs } => {
                if target.exists() && !source.exists() {
                    if *cross_fs {
                        crate::store::fsops::copy_recursive(target, source, None)?;
                    } else {
                        fs::rename(target, source)?;
                    }
                }
                Ok(())
            }
            Operation::Replace { local, target, backup } => {
                if linker::is_correct_link(local, target) {
                    fs::remove_file(local)?;
                }
                if let Some(backup) = backup {
                    if backup.exists() && !local.exists() {
                        fs::rename(backup, local)?;
                    }
                }
                Ok(())
            }
            Operation::Download { temp_dir } => {
                if temp_dir.is_dir() {
                    fs::remove_dir_all(temp_dir)?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Completed,
    RolledBack,
}

/// A transaction log, one file per in-flight mutating command
/// (spec §4.7, §5 ordering guarantee).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    #[serde(rename = "startTime")]
    pub start_time: DateTime<Utc>,
    #[serde(rename = "projectPath")]
    pub project_path: PathBuf,
    pub status: Status,
    pub operations: Vec<OperationRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRecord {
    pub operation: Operation,
    pub completed: bool,
}

impl Transaction {
    pub fn new(id: impl Into<String>, project_path: impl Into<PathBuf>, now: DateTime<Utc>) -> Self {
        Transaction {
            id: id.into(),
            start_time: now,
            project_path: project_path.into(),
            status: Status::Pending,
            operations: Vec::new(),
        }
    }

    pub fn log_path(&self, transactions_dir: &Path) -> PathBuf {
        transactions_dir.join(format!("{}.json", self.id))
    }

    /// Append `operation` to the in-memory log and persist it, marked
    /// not-yet-completed, *before* the caller attempts the underlying
    /// filesystem action (spec §5: log before you act).
    pub fn begin_operation(&mut self, transactions_dir: &Path, operation: Operation) -> Result<(), Error> {
        self.operations.push(OperationRecord { operation, completed: false });
        self.persist(transactions_dir)
    }

    /// Mark the most recently appended operation as completed and persist.
    pub fn complete_operation(&mut self, transactions_dir: &Path) -> Result<(), Error> {
        if let Some(last) = self.operations.last_mut() {
            last.completed = true;
        }
        self.persist(transactions_dir)
    }

    /// Replace the most recently appended operation's payload, leaving its
    /// `completed` flag untouched. Used when the final shape of an operation
    /// (e.g. the backup path `replace_with_link` picks) is only known once
    /// the underlying call returns.
    pub fn amend_last_operation(&mut self, transactions_dir: &Path, operation: Operation) -> Result<(), Error> {
        if let Some(last) = self.operations.last_mut() {
            last.operation = operation;
        }
        self.persist(transactions_dir)
    }

    fn persist(&self, transactions_dir: &Path) -> Result<(), Error> {
        fs::create_dir_all(transactions_dir)?;
        let path = self.log_path(transactions_dir);
        let tmp_path = path.with_extension("json.tmp");

        let serialized = serde_json::to_string_pretty(self)?;
        {
            use std::io::Write;
            let mut file = File::create(&tmp_path)?;
            file.write_all(serialized.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    /// Walk operations in reverse, skipping any that never completed
    /// (they never touched the filesystem), collecting errors rather than
    /// stopping at the first one so a best-effort rollback still undoes
    /// everything it can (spec §4.7).
    pub fn rollback(&mut self, transactions_dir: &Path) -> Result<(), Vec<Error>> {
        let mut errors = Vec::new();

        for record in self.operations.iter().rev() {
            if !record.completed {
                continue;
            }
            if let Err(e) = record.operation.rollback() {
                errors.push(e);
            }
        }

        self.status = Status::RolledBack;
        if let Err(e) = self.persist(transactions_dir) {
            errors.push(e);
        }

        if errors.is_empty() {
            let _ = fs::remove_file(self.log_path(transactions_dir));
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Mark the transaction done and delete its log file (spec §4.7).
    pub fn commit(mut self, transactions_dir: &Path) -> Result<(), Error> {
        self.status = Status::Completed;
        let path = self.log_path(transactions_dir);
        let _ = fs::remove_file(&path);
        Ok(())
    }
}

/// Generate a transaction id from the current time and the project path's
/// fingerprint, so concurrent transactions against different projects
/// never collide.
pub fn new_id(now: DateTime<Utc>, project_path: &Path) -> String {
    format!("{}-{}", now.timestamp_millis(), path_policy::hash_path(project_path))
}

/// Scan `<home>/transactions/` for logs left behind by an interrupted run
/// (spec §4.7 `findPending`).
pub fn find_pending(transactions_dir: &Path) -> Result<Vec<Transaction>, Error> {
    let mut pending = Vec::new();

    if !transactions_dir.is_dir() {
        return Ok(pending);
    }

    for entry in fs::read_dir(transactions_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }

        let file = File::open(&path)?;
        let transaction: Transaction = match serde_json::from_reader(file) {
            Ok(t) => t,
            Err(_) => continue,
        };

        if transaction.status == Status::Pending {
            pending.push(transaction);
        }
    }

    pending.sort_by(|a, b| a.start_time.cmp(&b.start_time));
    Ok(pending)
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to serialize transaction log: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("linker error during rollback: {0}")]
    Linker(#[from] linker::Error),
}

#[cfg(test)]
mod test {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc)
    }

    #[test]
    fn begin_and_complete_operation_persists_log() {
        let tmp = tempfile::tempdir().unwrap();
        let transactions_dir = tmp.path().join("transactions");

        let mut transaction = Transaction::new("tx1", "/project", now());
        transaction
            .begin_operation(
                &transactions_dir,
                Operation::Download { temp_dir: tmp.path().join("tmp-download") },
            )
            .unwrap();
        transaction.complete_operation(&transactions_dir).unwrap();

        let log_path = transaction.log_path(&transactions_dir);
        assert!(log_path.is_file());

        let reloaded: Transaction = serde_json::from_reader(File::open(&log_path).unwrap()).unwrap();
        assert_eq!(reloaded.operations.len(), 1);
        assert!(reloaded.operations[0].completed);
    }

    #[test]
    fn rollback_reverses_completed_move_and_skips_uncompleted() {
        let tmp = tempfile::tempdir().unwrap();
        let transactions_dir = tmp.path().join("transactions");

        let source = tmp.path().join("source");
        let target = tmp.path().join("target");
        std::fs::write(&source, "x").unwrap();
        std::fs::rename(&source, &target).unwrap();

        let mut transaction = Transaction::new("tx2", "/project", now());
        transaction
            .begin_operation(
                &transactions_dir,
                Operation::Move { source: source.clone(), target: target.clone(), cross_fs: false },
            )
            .unwrap();
        transaction.complete_operation(&transactions_dir).unwrap();

        transaction
            .begin_operation(
                &transactions_dir,
                Operation::Download { temp_dir: tmp.path().join("never-finished") },
            )
            .unwrap();

        transaction.rollback(&transactions_dir).unwrap();

        assert!(source.is_file());
        assert!(!target.exists());
        assert!(!transaction.log_path(&transactions_dir).exists());
    }

    #[test]
    fn commit_deletes_log_file() {
        let tmp = tempfile::tempdir().unwrap();
        let transactions_dir = tmp.path().join("transactions");

        let mut transaction = Transaction::new("tx3", "/project", now());
        transaction
            .begin_operation(&transactions_dir, Operation::Download { temp_dir: tmp.path().join("d") })
            .unwrap();
        transaction.complete_operation(&transactions_dir).unwrap();

        let log_path = transaction.log_path(&transactions_dir);
        transaction.commit(&transactions_dir).unwrap();

        assert!(!log_path.exists());
    }

    #[test]
    fn find_pending_returns_only_pending_status_sorted_by_start_time() {
        let tmp = tempfile::tempdir().unwrap();
        let transactions_dir = tmp.path().join("transactions");

        let mut older = Transaction::new("old", "/project", now());
        older.begin_operation(&transactions_dir, Operation::Download { temp_dir: tmp.path().join("a") }).unwrap();

        let later_time = now() + chrono::Duration::seconds(10);
        let mut newer = Transaction::new("new", "/project", later_time);
        newer.begin_operation(&transactions_dir, Operation::Download { temp_dir: tmp.path().join("b") }).unwrap();

        let mut done = Transaction::new("done", "/project", now());
        done.begin_operation(&transactions_dir, Operation::Download { temp_dir: tmp.path().join("c") }).unwrap();
        done.complete_operation(&transactions_dir).unwrap();
        done.commit(&transactions_dir).unwrap();

        let pending = find_pending(&transactions_dir).unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, "old");
        assert_eq!(pending[1].id, "new");
    }
}
