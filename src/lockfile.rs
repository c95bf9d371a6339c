// SPDX-FileCopyrightText: Copyright © 2026 TanmiDock Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Advisory locks with stale-lock detection (spec §4.3).
//!
//! Two scopes share one implementation: a *file lock* over a specific path
//! (used inside Store ops that check-then-create) and the *global operation
//! lock* over `<home>/tanmi-dock.lock`, held for the lifetime of a mutating
//! command. Both are acquired with zero retries; a lock is considered stale
//! if its holder PID is no longer alive, or its mtime exceeds the stale
//! timeout, in which case it is reclaimed rather than waited on.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use nix::sys::signal::kill;
use nix::unistd::Pid;
use thiserror::Error;

use crate::environment::LOCK_STALE_TIMEOUT;

/// A held lock. Releases on drop (normal return, error unwind via `?`, or
/// process exit through a registered handler) by deleting the lock file.
#[derive(Debug)]
pub struct Lock {
    path: PathBuf,
    released: bool,
}

impl Lock {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock explicitly, surfacing any I/O error instead of
    /// swallowing it as `Drop` must.
    pub fn release(mut self) -> Result<(), Error> {
        self.do_release()
    }

    fn do_release(&mut self) -> Result<(), Error> {
        if !self.released {
            self.released = true;
            match fs::remove_file(&self.path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::Io(e)),
            }
        }
        Ok(())
    }
}

impl Drop for Lock {
    fn drop(&mut self) {
        let _ = self.do_release();
    }
}

/// Acquire an advisory lock at `path`. Zero retries: if a live, non-stale
/// holder is found, returns [`Error::Held`] immediately.
pub fn acquire(path: impl Into<PathBuf>) -> Result<Lock, Error> {
    let path = path.into();

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
        Ok(mut file) => {
            use std::io::Write;
            write!(file, "{}", std::process::id())?;
            return Ok(Lock { path, released: false });
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
        Err(e) => return Err(Error::Io(e)),
    }

    if is_stale(&path)? {
        // Best-effort reclaim: remove the stale file and take the lock.
        // A racing process could win between the remove and our create,
        // in which case we report `Held` rather than loop.
        fs::remove_file(&path)?;
        match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                use std::io::Write;
                write!(file, "{}", std::process::id())?;
                return Ok(Lock { path, released: false });
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Err(Error::Held),
            Err(e) => return Err(Error::Io(e)),
        }
    }

    Err(Error::Held)
}

fn is_stale(path: &Path) -> Result<bool, Error> {
    let metadata = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(Error::Io(e)),
    };

    if let Ok(modified) = metadata.modified() {
        if let Ok(age) = SystemTime::now().duration_since(modified) {
            if age > LOCK_STALE_TIMEOUT {
                return Ok(true);
            }
        }
    }

    let holder_pid = fs::read_to_string(path)
        .ok()
        .and_then(|contents| contents.trim().parse::<i32>().ok());

    match holder_pid {
        Some(pid) if pid > 0 => {
            let alive = kill(Pid::from_raw(pid), None).is_ok();
            Ok(!alive)
        }
        // No readable/valid PID recorded; treat the lock conservatively as
        // held (could be mid-write) rather than stale.
        _ => Ok(false),
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("another command is running, retry later")]
    Held,
    #[error("i/o error acquiring lock: {0}")]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod test {
    use super::*;
    use std::os::unix::fs::MetadataExt;

    #[test]
    fn acquire_then_release_allows_reacquire() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.lock");

        let lock = acquire(&path).unwrap();
        assert!(path.exists());
        lock.release().unwrap();
        assert!(!path.exists());

        let _second = acquire(&path).unwrap();
    }

    #[test]
    fn concurrent_acquire_is_held() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.lock");

        let _first = acquire(&path).unwrap();
        let second = acquire(&path);
        assert!(matches!(second, Err(Error::Held)));
    }

    #[test]
    fn stale_lock_with_dead_pid_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.lock");

        // A PID that is virtually guaranteed not to be alive.
        fs::write(&path, "999999").unwrap();

        let lock = acquire(&path).unwrap();
        assert_eq!(fs::read_to_string(&lock.path).unwrap(), std::process::id().to_string());
    }

    #[test]
    fn lock_file_records_own_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.lock");
        let lock = acquire(&path).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, std::process::id().to_string());
        let _ = lock.path.metadata().unwrap().mode();
    }
}
