// SPDX-FileCopyrightText: Copyright © 2026 TanmiDock Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Cross-device-safe move primitives and the rollback stack absorb uses
//! (spec §4.5 steps 2, 5-7). Grounded on the same `rename`-then-fall-back-
//! to-copy pattern used throughout the corpus for CAS-style stores.

use std::io;
use std::path::{Path, PathBuf};

use fs_err as fs;

/// Progress callback invoked with cumulative bytes copied, used only on the
/// cross-device copy fallback (spec §4.5 step 2 "size-based progress").
pub type ProgressFn = dyn Fn(u64) + Send + Sync;

pub struct MoveOutcome {
    pub cross_fs: bool,
}

/// Move `source` to `target` via `rename`, falling back to a recursive copy
/// on `EXDEV` (cross-device). On the copy path the source is left in place;
/// callers defer its deletion until the overall operation succeeds.
pub fn move_or_copy(source: &Path, target: &Path, progress: Option<&ProgressFn>) -> io::Result<MoveOutcome> {
    match fs::rename(source, target) {
        Ok(()) => Ok(MoveOutcome { cross_fs: false }),
        Err(e) if e.raw_os_error() == Some(nix::errno::Errno::EXDEV as i32) => {
            copy_recursive(source, target, progress)?;
            Ok(MoveOutcome { cross_fs: true })
        }
        Err(e) => Err(e),
    }
}

/// Pure recursive copy, used where the source must survive (restoring a
/// link by copying the store's content back out, rather than moving it).
pub(crate) fn copy_recursive(source: &Path, target: &Path, progress: Option<&ProgressFn>) -> io::Result<()> {
    let metadata = std::fs::symlink_metadata(source)?;

    if metadata.is_dir() {
        fs::create_dir_all(target)?;
        for entry in fs::read_dir(source)? {
            let entry = entry?;
            copy_recursive(&entry.path(), &target.join(entry.file_name()), progress)?;
        }
    } else if metadata.file_type().is_symlink() {
        let link_target = fs::read_link(source)?;
        #[cfg(unix)]
        std::os::unix::fs::symlink(&link_target, target)?;
    } else {
        let bytes = fs::copy(source, target)?;
        if let Some(cb) = progress {
            cb(bytes);
        }
    }

    Ok(())
}

pub fn dir_size(path: &Path) -> io::Result<u64> {
    let mut total = 0u64;
    for entry in walkdir::WalkDir::new(path).into_iter().filter_map(|e| e.ok()) {
        if entry.file_type().is_file() {
            total += entry.metadata().map(|m| m.len()).unwrap_or(0);
        }
    }
    Ok(total)
}

/// One successful move recorded for possible rollback (spec §4.5 step 5).
pub struct RollbackOp {
    pub source: PathBuf,
    pub target: PathBuf,
    pub cross_fs: bool,
}

#[derive(Default)]
pub struct RollbackStack {
    ops: Vec<RollbackOp>,
    /// Cross-device sources kept alive until the whole absorb succeeds.
    deferred_deletes: Vec<PathBuf>,
}

impl RollbackStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: RollbackOp) {
        if op.cross_fs {
            self.deferred_deletes.push(op.source.clone());
        }
        self.ops.push(op);
    }

    /// Walk operations in reverse, best-effort: `cross_fs` ⇒ delete the
    /// target; otherwise rename the target back to the source.
    pub fn unwind(&mut self) {
        for op in self.ops.drain(..).rev() {
            if op.cross_fs {
                let _ = fs::remove_dir_all(&op.target).or_else(|_| fs::remove_file(&op.target));
            } else {
                let _ = fs::rename(&op.target, &op.source);
            }
        }
        self.deferred_deletes.clear();
    }

    /// On overall success, delete deferred cross-device source paths
    /// (spec §4.5 step 7).
    pub fn commit_deferred_deletes(&mut self) {
        for path in self.deferred_deletes.drain(..) {
            let _ = fs::remove_dir_all(&path).or_else(|_| fs::remove_file(&path));
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn dir_size_sums_file_bytes() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a"), "1234").unwrap();
        std::fs::create_dir(tmp.path().join("sub")).unwrap();
        std::fs::write(tmp.path().join("sub").join("b"), "12345").unwrap();

        assert_eq!(dir_size(tmp.path()).unwrap(), 9);
    }

    #[test]
    fn move_or_copy_same_fs_uses_rename() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("source");
        std::fs::write(&source, "x").unwrap();
        let target = tmp.path().join("target");

        let outcome = move_or_copy(&source, &target, None).unwrap();
        assert!(!outcome.cross_fs);
        assert!(!source.exists());
        assert!(target.exists());
    }

    #[test]
    fn rollback_stack_restores_same_fs_moves() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("source");
        std::fs::write(&source, "x").unwrap();
        let target = tmp.path().join("target");

        let mut stack = RollbackStack::new();
        move_or_copy(&source, &target, None).unwrap();
        stack.push(RollbackOp {
            source: source.clone(),
            target: target.clone(),
            cross_fs: false,
        });

        stack.unwind();
        assert!(source.exists());
        assert!(!target.exists());
    }
}
