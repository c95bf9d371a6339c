// SPDX-FileCopyrightText: Copyright © 2026 TanmiDock Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! SIGINT/SIGTERM observation at suspension points (spec §5 "Cancellation").
//!
//! Commands poll [`Cancellation::requested`] between mutating steps; on a
//! hit they stop before the next mutation and let the transaction remain
//! pending, matching the documented crash-recovery story.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

/// Shared flag flipped by the signal-watching task.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Spawn a task that sets the flag on SIGINT or SIGTERM and returns the
    /// exit code the caller should use if it decides to abort immediately.
    pub fn watch(&self) -> Result<(), Error> {
        let flag = self.0.clone();
        tokio::spawn(async move {
            let mut sigint = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()) {
                Ok(s) => s,
                Err(_) => return,
            };
            let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => return,
            };
            tokio::select! {
                _ = sigint.recv() => flag.store(true, Ordering::SeqCst),
                _ = sigterm.recv() => flag.store(true, Ordering::SeqCst),
            }
        });
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to install signal handler")]
    Install,
}

/// Check `cancellation` and return the appropriate exit code if a signal was
/// observed; otherwise `None`, meaning the caller should proceed.
pub fn exit_code_if_cancelled(cancellation: &Cancellation) -> Option<i32> {
    if cancellation.requested() {
        Some(crate::error::exit_code::SIGINT)
    } else {
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cancellation_starts_unrequested() {
        let c = Cancellation::new();
        assert!(!c.requested());
    }

    #[test]
    fn request_flips_the_flag() {
        let c = Cancellation::new();
        c.request();
        assert!(c.requested());
        assert_eq!(exit_code_if_cancelled(&c), Some(130));
    }
}
