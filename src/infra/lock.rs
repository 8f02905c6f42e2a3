//! Project lock: keeps two pipeline runs from racing on one project.
//!
//! The lock file is created at start, advisory-locked for the whole run and
//! removed at exit. A crashed run leaves the file behind but not the OS
//! lock, so the next run reclaims it instead of treating it as held.

use std::{
    fs::{self, OpenOptions},
    io::{Seek, SeekFrom, Write},
    path::Path,
};

use anyhow::{Context, Result};
use fd_lock::RwLock;
use tracing::{debug, warn};

use crate::error::PipelineError;

/// Run `f` while holding the lock at `lock_path`.
pub fn with_project_lock<T>(lock_path: &Path, f: impl FnOnce() -> Result<T>) -> Result<T> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(lock_path)
        .with_context(|| format!("open lock file: {}", lock_path.display()))?;

    let mut lock = RwLock::new(file);
    let out = {
        let mut guard = match lock.try_write() {
            Ok(g) => g,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                return Err(PipelineError::Locked(lock_path.to_path_buf()).into());
            }
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("acquire lock: {}", lock_path.display())));
            }
        };

        // Owner info for humans inspecting a stuck lock
        guard.set_len(0).ok();
        guard.seek(SeekFrom::Start(0)).ok();
        writeln!(guard, "pid={}", std::process::id()).ok();
        guard.sync_all().ok();
        debug!(lock = %lock_path.display(), "project lock acquired");

        let out = f();

        // Remove while still holding the lock so no waiter grabs a dead inode
        if let Err(e) = fs::remove_file(lock_path) {
            warn!(lock = %lock_path.display(), error = %e, "could not remove lock file");
        }
        out
    };
    drop(lock);
    out
}
