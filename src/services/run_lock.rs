use std::fs::{File, OpenOptions, TryLockError};
use std::path::{Path, PathBuf};

use color_eyre::eyre::{Result, WrapErr};

pub const LOCK_FILE: &str = ".discovery-sync.lock";

/// Exclusive lock held for the duration of a run. Released on drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    _file: File,
}

impl RunLock {
    /// Take the lock in `dir` without waiting.
    ///
    /// Returns `None` when another process already holds it.
    pub fn try_acquire(dir: &Path) -> Result<Option<Self>> {
        std::fs::create_dir_all(dir)
            .wrap_err_with(|| format!("Failed to create {}", dir.display()))?;
        let path = dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .wrap_err_with(|| format!("Failed to open lock file {}", path.display()))?;

        match file.try_lock() {
            Ok(()) => {
                log::debug!("Acquired run lock {}", path.display());
                Ok(Some(Self { path, _file: file }))
            }
            Err(TryLockError::WouldBlock) => Ok(None),
            Err(TryLockError::Error(e)) => {
                Err(e).wrap_err_with(|| format!("Failed to lock {}", path.display()))
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
