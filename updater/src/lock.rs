//! Per-target install lock.
//!
//! The staging file name is derived from the artifact's base name only, so
//! two installs of the same target (on any channel) would write the same
//! staging path. An exclusive advisory lock on `locks/<basename>.lock`
//! serializes them across threads and processes. The lock is released when
//! the guard drops.

use crate::error::{Result, UpdateError};
use crate::platform::create_dir_all;
use camino::{Utf8Path, Utf8PathBuf};
use fs2::FileExt;
use std::fs::{File, OpenOptions};

/// Guard holding an exclusive lock on an install key.
#[derive(Debug)]
pub struct InstallLock {
    file: File,
    path: Utf8PathBuf,
}

impl InstallLock {
    /// Block until the lock at `path` is held.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Io`] if the lock directory or file cannot be
    /// created, or the lock cannot be taken.
    pub fn acquire(path: &Utf8Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            create_dir_all(parent).map_err(UpdateError::io("initialize lock dir", parent))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(UpdateError::io("open lock", path))?;
        FileExt::lock_exclusive(&file).map_err(UpdateError::io("lock", path))?;
        Ok(Self {
            file,
            path: path.to_owned(),
        })
    }

    /// Return the path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl Drop for InstallLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
