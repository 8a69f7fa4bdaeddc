//! Staging file guard for in-flight downloads.
//!
//! A [`StagingFile`] is created executable from the start, written by the
//! trust client, closed with an explicit sync, and then either persisted
//! onto its final path with a single rename or removed when dropped. Any
//! early return between creation and [`StagingFile::persist`] therefore
//! discards the partial download.

use crate::platform::DEFAULT_EXECUTABLE_MODE;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};

/// A download target inside the staging directory.
#[derive(Debug)]
pub struct StagingFile {
    path: Utf8PathBuf,
    file: Option<File>,
    armed: bool,
}

impl StagingFile {
    /// Create or truncate the staging file at `path`.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the file cannot be opened for writing.
    pub fn create(path: Utf8PathBuf) -> io::Result<Self> {
        let mut options = OpenOptions::new();
        options.create(true).write(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(DEFAULT_EXECUTABLE_MODE);
        }
        #[cfg(not(unix))]
        let _ = DEFAULT_EXECUTABLE_MODE;

        let file = options.open(&path)?;
        Ok(Self {
            path,
            file: Some(file),
            armed: true,
        })
    }

    /// Return the staging path.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Return a writer over the open file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file has already been closed.
    pub fn writer(&mut self) -> io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("staging file already closed"))
    }

    /// Flush and sync the file to disk, then close it.
    ///
    /// A file whose final flush status is unknown must not be published, so
    /// sync errors are returned rather than swallowed by `Drop`.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from flushing or syncing.
    pub fn close(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
            file.sync_all()?;
        }
        Ok(())
    }

    /// Move the staging file onto `dest` with `rename`.
    ///
    /// On failure the guard stays armed and the staging file is removed when
    /// it drops.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from closing or renaming.
    pub fn persist(
        mut self,
        dest: &Utf8Path,
        rename: impl FnOnce(&Utf8Path, &Utf8Path) -> io::Result<()>,
    ) -> io::Result<()> {
        self.close()?;
        rename(&self.path, dest)?;
        self.armed = false;
        Ok(())
    }
}

impl Drop for StagingFile {
    fn drop(&mut self) {
        drop(self.file.take());
        if self.armed {
            // Best effort; the file may already be gone.
            let _ = fs::remove_file(&self.path);
        }
    }
}
