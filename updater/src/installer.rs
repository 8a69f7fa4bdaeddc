//! Download, verify, smoke-test and publish pipeline.
//!
//! The artifact path only ever holds the previous artifact or a fully
//! verified new one: bytes land in a [`StagingFile`] first, and the final
//! step is a single rename. Every earlier failure drops the staging guard,
//! which deletes the partial download.

use crate::error::{Result, UpdateError};
use crate::exec::{CommandExecutor, smoke_test};
use crate::locator::{ArtifactLocator, old_path};
use crate::platform::{Platform, create_dir_all};
use crate::staging::StagingFile;
use crate::trust::TrustClient;
use camino::Utf8Path;
use log::{debug, info, warn};
use std::io;
use std::time::Duration;

/// Runs the staged install pipeline for one artifact.
///
/// Callers hold the artifact's [`InstallLock`](crate::lock::InstallLock)
/// for the duration of [`StagedInstaller::install`].
pub struct StagedInstaller<'a> {
    locator: &'a ArtifactLocator,
    client: &'a dyn TrustClient,
    platform: &'a dyn Platform,
    executor: &'a dyn CommandExecutor,
    smoke_test_timeout: Duration,
}

impl<'a> StagedInstaller<'a> {
    /// Create an installer from its collaborators.
    #[must_use]
    pub fn new(
        locator: &'a ArtifactLocator,
        client: &'a dyn TrustClient,
        platform: &'a dyn Platform,
        executor: &'a dyn CommandExecutor,
        smoke_test_timeout: Duration,
    ) -> Self {
        Self {
            locator,
            client,
            platform,
            executor,
            smoke_test_timeout,
        }
    }

    /// Fetch `repo_path` and publish it at `local_path`.
    ///
    /// On failure `local_path` keeps its previous content (or absence) and
    /// the staging file is removed.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Io`] for filesystem failures,
    /// [`UpdateError::Download`] when the fetch or its verification fails,
    /// and [`UpdateError::SmokeTest`] when the staged binary does not run.
    pub fn install(&self, repo_path: &str, local_path: &Utf8Path) -> Result<()> {
        let staging_dir = self.locator.staging_dir();
        self.ensure_executable_dir(&staging_dir)?;

        let staging_path = self.locator.staging_path(local_path);
        let mut staged = StagingFile::create(staging_path.clone())
            .map_err(UpdateError::io("open temp file for download", &staging_path))?;
        self.platform
            .chmod_executable(staged.path())
            .map_err(UpdateError::io("chmod download", &staging_path))?;

        let dest_dir = local_path.parent().unwrap_or(Utf8Path::new("."));
        self.ensure_executable_dir(dest_dir)?;

        let writer = staged
            .writer()
            .map_err(UpdateError::io("write download", &staging_path))?;
        self.client
            .fetch_target(repo_path, writer)
            .map_err(|source| UpdateError::Download {
                repo_path: repo_path.to_owned(),
                source,
            })?;
        staged
            .close()
            .map_err(UpdateError::io("close tmp file", &staging_path))?;

        // A binary for another platform cannot run here, so executing it
        // would prove nothing.
        if self.locator.platform() == self.platform.name() {
            smoke_test(self.executor, staged.path(), self.smoke_test_timeout)?;
        } else {
            debug!(
                "skipping smoke test of {staging_path}: built for {}, running on {}",
                self.locator.platform(),
                self.platform.name()
            );
        }

        let moved_old = if self.platform.rename_before_replace() {
            self.rename_old(local_path)?
        } else {
            false
        };

        if let Err(e) = staged.persist(local_path, |from, to| self.platform.rename(from, to)) {
            if moved_old {
                self.restore_old(local_path);
            }
            return Err(UpdateError::io("move download", local_path)(e));
        }

        info!("installed {repo_path} at {local_path}");
        Ok(())
    }

    fn ensure_executable_dir(&self, dir: &Utf8Path) -> Result<()> {
        create_dir_all(dir).map_err(UpdateError::io("initialize download dir", dir))?;
        self.platform
            .chmod_executable_directory(dir)
            .map_err(UpdateError::io("chmod directory", dir))
    }

    /// Move an existing artifact to its `.old` path. Returns whether a file
    /// was moved.
    fn rename_old(&self, local_path: &Utf8Path) -> Result<bool> {
        let old = old_path(local_path);
        match self.platform.rename(local_path, &old) {
            Ok(()) => {
                debug!("moved {local_path} to {old}");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(UpdateError::io("rename old", local_path)(e)),
        }
    }

    fn restore_old(&self, local_path: &Utf8Path) {
        let old = old_path(local_path);
        match self.platform.rename(&old, local_path) {
            Ok(()) => debug!("restored {old} to {local_path}"),
            Err(e) => warn!("failed to restore {old} to {local_path}: {e}"),
        }
    }
}

#[cfg(test)]
#[path = "installer_tests.rs"]
mod tests;
