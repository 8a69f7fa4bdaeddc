//! The updater facade.
//!
//! [`Updater`] ties the pieces together: it bootstraps trust, refreshes
//! metadata, answers lookups and drives [`Updater::get`], which returns the
//! path of a verified artifact for a `(target, channel)` pair, downloading
//! it only when the cached copy does not match current metadata.

use crate::cache::{CacheDecision, CacheValidator};
use crate::config::{ConfigError, Options};
use crate::error::{Result, UpdateError};
use crate::exec::{CommandExecutor, SystemCommandExecutor};
use crate::installer::StagedInstaller;
use crate::locator::ArtifactLocator;
use crate::lock::InstallLock;
use crate::platform::{HostPlatform, Platform, create_dir_all};
use crate::remote::HttpRemoteStore;
use crate::trust::{TargetFiles, TargetMeta, TrustClient, TrustError};
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info};

/// Trust client shared by an [`Updater`].
pub type BoxedTrustClient = Box<dyn TrustClient + Send + Sync>;

/// Downloads and caches trusted artifacts.
///
/// # Examples
///
/// ```
/// use orbit_updater::config::Options;
/// use orbit_updater::test_utils::{FakePlatform, MemoryRepository, SmokeBehaviour, StubExecutor};
/// use orbit_updater::updater::Updater;
///
/// let dir = tempfile::tempdir().expect("temp dir");
/// let options = Options {
///     root_directory: camino::Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("UTF-8"),
///     platform: "linux".to_owned(),
///     ..Options::default()
/// };
/// let repo = MemoryRepository::new();
/// repo.publish("agent/linux/stable/agent", b"agent 1.0.0");
///
/// let updater = Updater::with_parts(
///     options,
///     Box::new(repo),
///     Box::new(FakePlatform::named("linux")),
///     Box::new(StubExecutor::new(SmokeBehaviour::Pass)),
/// )
/// .expect("updater");
/// updater.update_metadata().expect("refresh");
/// let path = updater.get("agent", "stable").expect("artifact");
/// assert!(path.ends_with("bin/agent/linux/stable/agent"));
/// ```
pub struct Updater {
    options: Options,
    locator: ArtifactLocator,
    client: BoxedTrustClient,
    platform: Box<dyn Platform + Send + Sync>,
    executor: Box<dyn CommandExecutor + Send + Sync>,
}

impl std::fmt::Debug for Updater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Updater")
            .field("options", &self.options)
            .field("locator", &self.locator)
            .finish_non_exhaustive()
    }
}

impl Updater {
    /// Create an updater for the running host.
    ///
    /// # Errors
    ///
    /// See [`Updater::with_parts`].
    pub fn new(options: Options, client: BoxedTrustClient) -> Result<Self> {
        Self::with_parts(
            options,
            client,
            Box::new(HostPlatform),
            Box::new(SystemCommandExecutor),
        )
    }

    /// Create an updater whose trust client reads from the configured server.
    ///
    /// Builds an [`HttpRemoteStore`] for `options.server_url` with the
    /// configured TLS and timeout settings and hands it to `connect`, which
    /// wraps it in a trust backend.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Config`] for invalid options,
    /// [`UpdateError::Metadata`] when `connect` fails, and any error from
    /// [`Updater::new`].
    pub fn from_options<F>(options: Options, connect: F) -> Result<Self>
    where
        F: FnOnce(HttpRemoteStore) -> std::result::Result<BoxedTrustClient, TrustError>,
    {
        options.validate()?;
        let remote = HttpRemoteStore::new(&options.server_url, options.transport_options())
            .map_err(|e| ConfigError::Invalid {
                field: "server_url",
                reason: e.to_string(),
            })?;
        debug!("connecting trust client to {}", options.server_url);
        let client = connect(remote).map_err(|source| UpdateError::Metadata {
            operation: "create trust client".to_owned(),
            source,
        })?;
        Self::new(options, client)
    }

    /// Create an updater from explicit collaborators.
    ///
    /// Validates `options`, initializes the trust client from the configured
    /// root keys when it holds no root of trust yet, and creates the
    /// published-artifact directory.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Config`] for invalid options,
    /// [`UpdateError::Metadata`] when trust initialization fails, and
    /// [`UpdateError::Io`] when the directory cannot be created.
    pub fn with_parts(
        options: Options,
        client: BoxedTrustClient,
        platform: Box<dyn Platform + Send + Sync>,
        executor: Box<dyn CommandExecutor + Send + Sync>,
    ) -> Result<Self> {
        options.validate()?;
        let extension = platform.executable_extension(&options.platform);
        let locator =
            ArtifactLocator::new(options.root_directory.clone(), &options.platform, extension);

        bootstrap_trust(&*client, &options)?;

        let bin_dir = locator.bin_dir();
        create_dir_all(&bin_dir).map_err(UpdateError::io("initialize directories", &bin_dir))?;

        Ok(Self {
            options,
            locator,
            client,
            platform,
            executor,
        })
    }

    /// Return the options this updater was built with.
    #[must_use]
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Return the path mapper.
    #[must_use]
    pub fn locator(&self) -> &ArtifactLocator {
        &self.locator
    }

    /// Refresh trust metadata from the repository.
    ///
    /// Metadata already at the latest snapshot is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Metadata`] for every other refresh failure.
    pub fn update_metadata(&self) -> Result<()> {
        match self.client.refresh_metadata() {
            Ok(()) => Ok(()),
            Err(e) if e.is_latest_snapshot() => {
                debug!("metadata already current: {e}");
                Ok(())
            }
            Err(source) => Err(UpdateError::Metadata {
                operation: "update metadata".to_owned(),
                source,
            }),
        }
    }

    /// Repository path of `target` on `channel`.
    #[must_use]
    pub fn repo_path(&self, target: &str, channel: &str) -> String {
        self.locator.repo_path(target, channel)
    }

    /// Local path of `target` on `channel`.
    #[must_use]
    pub fn local_path(&self, target: &str, channel: &str) -> Utf8PathBuf {
        self.locator.local_path(target, channel)
    }

    /// Resolve current metadata for `target` on `channel`.
    ///
    /// Call [`Updater::update_metadata`] first.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Metadata`] when the target is unknown or the
    /// metadata is unavailable.
    pub fn lookup(&self, target: &str, channel: &str) -> Result<TargetMeta> {
        self.client
            .resolve_target(&self.repo_path(target, channel))
            .map_err(|source| UpdateError::Metadata {
                operation: format!("lookup {target}@{channel}"),
                source,
            })
    }

    /// Return every known target.
    ///
    /// Call [`Updater::update_metadata`] first.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Metadata`] when the metadata is unavailable.
    pub fn targets(&self) -> Result<TargetFiles> {
        self.client
            .targets()
            .map_err(|source| UpdateError::Metadata {
                operation: "get targets".to_owned(),
                source,
            })
    }

    /// Return the path of a verified artifact for `target` on `channel`,
    /// downloading it if the cached copy is missing or stale.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::MissingTarget`] or
    /// [`UpdateError::MissingChannel`] for empty inputs, and any error from
    /// the cache check or the install pipeline.
    pub fn get(&self, target: &str, channel: &str) -> Result<Utf8PathBuf> {
        if target.is_empty() {
            return Err(UpdateError::MissingTarget);
        }
        if channel.is_empty() {
            return Err(UpdateError::MissingChannel);
        }

        let repo_path = self.repo_path(target, channel);
        let local_path = self.local_path(target, channel);
        let _lock = InstallLock::acquire(&self.locator.lock_path(&local_path))?;

        match CacheValidator::new(&*self.client).check(&repo_path, &local_path)? {
            CacheDecision::Fresh => {
                debug!("found expected target locally: {local_path}");
            }
            CacheDecision::Download { reason } => {
                info!("updating {repo_path}: {reason}");
                self.installer().install(&repo_path, &local_path)?;
            }
        }
        Ok(local_path)
    }

    /// Download `repo_path` and publish it at `local_path`, regardless of
    /// what is cached.
    ///
    /// On failure `local_path` keeps its previous content and nothing is
    /// left in the staging directory.
    ///
    /// # Errors
    ///
    /// Returns any error from the install pipeline.
    pub fn download(&self, repo_path: &str, local_path: &Utf8Path) -> Result<()> {
        let _lock = InstallLock::acquire(&self.locator.lock_path(local_path))?;
        self.installer().install(repo_path, local_path)
    }

    fn installer(&self) -> StagedInstaller<'_> {
        StagedInstaller::new(
            &self.locator,
            &*self.client,
            &*self.platform,
            &*self.executor,
            self.options.smoke_test_timeout(),
        )
    }
}

fn bootstrap_trust(client: &dyn TrustClient, options: &Options) -> Result<()> {
    let initialized = client.is_initialized().unwrap_or_else(|e| {
        debug!("check trust initialization: {e}");
        false
    });
    if initialized {
        return Ok(());
    }

    let keys = options.root_keys()?;
    client
        .init(&keys, options.root_threshold)
        .map_err(|source| UpdateError::Metadata {
            operation: "init trust client".to_owned(),
            source,
        })?;
    info!(
        "initialized trust from {} root key(s), threshold {}",
        keys.len(),
        options.root_threshold
    );
    Ok(())
}

#[cfg(test)]
#[path = "updater_tests.rs"]
mod tests;
