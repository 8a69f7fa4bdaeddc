//! Repository and local paths for targets.
//!
//! Both paths embed the target platform and its executable extension so
//! that binaries for different platforms never share a path.

use camino::{Utf8Path, Utf8PathBuf};

const BIN_DIR: &str = "bin";
const STAGING_DIR: &str = "staging";
const LOCKS_DIR: &str = "locks";
const OLD_SUFFIX: &str = ".old";
const LOCK_SUFFIX: &str = ".lock";

/// Maps `(target, channel)` pairs to repository and filesystem paths.
///
/// # Examples
///
/// ```
/// use camino::Utf8PathBuf;
/// use orbit_updater::locator::ArtifactLocator;
///
/// let locator = ArtifactLocator::new(Utf8PathBuf::from("/opt/orbit"), "windows", ".exe");
/// assert_eq!(locator.repo_path("orbit", "stable"), "orbit/windows/stable/orbit.exe");
/// assert_eq!(
///     locator.local_path("orbit", "stable"),
///     Utf8PathBuf::from("/opt/orbit/bin/orbit/windows/stable/orbit.exe"),
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLocator {
    root: Utf8PathBuf,
    platform: String,
    extension: &'static str,
}

impl ArtifactLocator {
    /// Create a locator for `platform` binaries under `root`.
    #[must_use]
    pub fn new(root: Utf8PathBuf, platform: &str, extension: &'static str) -> Self {
        Self {
            root,
            platform: platform.to_owned(),
            extension,
        }
    }

    /// Return the root directory.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Return the target platform.
    #[must_use]
    pub fn platform(&self) -> &str {
        &self.platform
    }

    /// Key of the target in the repository's targets metadata.
    ///
    /// Always `/`-separated regardless of the host.
    #[must_use]
    pub fn repo_path(&self, target: &str, channel: &str) -> String {
        format!(
            "{target}/{}/{channel}/{target}{}",
            self.platform, self.extension
        )
    }

    /// Path where the target is cached locally.
    #[must_use]
    pub fn local_path(&self, target: &str, channel: &str) -> Utf8PathBuf {
        self.bin_dir()
            .join(target)
            .join(&self.platform)
            .join(channel)
            .join(format!("{target}{}", self.extension))
    }

    /// Directory holding published artifacts.
    #[must_use]
    pub fn bin_dir(&self) -> Utf8PathBuf {
        self.root.join(BIN_DIR)
    }

    /// Directory holding in-flight downloads.
    #[must_use]
    pub fn staging_dir(&self) -> Utf8PathBuf {
        self.root.join(STAGING_DIR)
    }

    /// Staging file for an artifact, named after its base name.
    #[must_use]
    pub fn staging_path(&self, local_path: &Utf8Path) -> Utf8PathBuf {
        self.staging_dir().join(base_name(local_path))
    }

    /// Lock file guarding the staging file of an artifact.
    #[must_use]
    pub fn lock_path(&self, local_path: &Utf8Path) -> Utf8PathBuf {
        self.root
            .join(LOCKS_DIR)
            .join(format!("{}{LOCK_SUFFIX}", base_name(local_path)))
    }
}

/// Path an existing artifact is moved to before being replaced.
#[must_use]
pub fn old_path(local_path: &Utf8Path) -> Utf8PathBuf {
    Utf8PathBuf::from(format!("{local_path}{OLD_SUFFIX}"))
}

fn base_name(path: &Utf8Path) -> &str {
    path.file_name().unwrap_or(path.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn linux() -> ArtifactLocator {
        ArtifactLocator::new(Utf8PathBuf::from("/opt/orbit"), "linux", "")
    }

    #[rstest]
    fn repo_path_joins_target_platform_channel(linux: ArtifactLocator) {
        assert_eq!(linux.repo_path("agent", "stable"), "agent/linux/stable/agent");
    }

    #[rstest]
    fn local_path_lives_under_bin(linux: ArtifactLocator) {
        assert_eq!(
            linux.local_path("agent", "stable"),
            Utf8PathBuf::from("/opt/orbit/bin/agent/linux/stable/agent")
        );
    }

    #[rstest]
    fn channels_do_not_collide(linux: ArtifactLocator) {
        assert_ne!(
            linux.local_path("agent", "stable"),
            linux.local_path("agent", "beta")
        );
    }

    #[rstest]
    fn staging_and_lock_paths_use_base_name(linux: ArtifactLocator) {
        let local = linux.local_path("agent", "beta");
        assert_eq!(
            linux.staging_path(&local),
            Utf8PathBuf::from("/opt/orbit/staging/agent")
        );
        assert_eq!(
            linux.lock_path(&local),
            Utf8PathBuf::from("/opt/orbit/locks/agent.lock")
        );
    }

    #[test]
    fn old_path_appends_suffix() {
        assert_eq!(
            old_path(Utf8Path::new("/opt/orbit/bin/orbit.exe")),
            Utf8PathBuf::from("/opt/orbit/bin/orbit.exe.old")
        );
    }
}
