//! Platform conventions for executables and their directories.
//!
//! Everything that differs between operating systems while installing an
//! artifact sits behind the [`Platform`] trait: the running platform's name,
//! permission adjustments, the rename that publishes a file, and whether a
//! file in use must be renamed away before it can be replaced.

use camino::Utf8Path;
use std::fs;
use std::io;

/// Mode for directories created by the updater.
pub const DEFAULT_DIR_MODE: u32 = 0o755;

/// Mode for executables written by the updater.
pub const DEFAULT_EXECUTABLE_MODE: u32 = 0o755;

/// Platform name used for Windows targets.
pub const WINDOWS: &str = "windows";

/// Return the executable extension for a target platform.
///
/// # Examples
///
/// ```
/// use orbit_updater::platform::executable_extension;
///
/// assert_eq!(executable_extension("windows"), ".exe");
/// assert_eq!(executable_extension("linux"), "");
/// ```
#[must_use]
pub fn executable_extension(platform: &str) -> &'static str {
    if platform == WINDOWS { ".exe" } else { "" }
}

/// Create `dir` and its parents with [`DEFAULT_DIR_MODE`].
///
/// # Errors
///
/// Returns the I/O error if a directory cannot be created.
pub fn create_dir_all(dir: &Utf8Path) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(DEFAULT_DIR_MODE);
    }
    builder.create(dir)
}

/// Operating-system specific install behaviour.
#[cfg_attr(test, mockall::automock)]
pub trait Platform {
    /// Name of the platform this process runs on, e.g. `linux`.
    fn name(&self) -> &'static str;

    /// Executable extension for binaries built for `platform`.
    fn executable_extension(&self, platform: &str) -> &'static str;

    /// Make `path` able to hold executables.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if permissions cannot be changed.
    fn chmod_executable_directory(&self, path: &Utf8Path) -> io::Result<()>;

    /// Make the file at `path` executable.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if permissions cannot be changed.
    fn chmod_executable(&self, path: &Utf8Path) -> io::Result<()>;

    /// Whether an existing file must be renamed away before being replaced.
    fn rename_before_replace(&self) -> bool;

    /// Rename `from` to `to`, replacing `to` where the platform allows it.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from the rename.
    fn rename(&self, from: &Utf8Path, to: &Utf8Path) -> io::Result<()>;
}

/// The platform this binary was compiled for.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostPlatform;

impl Platform for HostPlatform {
    fn name(&self) -> &'static str {
        std::env::consts::OS
    }

    fn executable_extension(&self, platform: &str) -> &'static str {
        executable_extension(platform)
    }

    // Unix creation modes already grant execute; Windows only needs the
    // read-only attribute cleared.
    fn chmod_executable_directory(&self, path: &Utf8Path) -> io::Result<()> {
        clear_readonly(path)
    }

    fn chmod_executable(&self, path: &Utf8Path) -> io::Result<()> {
        clear_readonly(path)
    }

    fn rename_before_replace(&self) -> bool {
        cfg!(windows)
    }

    fn rename(&self, from: &Utf8Path, to: &Utf8Path) -> io::Result<()> {
        fs::rename(from, to)
    }
}

#[cfg(windows)]
fn clear_readonly(path: &Utf8Path) -> io::Result<()> {
    let mut permissions = fs::metadata(path)?.permissions();
    if permissions.readonly() {
        permissions.set_readonly(false);
        fs::set_permissions(path, permissions)?;
    }
    Ok(())
}

#[cfg(not(windows))]
fn clear_readonly(_path: &Utf8Path) -> io::Result<()> {
    Ok(())
}
