//! Error types for the updater.
//!
//! Every variant carries enough context (operation name and path, or the
//! repository path being fetched) to diagnose a failed update without
//! re-running it. [`UpdateError::kind`] maps variants onto the three
//! failure classes callers act on.

use crate::config::ConfigError;
use crate::trust::TrustError;
use camino::Utf8PathBuf;
use std::fmt;
use thiserror::Error;

/// Errors that can occur while resolving or installing a target.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// The target name was empty.
    #[error("target is required")]
    MissingTarget,

    /// The channel name was empty.
    #[error("channel is required")]
    MissingChannel,

    /// Something other than a regular file occupies the artifact path.
    #[error("expected {path} to be a regular file")]
    NotRegularFile {
        /// The occupied artifact path.
        path: Utf8PathBuf,
    },

    /// The updater options are invalid.
    #[error("invalid options: {0}")]
    Config(#[from] ConfigError),

    /// A trust metadata operation failed.
    #[error("{operation}: {source}")]
    Metadata {
        /// Description of the metadata operation, e.g. `update metadata`.
        operation: String,
        /// The error reported by the trust client.
        #[source]
        source: TrustError,
    },

    /// Fetching and verifying target bytes into the staging file failed.
    #[error("download target {repo_path}: {source}")]
    Download {
        /// Repository path of the target being fetched.
        repo_path: String,
        /// The error reported by the trust client.
        #[source]
        source: TrustError,
    },

    /// The staged binary failed its version smoke test.
    #[error("exec new version {path}: {reason}")]
    SmokeTest {
        /// Path of the staged binary.
        path: Utf8PathBuf,
        /// Exit status and combined output, or the spawn error.
        reason: String,
    },

    /// A filesystem operation failed.
    #[error("{operation} {path}: {source}")]
    Io {
        /// Short name of the failed operation, e.g. `rename old`.
        operation: &'static str,
        /// The path the operation acted on.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Failure classes for [`UpdateError`].
///
/// No class is retried internally; every failure leaves the filesystem no
/// worse than before the call, so the caller may retry the whole operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing inputs or a path collision. Retrying will not help.
    Configuration,
    /// Metadata, hash, size or smoke-test failures.
    Verification,
    /// Directory creation, open, sync, rename or lock failures.
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "configuration"),
            Self::Verification => write!(f, "verification"),
            Self::Io => write!(f, "I/O"),
        }
    }
}

impl UpdateError {
    /// Classify this error.
    ///
    /// # Examples
    ///
    /// ```
    /// use orbit_updater::error::{ErrorKind, UpdateError};
    ///
    /// assert_eq!(UpdateError::MissingChannel.kind(), ErrorKind::Configuration);
    /// ```
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingTarget
            | Self::MissingChannel
            | Self::NotRegularFile { .. }
            | Self::Config(_) => ErrorKind::Configuration,
            Self::Metadata { .. } | Self::Download { .. } | Self::SmokeTest { .. } => {
                ErrorKind::Verification
            }
            Self::Io { .. } => ErrorKind::Io,
        }
    }

    /// Build an [`UpdateError::Io`] from an operation name and path.
    pub(crate) fn io(
        operation: &'static str,
        path: impl Into<Utf8PathBuf>,
    ) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io {
            operation,
            path,
            source,
        }
    }
}

/// Result type alias using [`UpdateError`].
pub type Result<T> = std::result::Result<T, UpdateError>;
