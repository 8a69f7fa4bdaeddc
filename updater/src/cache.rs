//! Freshness check for locally cached artifacts.
//!
//! An artifact on disk is trusted only when it matches metadata resolved
//! during the same check. Existence alone never counts, and metadata
//! failures are fatal rather than falling back to whatever is cached.

use crate::error::{Result, UpdateError};
use crate::trust::TrustClient;
use crate::verify::check_file_hash;
use camino::Utf8Path;
use log::debug;
use std::fs;

/// Outcome of a cache check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheDecision {
    /// The cached artifact matches current metadata.
    Fresh,
    /// The artifact must be (re)downloaded.
    Download {
        /// Why the cached copy was not used.
        reason: String,
    },
}

/// Decides whether a cached artifact satisfies current metadata.
pub struct CacheValidator<'a> {
    client: &'a dyn TrustClient,
}

impl<'a> CacheValidator<'a> {
    /// Create a validator resolving metadata through `client`.
    #[must_use]
    pub fn new(client: &'a dyn TrustClient) -> Self {
        Self { client }
    }

    /// Check the artifact at `local_path` against the metadata for
    /// `repo_path`.
    ///
    /// A missing or unreadable path needs a download without consulting
    /// metadata.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::NotRegularFile`] when the path holds something
    /// other than a regular file, and [`UpdateError::Metadata`] when the
    /// metadata cannot be resolved.
    pub fn check(&self, repo_path: &str, local_path: &Utf8Path) -> Result<CacheDecision> {
        let stat = match fs::metadata(local_path) {
            Ok(stat) => stat,
            Err(e) => {
                debug!("stat file {local_path}: {e}");
                return Ok(CacheDecision::Download {
                    reason: format!("stat {local_path}: {e}"),
                });
            }
        };
        if !stat.is_file() {
            return Err(UpdateError::NotRegularFile {
                path: local_path.to_owned(),
            });
        }

        let meta = self
            .client
            .resolve_target(repo_path)
            .map_err(|source| UpdateError::Metadata {
                operation: format!("lookup {repo_path}"),
                source,
            })?;

        match check_file_hash(&meta, local_path) {
            Ok(()) => Ok(CacheDecision::Fresh),
            Err(e) => {
                debug!("change detected for {local_path}: {e}");
                Ok(CacheDecision::Download {
                    reason: e.to_string(),
                })
            }
        }
    }
}
