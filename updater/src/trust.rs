//! Trust metadata client abstraction.
//!
//! The updater never verifies signatures itself. It consumes a
//! [`TrustClient`] that has already validated its chain of trust and can
//! resolve a repository path to [`TargetMeta`] and stream verified target
//! bytes. Backends differ in transport and trust scheme; the installer only
//! sees this trait.

use crate::digest::{DigestError, HashAlgorithm, HexDigest};
use crate::remote::RemoteError;
use crate::verify::VerifyError;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;

/// All known targets keyed by repository path.
pub type TargetFiles = BTreeMap<String, TargetMeta>;

/// Errors reported by a [`TrustClient`].
#[derive(Debug, thiserror::Error)]
pub enum TrustError {
    /// The local metadata is already at the latest remote snapshot.
    ///
    /// This is reported by refreshes that find nothing new and is not a
    /// failure from the updater's point of view.
    #[error("already at the latest snapshot (version {version})")]
    LatestSnapshot {
        /// Snapshot version held locally.
        version: u64,
    },

    /// The client has no root of trust yet.
    #[error("trust client is not initialized")]
    NotInitialized,

    /// The repository path is not listed in the targets metadata.
    #[error("target {path} not found in metadata")]
    UnknownTarget {
        /// The requested repository path.
        path: String,
    },

    /// Metadata failed signature, expiry or format checks.
    #[error("invalid metadata: {reason}")]
    InvalidMetadata {
        /// Description of the failed check.
        reason: String,
    },

    /// Fetched content did not match its metadata.
    #[error(transparent)]
    Verification(#[from] VerifyError),

    /// The remote store could not be reached or refused the request.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// A local I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TrustError {
    /// Return true when the error only reports that metadata is current.
    #[must_use]
    pub fn is_latest_snapshot(&self) -> bool {
        matches!(self, Self::LatestSnapshot { .. })
    }
}

/// A root public key used to bootstrap trust.
///
/// Matches the key objects of a root metadata document.
///
/// # Examples
///
/// ```
/// use orbit_updater::trust::RootKey;
///
/// let json = r#"[{"keytype":"ed25519","scheme":"ed25519","keyval":{"public":"6d71"}}]"#;
/// let keys = RootKey::parse_list(json).expect("valid keys");
/// assert_eq!(keys[0].keyval.public, "6d71");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootKey {
    /// Key type, e.g. `ed25519`.
    pub keytype: String,
    /// Signature scheme, e.g. `ed25519`.
    pub scheme: String,
    /// Algorithms used to derive key identifiers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keyid_hash_algorithms: Vec<String>,
    /// The key material.
    pub keyval: KeyValue,
}

/// Public key material of a [`RootKey`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    /// Hex-encoded public key.
    pub public: String,
}

impl RootKey {
    /// Parse a JSON array of root keys.
    ///
    /// # Errors
    ///
    /// Returns the JSON error when the document is not a key array.
    pub fn parse_list(json: &str) -> Result<Vec<Self>, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Verified metadata for one target: its length and digests.
///
/// The length doubles as the maximum download size. Digest lengths are
/// validated against their algorithm on construction and deserialization.
/// Deserialization skips algorithms this updater cannot compute as long as
/// at least one supported algorithm is listed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTargetMeta")]
pub struct TargetMeta {
    length: u64,
    hashes: BTreeMap<HashAlgorithm, HexDigest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    custom: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct RawTargetMeta {
    length: u64,
    #[serde(default)]
    hashes: BTreeMap<String, HexDigest>,
    #[serde(default)]
    custom: Option<serde_json::Value>,
}

impl TryFrom<RawTargetMeta> for TargetMeta {
    type Error = DigestError;

    fn try_from(raw: RawTargetMeta) -> Result<Self, Self::Error> {
        let mut hashes = BTreeMap::new();
        let mut unsupported = None;
        for (name, digest) in raw.hashes {
            match name.parse::<HashAlgorithm>() {
                Ok(algorithm) => {
                    hashes.insert(algorithm, digest);
                }
                Err(e) => {
                    debug!("ignoring target digest: {e}");
                    unsupported.get_or_insert(e);
                }
            }
        }
        if let Some(e) = unsupported.filter(|_| hashes.is_empty()) {
            return Err(e);
        }
        let meta = Self::new(raw.length, hashes)?;
        Ok(match raw.custom {
            Some(custom) => meta.with_custom(custom),
            None => meta,
        })
    }
}

impl TargetMeta {
    /// Create metadata from a length and a digest map.
    ///
    /// # Errors
    ///
    /// Returns [`DigestError::LengthMismatch`] when a digest does not have
    /// the length its algorithm produces.
    pub fn new(
        length: u64,
        hashes: BTreeMap<HashAlgorithm, HexDigest>,
    ) -> Result<Self, DigestError> {
        for (algorithm, digest) in &hashes {
            if digest.len() != algorithm.hex_len() {
                return Err(DigestError::LengthMismatch {
                    algorithm: *algorithm,
                    expected: algorithm.hex_len(),
                    actual: digest.len(),
                });
            }
        }
        Ok(Self {
            length,
            hashes,
            custom: None,
        })
    }

    /// Attach backend-specific custom metadata.
    #[must_use]
    pub fn with_custom(mut self, custom: serde_json::Value) -> Self {
        self.custom = Some(custom);
        self
    }

    /// Return the expected length in bytes.
    #[must_use]
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Return the expected digests.
    #[must_use]
    pub fn hashes(&self) -> &BTreeMap<HashAlgorithm, HexDigest> {
        &self.hashes
    }

    /// Return the custom metadata, if any.
    #[must_use]
    pub fn custom(&self) -> Option<&serde_json::Value> {
        self.custom.as_ref()
    }
}

/// Client for a signed metadata repository.
///
/// Implementations own their trust state and use interior mutability for
/// refreshes, so the updater can share one client across calls.
pub trait TrustClient {
    /// Return whether a root of trust is already stored locally.
    ///
    /// # Errors
    ///
    /// Returns an error if the local store cannot be read. The updater
    /// treats this like an uninitialized client.
    fn is_initialized(&self) -> Result<bool, TrustError>;

    /// Bootstrap trust from root keys and a signature threshold.
    ///
    /// # Errors
    ///
    /// Returns an error if the root metadata cannot be fetched or verified.
    fn init(&self, root_keys: &[RootKey], threshold: u32) -> Result<(), TrustError>;

    /// Fetch and verify the latest metadata.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::LatestSnapshot`] when nothing changed, or any
    /// other variant on transport or verification failure.
    fn refresh_metadata(&self) -> Result<(), TrustError>;

    /// Resolve a repository path to its verified metadata.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::UnknownTarget`] if the path is not listed.
    fn resolve_target(&self, path: &str) -> Result<TargetMeta, TrustError>;

    /// Return every known target.
    ///
    /// # Errors
    ///
    /// Returns an error if the targets metadata is unavailable.
    fn targets(&self) -> Result<TargetFiles, TrustError>;

    /// Stream the target's bytes into `dest`, enforcing its maximum size
    /// and checking its hashes before returning success.
    ///
    /// # Errors
    ///
    /// Returns an error on any transport or verification failure. `dest`
    /// may then hold partial content and must be discarded.
    fn fetch_target(&self, path: &str, dest: &mut dyn Write) -> Result<(), TrustError>;
}
