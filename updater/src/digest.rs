//! Hash algorithms and hex digest newtype used by target metadata.
//!
//! Digests are stored as lowercase hexadecimal strings. Uppercase input is
//! accepted and normalized so that comparisons against locally computed
//! digests are plain string equality.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors arising from invalid hash algorithm names or digest strings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DigestError {
    /// The algorithm is not one this updater can compute.
    #[error("unsupported hash algorithm \"{name}\"; expected one of: sha256, sha512")]
    UnsupportedAlgorithm {
        /// The rejected algorithm name.
        name: String,
    },

    /// The digest is not a well-formed hex string.
    #[error("invalid digest: {reason}")]
    InvalidDigest {
        /// Description of the validation failure.
        reason: String,
    },

    /// The digest length does not fit its algorithm.
    #[error("{algorithm} digest must be {expected} hex characters, got {actual}")]
    LengthMismatch {
        /// Algorithm the digest was declared under.
        algorithm: HashAlgorithm,
        /// Expected number of hex characters.
        expected: usize,
        /// Actual number of hex characters.
        actual: usize,
    },
}

/// A hash algorithm that may appear in target metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// SHA-256.
    Sha256,
    /// SHA-512.
    Sha512,
}

impl HashAlgorithm {
    /// All supported algorithms.
    pub const ALL: [Self; 2] = [Self::Sha256, Self::Sha512];

    /// Return the metadata name of the algorithm.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }

    /// Return the length of a hex-encoded digest for this algorithm.
    #[must_use]
    pub fn hex_len(self) -> usize {
        match self {
            Self::Sha256 => 64,
            Self::Sha512 => 128,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sha256" => Ok(Self::Sha256),
            "sha512" => Ok(Self::Sha512),
            other => Err(DigestError::UnsupportedAlgorithm {
                name: other.to_owned(),
            }),
        }
    }
}

/// A validated, lowercase hex-encoded digest.
///
/// # Examples
///
/// ```
/// use orbit_updater::digest::HexDigest;
///
/// let digest = HexDigest::try_from("ABCDEF01").expect("valid hex");
/// assert_eq!(digest.as_str(), "abcdef01");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct HexDigest(String);

impl HexDigest {
    /// Return the digest as a hex string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Return the number of hex characters in the digest.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Return true when the digest is empty. Validated digests never are.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Wrap a digest produced by a local hasher, which is always lowercase hex.
    pub(crate) fn from_computed(hex: String) -> Self {
        Self(hex)
    }
}

impl TryFrom<&str> for HexDigest {
    type Error = DigestError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        validate_hex(value)?;
        Ok(Self(value.to_ascii_lowercase()))
    }
}

impl TryFrom<String> for HexDigest {
    type Error = DigestError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl AsRef<str> for HexDigest {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HexDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn validate_hex(value: &str) -> Result<(), DigestError> {
    if value.is_empty() {
        return Err(DigestError::InvalidDigest {
            reason: "digest is empty".to_owned(),
        });
    }
    if let Some(bad) = value.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(DigestError::InvalidDigest {
            reason: format!("non-hex character '{bad}'"),
        });
    }
    if value.len() % 2 != 0 {
        return Err(DigestError::InvalidDigest {
            reason: format!("odd number of hex characters ({})", value.len()),
        });
    }
    Ok(())
}
