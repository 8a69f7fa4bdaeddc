//! Length and hash verification of artifacts against target metadata.
//!
//! Two entry points share the same comparison rules: [`check_file_hash`]
//! validates a file already on disk, and [`copy_verified`] validates bytes
//! while streaming them into a writer. Metadata with no hashes never
//! validates anything.

use crate::digest::{HashAlgorithm, HexDigest};
use crate::trust::TargetMeta;
use camino::Utf8Path;
use sha2::{Digest, Sha256, Sha512};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Read, Write};

const BUFFER_SIZE: usize = 8192;

/// Errors arising when content does not match its metadata.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// The metadata lists no hashes, so nothing can be trusted.
    #[error("target metadata lists no hashes")]
    NoHashes,

    /// More bytes arrived than the metadata allows.
    #[error("content exceeds maximum size of {limit} bytes")]
    SizeExceeded {
        /// Maximum permitted size in bytes.
        limit: u64,
    },

    /// The content length differs from the metadata.
    #[error("length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch {
        /// Length recorded in the metadata.
        expected: u64,
        /// Length of the content.
        actual: u64,
    },

    /// A digest differs from the metadata.
    #[error("{algorithm} mismatch: expected {expected}, got {actual}")]
    HashMismatch {
        /// Algorithm whose digest differed.
        algorithm: HashAlgorithm,
        /// Digest recorded in the metadata.
        expected: HexDigest,
        /// Digest of the content.
        actual: HexDigest,
    },

    /// Reading the content or writing it out failed.
    #[error("I/O error during verification: {0}")]
    Io(#[from] io::Error),
}

enum HasherState {
    Sha256(Sha256),
    Sha512(Sha512),
}

/// Computes digests under several algorithms in one pass.
///
/// # Examples
///
/// ```
/// use orbit_updater::digest::HashAlgorithm;
/// use orbit_updater::verify::MultiHasher;
///
/// let mut hasher = MultiHasher::new([HashAlgorithm::Sha256]);
/// hasher.update(b"abc");
/// let digests = hasher.finalize();
/// assert!(digests[&HashAlgorithm::Sha256].as_str().starts_with("ba7816bf"));
/// ```
pub struct MultiHasher {
    states: Vec<(HashAlgorithm, HasherState)>,
}

impl MultiHasher {
    /// Create a hasher for the given algorithms.
    pub fn new(algorithms: impl IntoIterator<Item = HashAlgorithm>) -> Self {
        let states = algorithms
            .into_iter()
            .map(|algorithm| {
                let state = match algorithm {
                    HashAlgorithm::Sha256 => HasherState::Sha256(Sha256::new()),
                    HashAlgorithm::Sha512 => HasherState::Sha512(Sha512::new()),
                };
                (algorithm, state)
            })
            .collect();
        Self { states }
    }

    /// Feed bytes to every algorithm.
    pub fn update(&mut self, bytes: &[u8]) {
        for (_, state) in &mut self.states {
            match state {
                HasherState::Sha256(hasher) => hasher.update(bytes),
                HasherState::Sha512(hasher) => hasher.update(bytes),
            }
        }
    }

    /// Finish hashing and return one digest per algorithm.
    #[must_use]
    pub fn finalize(self) -> BTreeMap<HashAlgorithm, HexDigest> {
        self.states
            .into_iter()
            .map(|(algorithm, state)| {
                let hex = match state {
                    HasherState::Sha256(hasher) => format!("{:x}", hasher.finalize()),
                    HasherState::Sha512(hasher) => format!("{:x}", hasher.finalize()),
                };
                (algorithm, HexDigest::from_computed(hex))
            })
            .collect()
    }
}

/// Hash a file under each algorithm present in `meta` and compare.
///
/// The length is compared first so that an obviously different file is
/// rejected without hashing it.
///
/// # Errors
///
/// Returns [`VerifyError::NoHashes`] for metadata without hashes,
/// [`VerifyError::LengthMismatch`] or [`VerifyError::HashMismatch`] when the
/// file differs, and [`VerifyError::Io`] when it cannot be read.
pub fn check_file_hash(meta: &TargetMeta, path: &Utf8Path) -> Result<(), VerifyError> {
    if meta.hashes().is_empty() {
        return Err(VerifyError::NoHashes);
    }
    let actual_len = fs::metadata(path)?.len();
    if actual_len != meta.length() {
        return Err(VerifyError::LengthMismatch {
            expected: meta.length(),
            actual: actual_len,
        });
    }

    let mut file = fs::File::open(path)?;
    let mut hasher = MultiHasher::new(meta.hashes().keys().copied());
    let mut buffer = [0u8; BUFFER_SIZE];
    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(buffer.get(..bytes_read).unwrap_or_default());
    }
    compare_digests(meta, &hasher.finalize())
}

/// Stream `reader` into `dest`, enforcing the metadata length as a maximum
/// size and checking every listed hash once the stream ends.
///
/// Bytes past the limit are never written. On error the destination may hold
/// a prefix of the content; callers must discard it.
///
/// # Errors
///
/// Returns [`VerifyError::SizeExceeded`] when the stream is longer than the
/// metadata allows, [`VerifyError::LengthMismatch`] when it is shorter,
/// [`VerifyError::HashMismatch`] on a digest difference,
/// [`VerifyError::NoHashes`] for metadata without hashes, and
/// [`VerifyError::Io`] on read or write failures.
pub fn copy_verified(
    reader: &mut dyn Read,
    meta: &TargetMeta,
    dest: &mut dyn Write,
) -> Result<u64, VerifyError> {
    if meta.hashes().is_empty() {
        return Err(VerifyError::NoHashes);
    }
    let limit = meta.length();
    let mut hasher = MultiHasher::new(meta.hashes().keys().copied());
    let mut buffer = [0u8; BUFFER_SIZE];
    let mut total: u64 = 0;
    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        total = total.saturating_add(bytes_read as u64);
        if total > limit {
            return Err(VerifyError::SizeExceeded { limit });
        }
        let chunk = buffer.get(..bytes_read).unwrap_or_default();
        hasher.update(chunk);
        dest.write_all(chunk)?;
    }
    dest.flush()?;

    if total != limit {
        return Err(VerifyError::LengthMismatch {
            expected: limit,
            actual: total,
        });
    }
    compare_digests(meta, &hasher.finalize())?;
    Ok(total)
}

fn compare_digests(
    meta: &TargetMeta,
    actual: &BTreeMap<HashAlgorithm, HexDigest>,
) -> Result<(), VerifyError> {
    for (algorithm, expected) in meta.hashes() {
        match actual.get(algorithm) {
            Some(digest) if digest == expected => {}
            Some(digest) => {
                return Err(VerifyError::HashMismatch {
                    algorithm: *algorithm,
                    expected: expected.clone(),
                    actual: digest.clone(),
                });
            }
            None => {
                return Err(VerifyError::HashMismatch {
                    algorithm: *algorithm,
                    expected: expected.clone(),
                    actual: HexDigest::from_computed(String::new()),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::target_meta_for;
    use camino::Utf8PathBuf;
    use rstest::{fixture, rstest};

    const CONTENT: &[u8] = b"#!/bin/sh\necho 1.2.3\n";

    #[fixture]
    fn temp_file() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = Utf8PathBuf::try_from(dir.path().join("agent")).expect("UTF-8 path");
        fs::write(&path, CONTENT).expect("write file");
        (dir, path)
    }

    #[test]
    fn sha256_of_empty_input_is_well_known() {
        let digests = MultiHasher::new([HashAlgorithm::Sha256]).finalize();
        assert_eq!(
            digests[&HashAlgorithm::Sha256].as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[rstest]
    fn matching_file_passes(temp_file: (tempfile::TempDir, Utf8PathBuf)) {
        let (_dir, path) = temp_file;
        check_file_hash(&target_meta_for(CONTENT), &path).expect("hashes match");
    }

    #[rstest]
    fn changed_file_is_a_hash_mismatch(temp_file: (tempfile::TempDir, Utf8PathBuf)) {
        let (_dir, path) = temp_file;
        let mut other = CONTENT.to_vec();
        if let Some(first) = other.first_mut() {
            *first = b'?';
        }
        let err = check_file_hash(&target_meta_for(&other), &path).expect_err("mismatch");
        assert!(matches!(err, VerifyError::HashMismatch { .. }), "{err}");
    }

    #[rstest]
    fn truncated_file_is_a_length_mismatch(temp_file: (tempfile::TempDir, Utf8PathBuf)) {
        let (_dir, path) = temp_file;
        let meta = target_meta_for(b"a longer artifact than the one on disk");
        let err = check_file_hash(&meta, &path).expect_err("mismatch");
        assert!(matches!(err, VerifyError::LengthMismatch { .. }), "{err}");
    }

    #[rstest]
    fn metadata_without_hashes_never_validates(temp_file: (tempfile::TempDir, Utf8PathBuf)) {
        let (_dir, path) = temp_file;
        let meta = TargetMeta::new(CONTENT.len() as u64, BTreeMap::new()).expect("valid meta");
        let err = check_file_hash(&meta, &path).expect_err("no hashes");
        assert!(matches!(err, VerifyError::NoHashes));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = check_file_hash(&target_meta_for(CONTENT), Utf8Path::new("/nonexistent/agent"))
            .expect_err("missing");
        assert!(matches!(err, VerifyError::Io(_)));
    }

    #[test]
    fn copy_verified_writes_matching_content() {
        let mut dest = Vec::new();
        let copied = copy_verified(&mut &CONTENT[..], &target_meta_for(CONTENT), &mut dest)
            .expect("verified copy");
        assert_eq!(copied, CONTENT.len() as u64);
        assert_eq!(dest, CONTENT);
    }

    #[test]
    fn copy_verified_stops_at_the_size_limit() {
        let meta = target_meta_for(b"short");
        let mut dest = Vec::new();
        let err = copy_verified(&mut &CONTENT[..], &meta, &mut dest).expect_err("too long");
        assert!(matches!(err, VerifyError::SizeExceeded { limit: 5 }), "{err}");
        assert!(dest.len() <= 5);
    }

    #[test]
    fn copy_verified_rejects_tampered_content_of_equal_length() {
        let meta = target_meta_for(b"trusted!");
        let mut dest = Vec::new();
        let err = copy_verified(&mut &b"tampered"[..], &meta, &mut dest).expect_err("tampered");
        assert!(matches!(err, VerifyError::HashMismatch { .. }), "{err}");
    }
}
