//! Shared test utilities for the updater crate.
//!
//! Available to unit tests and, through the `test-support` feature, to
//! integration tests. Nothing here performs network access.

use crate::digest::HashAlgorithm;
use crate::exec::CommandExecutor;
use crate::platform::{Platform, executable_extension};
use crate::trust::{RootKey, TargetFiles, TargetMeta, TrustClient, TrustError};
use crate::verify::{MultiHasher, VerifyError, copy_verified};
use camino::Utf8Path;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Write};
use std::process::{ExitStatus, Output};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Creates an `ExitStatus` from an exit code (Unix implementation).
#[cfg(unix)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;

    ExitStatus::from_raw(code << 8)
}

/// Creates an `ExitStatus` from an exit code (Windows implementation).
#[cfg(windows)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;

    ExitStatus::from_raw(code.unsigned_abs())
}

/// Build metadata describing `bytes` with SHA-256 and SHA-512 digests.
#[must_use]
pub fn target_meta_for(bytes: &[u8]) -> TargetMeta {
    let mut hasher = MultiHasher::new(HashAlgorithm::ALL);
    hasher.update(bytes);
    TargetMeta::new(bytes.len() as u64, hasher.finalize())
        .unwrap_or_else(|e| panic!("computed digests are well formed: {e}"))
}

/// How [`MemoryRepository::refresh_metadata`] responds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RefreshBehaviour {
    /// Refresh succeeds.
    #[default]
    Ok,
    /// Refresh reports that metadata is already current.
    LatestSnapshot,
    /// Refresh fails with invalid metadata.
    Fail(String),
}

#[derive(Debug, Default)]
struct RepositoryState {
    initialized: bool,
    init_calls: Vec<(usize, u32)>,
    refresh: RefreshBehaviour,
    refresh_calls: usize,
    metas: TargetFiles,
    contents: BTreeMap<String, Vec<u8>>,
    partial_failures: BTreeSet<String>,
    fetches: Vec<String>,
    resolves: usize,
}

/// In-memory [`TrustClient`] serving published targets.
///
/// Clones share state, so a test can keep a handle for assertions after
/// moving a clone into an [`Updater`](crate::updater::Updater). Fetched
/// bytes are checked against metadata with [`copy_verified`], the same way
/// a real client must.
#[derive(Debug, Clone)]
pub struct MemoryRepository {
    state: Arc<Mutex<RepositoryState>>,
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRepository {
    /// Create an initialized repository with no targets.
    #[must_use]
    pub fn new() -> Self {
        let state = RepositoryState {
            initialized: true,
            ..RepositoryState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Create a repository that reports no stored root of trust.
    #[must_use]
    pub fn uninitialized() -> Self {
        let repo = Self::new();
        repo.state().initialized = false;
        repo
    }

    fn state(&self) -> MutexGuard<'_, RepositoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish `bytes` at `path`, replacing any previous version.
    pub fn publish(&self, path: &str, bytes: &[u8]) {
        let mut state = self.state();
        state.metas.insert(path.to_owned(), target_meta_for(bytes));
        state.contents.insert(path.to_owned(), bytes.to_vec());
    }

    /// Serve `bytes` for `path` while keeping its published metadata.
    pub fn serve_tampered(&self, path: &str, bytes: &[u8]) {
        self.state().contents.insert(path.to_owned(), bytes.to_vec());
    }

    /// Make fetches of `path` fail after writing part of the content.
    pub fn fail_fetch_after_partial(&self, path: &str) {
        self.state().partial_failures.insert(path.to_owned());
    }

    /// Choose how metadata refreshes respond.
    pub fn set_refresh(&self, behaviour: RefreshBehaviour) {
        self.state().refresh = behaviour;
    }

    /// Return `(key count, threshold)` for every `init` call.
    #[must_use]
    pub fn init_calls(&self) -> Vec<(usize, u32)> {
        self.state().init_calls.clone()
    }

    /// Return how many refreshes were requested.
    #[must_use]
    pub fn refresh_count(&self) -> usize {
        self.state().refresh_calls
    }

    /// Return how many fetches were requested across all targets.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.state().fetches.len()
    }

    /// Return how many fetches of `path` were requested.
    #[must_use]
    pub fn fetch_count_for(&self, path: &str) -> usize {
        self.state().fetches.iter().filter(|p| *p == path).count()
    }

    /// Return how many metadata lookups were requested.
    #[must_use]
    pub fn resolve_count(&self) -> usize {
        self.state().resolves
    }
}

impl TrustClient for MemoryRepository {
    fn is_initialized(&self) -> Result<bool, TrustError> {
        Ok(self.state().initialized)
    }

    fn init(&self, root_keys: &[RootKey], threshold: u32) -> Result<(), TrustError> {
        let mut state = self.state();
        state.init_calls.push((root_keys.len(), threshold));
        state.initialized = true;
        Ok(())
    }

    fn refresh_metadata(&self) -> Result<(), TrustError> {
        let mut state = self.state();
        if !state.initialized {
            return Err(TrustError::NotInitialized);
        }
        state.refresh_calls += 1;
        match &state.refresh {
            RefreshBehaviour::Ok => Ok(()),
            RefreshBehaviour::LatestSnapshot => Err(TrustError::LatestSnapshot { version: 1 }),
            RefreshBehaviour::Fail(reason) => Err(TrustError::InvalidMetadata {
                reason: reason.clone(),
            }),
        }
    }

    fn resolve_target(&self, path: &str) -> Result<TargetMeta, TrustError> {
        let mut state = self.state();
        state.resolves += 1;
        state
            .metas
            .get(path)
            .cloned()
            .ok_or_else(|| TrustError::UnknownTarget {
                path: path.to_owned(),
            })
    }

    fn targets(&self) -> Result<TargetFiles, TrustError> {
        Ok(self.state().metas.clone())
    }

    fn fetch_target(&self, path: &str, dest: &mut dyn Write) -> Result<(), TrustError> {
        let (meta, content, fail_partway) = {
            let mut state = self.state();
            state.fetches.push(path.to_owned());
            let meta = state
                .metas
                .get(path)
                .cloned()
                .ok_or_else(|| TrustError::UnknownTarget {
                    path: path.to_owned(),
                })?;
            let content = state.contents.get(path).cloned().unwrap_or_default();
            (meta, content, state.partial_failures.contains(path))
        };

        if fail_partway {
            let half = content.get(..content.len() / 2).unwrap_or_default();
            dest.write_all(half)?;
            return Err(TrustError::Io(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset mid-transfer",
            )));
        }

        copy_verified(&mut content.as_slice(), &meta, dest)?;
        Ok(())
    }
}

/// How [`StubExecutor`] responds to a smoke test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmokeBehaviour {
    /// Exit zero with a version string.
    Pass,
    /// Exit non-zero with the given stderr.
    Fail(String),
    /// Fail to spawn.
    SpawnError,
}

/// A stub [`CommandExecutor`] that records invoked programs.
#[derive(Debug)]
pub struct StubExecutor {
    behaviour: SmokeBehaviour,
    calls: Mutex<Vec<String>>,
}

impl StubExecutor {
    /// Create a stub answering every invocation with `behaviour`.
    #[must_use]
    pub fn new(behaviour: SmokeBehaviour) -> Self {
        Self {
            behaviour,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Return the programs invoked so far.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl CommandExecutor for StubExecutor {
    fn run(&self, program: &Utf8Path, _args: &[&str], _timeout: Duration) -> io::Result<Output> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(program.to_string());
        match &self.behaviour {
            SmokeBehaviour::Pass => Ok(Output {
                status: exit_status(0),
                stdout: b"1.0.0\n".to_vec(),
                stderr: Vec::new(),
            }),
            SmokeBehaviour::Fail(stderr) => Ok(Output {
                status: exit_status(1),
                stdout: Vec::new(),
                stderr: stderr.as_bytes().to_vec(),
            }),
            SmokeBehaviour::SpawnError => Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "permission denied",
            )),
        }
    }
}

/// A [`Platform`] with a configurable name and replace behaviour and no-op
/// permission hooks.
#[derive(Debug, Clone, Copy)]
pub struct FakePlatform {
    /// Name reported as the running platform.
    pub name: &'static str,
    /// Whether replacing a file requires renaming it away first.
    pub rename_before_replace: bool,
}

impl FakePlatform {
    /// A platform named `name` that replaces files in place.
    #[must_use]
    pub fn named(name: &'static str) -> Self {
        Self {
            name,
            rename_before_replace: false,
        }
    }
}

impl Platform for FakePlatform {
    fn name(&self) -> &'static str {
        self.name
    }

    fn executable_extension(&self, platform: &str) -> &'static str {
        executable_extension(platform)
    }

    fn chmod_executable_directory(&self, _path: &Utf8Path) -> io::Result<()> {
        Ok(())
    }

    fn chmod_executable(&self, _path: &Utf8Path) -> io::Result<()> {
        Ok(())
    }

    fn rename_before_replace(&self) -> bool {
        self.rename_before_replace
    }

    fn rename(&self, from: &Utf8Path, to: &Utf8Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }
}

/// Return whether `err` reports a content verification failure.
#[must_use]
pub fn is_verification_failure(err: &TrustError) -> bool {
    matches!(
        err,
        TrustError::Verification(
            VerifyError::HashMismatch { .. }
                | VerifyError::LengthMismatch { .. }
                | VerifyError::SizeExceeded { .. }
        )
    )
}
