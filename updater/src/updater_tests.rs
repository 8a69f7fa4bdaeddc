//! Unit tests for the updater facade.

use super::*;
use crate::config::DEFAULT_ROOT_KEYS;
use crate::error::ErrorKind;
use crate::locator::old_path;
use crate::remote::TransportOptions;
use crate::test_utils::{
    FakePlatform, MemoryRepository, RefreshBehaviour, SmokeBehaviour, StubExecutor,
    target_meta_for,
};
use rstest::{fixture, rstest};
use std::fs;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

const AGENT: &str = "agent/linux/stable/agent";
const V1: &[u8] = b"agent 1.0.0";
const V2: &[u8] = b"agent 2.0.0";

struct Harness {
    _dir: TempDir,
    root: Utf8PathBuf,
    repo: MemoryRepository,
}

impl Harness {
    fn options(&self) -> Options {
        Options {
            root_directory: self.root.clone(),
            platform: "linux".to_owned(),
            ..Options::default()
        }
    }

    fn updater(&self) -> Updater {
        self.updater_with(FakePlatform::named("linux"), SmokeBehaviour::Pass)
    }

    fn updater_with(&self, platform: FakePlatform, smoke: SmokeBehaviour) -> Updater {
        Updater::with_parts(
            self.options(),
            Box::new(self.repo.clone()),
            Box::new(platform),
            Box::new(StubExecutor::new(smoke)),
        )
        .expect("updater")
    }

    fn staging_is_empty(&self) -> bool {
        fs::read_dir(self.root.join("staging"))
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(true)
    }
}

#[fixture]
fn harness() -> Harness {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("UTF-8 path");
    let repo = MemoryRepository::new();
    repo.publish(AGENT, V1);
    Harness {
        _dir: dir,
        root,
        repo,
    }
}

#[rstest]
fn construction_creates_bin_directory(harness: Harness) {
    let updater = harness.updater();
    assert!(updater.locator().bin_dir().is_dir());
    assert!(harness.repo.init_calls().is_empty());
}

#[rstest]
fn from_options_hands_configured_transport_to_backend(harness: Harness) {
    let options = Options {
        server_url: "https://tuf.example.com/".to_owned(),
        insecure_transport: true,
        request_timeout_secs: 7,
        ..harness.options()
    };
    let repo = harness.repo.clone();

    let updater = Updater::from_options(options, |remote| {
        assert_eq!(
            remote.target_url(AGENT),
            "https://tuf.example.com/targets/agent/linux/stable/agent"
        );
        assert_eq!(
            remote.transport(),
            TransportOptions {
                insecure_skip_verify: true,
                timeout: std::time::Duration::from_secs(7),
            }
        );
        let client: BoxedTrustClient = Box::new(repo);
        Ok(client)
    })
    .expect("updater");

    updater.update_metadata().expect("refresh");
    assert_eq!(harness.repo.refresh_count(), 1);
}

#[rstest]
fn from_options_reports_backend_failure(harness: Harness) {
    let err = Updater::from_options(harness.options(), |_| {
        Err(TrustError::InvalidMetadata {
            reason: "bad root".to_owned(),
        })
    })
    .expect_err("backend fails");

    assert!(err.to_string().contains("create trust client"), "{err}");
    assert_eq!(err.kind(), ErrorKind::Verification);
}

#[rstest]
fn from_options_rejects_invalid_server_url(harness: Harness) {
    let options = Options {
        server_url: "tuf.example.com".to_owned(),
        ..harness.options()
    };
    let mut connected = false;

    let err = Updater::from_options(options, |_| {
        connected = true;
        Err(TrustError::NotInitialized)
    })
    .expect_err("invalid URL");

    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(!connected);
}

#[test]
fn construction_bootstraps_uninitialized_client() {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("UTF-8 path");
    let repo = MemoryRepository::uninitialized();
    let options = Options {
        root_directory: root,
        root_threshold: 1,
        ..Options::default()
    };

    Updater::with_parts(
        options,
        Box::new(repo.clone()),
        Box::new(FakePlatform::named("linux")),
        Box::new(StubExecutor::new(SmokeBehaviour::Pass)),
    )
    .expect("updater");

    let expected_keys = crate::trust::RootKey::parse_list(DEFAULT_ROOT_KEYS)
        .expect("default keys")
        .len();
    assert_eq!(repo.init_calls(), [(expected_keys, 1)]);
}

#[rstest]
fn construction_rejects_invalid_options(harness: Harness) {
    let options = Options {
        root_threshold: 0,
        ..harness.options()
    };
    let err = Updater::with_parts(
        options,
        Box::new(harness.repo.clone()),
        Box::new(FakePlatform::named("linux")),
        Box::new(StubExecutor::new(SmokeBehaviour::Pass)),
    )
    .expect_err("invalid options");
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[rstest]
fn paths_follow_configured_platform(harness: Harness) {
    let options = Options {
        platform: "windows".to_owned(),
        ..harness.options()
    };
    let updater = Updater::with_parts(
        options,
        Box::new(harness.repo.clone()),
        Box::new(FakePlatform::named("linux")),
        Box::new(StubExecutor::new(SmokeBehaviour::Pass)),
    )
    .expect("updater");

    assert_eq!(
        updater.repo_path("orbit", "stable"),
        "orbit/windows/stable/orbit.exe"
    );
    assert_eq!(
        updater.local_path("orbit", "stable"),
        harness.root.join("bin/orbit/windows/stable/orbit.exe")
    );
}

#[rstest]
#[case::ok(RefreshBehaviour::Ok)]
#[case::latest_snapshot(RefreshBehaviour::LatestSnapshot)]
fn update_metadata_succeeds(harness: Harness, #[case] behaviour: RefreshBehaviour) {
    harness.repo.set_refresh(behaviour);
    harness.updater().update_metadata().expect("refresh");
    assert_eq!(harness.repo.refresh_count(), 1);
}

#[rstest]
fn update_metadata_propagates_other_failures(harness: Harness) {
    harness
        .repo
        .set_refresh(RefreshBehaviour::Fail("expired timestamp".to_owned()));
    let err = harness.updater().update_metadata().expect_err("refresh fails");
    assert!(err.to_string().starts_with("update metadata"), "{err}");
    assert!(err.to_string().contains("expired timestamp"), "{err}");
}

#[rstest]
fn lookup_and_targets_read_through(harness: Harness) {
    let updater = harness.updater();
    assert_eq!(
        updater.lookup("agent", "stable").expect("lookup"),
        target_meta_for(V1)
    );
    let err = updater.lookup("agent", "edge").expect_err("unknown channel");
    assert!(err.to_string().starts_with("lookup agent@edge"), "{err}");

    let targets = updater.targets().expect("targets");
    assert_eq!(targets.keys().collect::<Vec<_>>(), [AGENT]);
}

#[rstest]
#[case::target("", "stable", "target is required")]
#[case::channel("agent", "", "channel is required")]
fn get_requires_target_and_channel(
    harness: Harness,
    #[case] target: &str,
    #[case] channel: &str,
    #[case] expected: &str,
) {
    let err = harness.updater().get(target, channel).expect_err("missing input");
    assert_eq!(err.to_string(), expected);
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(harness.repo.fetch_count(), 0);
}

#[rstest]
fn get_installs_then_reuses_cache(harness: Harness) {
    let updater = harness.updater();

    let first = updater.get("agent", "stable").expect("first get");
    let second = updater.get("agent", "stable").expect("second get");

    assert_eq!(first, harness.root.join("bin/agent/linux/stable/agent"));
    assert_eq!(first, second);
    assert_eq!(fs::read(&first).expect("artifact"), V1);
    assert_eq!(harness.repo.fetch_count_for(AGENT), 1);
    assert!(harness.staging_is_empty());
}

#[rstest]
fn get_redownloads_when_metadata_changes(harness: Harness) {
    let updater = harness.updater();
    let path = updater.get("agent", "stable").expect("first get");

    harness.repo.publish(AGENT, V2);
    updater.get("agent", "stable").expect("second get");

    assert_eq!(fs::read(&path).expect("artifact"), V2);
    assert_eq!(harness.repo.fetch_count_for(AGENT), 2);
}

#[rstest]
fn get_replaces_locally_modified_artifact(harness: Harness) {
    let updater = harness.updater();
    let path = updater.local_path("agent", "stable");
    fs::create_dir_all(path.parent().expect("parent")).expect("create dirs");
    fs::write(&path, b"agent 1.0.1").expect("write tampered artifact");

    updater.get("agent", "stable").expect("get");

    assert_eq!(fs::read(&path).expect("artifact"), V1);
    assert_eq!(harness.repo.fetch_count(), 1);
}

#[rstest]
fn get_rejects_directory_at_artifact_path(harness: Harness) {
    let updater = harness.updater();
    let path = updater.local_path("agent", "stable");
    fs::create_dir_all(&path).expect("create directory in the way");

    let err = updater.get("agent", "stable").expect_err("not a file");

    assert!(matches!(err, UpdateError::NotRegularFile { .. }), "{err}");
    assert!(path.is_dir());
    assert_eq!(harness.repo.fetch_count(), 0);
}

#[rstest]
fn get_fails_without_stale_fallback(harness: Harness) {
    let updater = harness.updater();
    let path = updater.get("agent", "stable").expect("first get");

    let other = MemoryRepository::new();
    let stale = Updater::with_parts(
        harness.options(),
        Box::new(other),
        Box::new(FakePlatform::named("linux")),
        Box::new(StubExecutor::new(SmokeBehaviour::Pass)),
    )
    .expect("updater");

    let err = stale.get("agent", "stable").expect_err("metadata missing");
    assert!(matches!(err, UpdateError::Metadata { .. }), "{err}");
    assert_eq!(fs::read(&path).expect("artifact"), V1);
}

#[rstest]
fn failed_update_keeps_previous_artifact(harness: Harness) {
    let updater = harness.updater();
    let path = updater.get("agent", "stable").expect("first get");

    harness.repo.publish(AGENT, V2);
    harness.repo.fail_fetch_after_partial(AGENT);
    let err = updater.get("agent", "stable").expect_err("fetch fails");

    assert_eq!(err.kind(), ErrorKind::Verification);
    assert_eq!(fs::read(&path).expect("artifact"), V1);
    assert!(harness.staging_is_empty());
}

#[rstest]
fn smoke_test_failure_keeps_previous_artifact(harness: Harness) {
    let path = harness.updater().get("agent", "stable").expect("first get");

    harness.repo.publish(AGENT, V2);
    let broken = harness.updater_with(
        FakePlatform::named("linux"),
        SmokeBehaviour::Fail("illegal instruction".to_owned()),
    );
    let err = broken.get("agent", "stable").expect_err("smoke test fails");

    assert!(matches!(err, UpdateError::SmokeTest { .. }), "{err}");
    assert_eq!(fs::read(&path).expect("artifact"), V1);
    assert!(harness.staging_is_empty());
}

#[rstest]
fn foreign_platform_skips_smoke_test(harness: Harness) {
    let updater = harness.updater_with(
        FakePlatform::named("macos"),
        SmokeBehaviour::Fail("exec format error".to_owned()),
    );
    let path = updater.get("agent", "stable").expect("get");
    assert_eq!(fs::read(&path).expect("artifact"), V1);
}

#[rstest]
fn rename_before_replace_keeps_old_artifact(harness: Harness) {
    let platform = FakePlatform {
        name: "linux",
        rename_before_replace: true,
    };
    let updater = harness.updater_with(platform, SmokeBehaviour::Pass);
    let path = updater.get("agent", "stable").expect("first get");

    harness.repo.publish(AGENT, V2);
    updater.get("agent", "stable").expect("second get");

    assert_eq!(fs::read(&path).expect("artifact"), V2);
    assert_eq!(fs::read(old_path(&path)).expect("old artifact"), V1);
}

#[rstest]
fn download_ignores_cache(harness: Harness) {
    let updater = harness.updater();
    let path = updater.get("agent", "stable").expect("get");

    updater.download(AGENT, &path).expect("download");

    assert_eq!(harness.repo.fetch_count_for(AGENT), 2);
    assert_eq!(fs::read(&path).expect("artifact"), V1);
}

#[rstest]
fn channels_share_staging_safely(harness: Harness) {
    harness.repo.publish("agent/linux/beta/agent", V2);
    let updater = Arc::new(harness.updater());

    let handles: Vec<_> = ["stable", "beta", "stable", "beta"]
        .into_iter()
        .map(|channel| {
            let updater = Arc::clone(&updater);
            thread::spawn(move || updater.get("agent", channel))
        })
        .collect();
    for handle in handles {
        handle.join().expect("thread").expect("get");
    }

    let stable = updater.local_path("agent", "stable");
    let beta = updater.local_path("agent", "beta");
    assert_eq!(fs::read(stable).expect("stable"), V1);
    assert_eq!(fs::read(beta).expect("beta"), V2);
    assert!(harness.staging_is_empty());
}
