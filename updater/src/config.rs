//! Updater options and their TOML loader.
//!
//! Options are deserialised from a TOML document in which every key is
//! optional; omitted keys fall back to [`Options::default`]. Unknown keys
//! are rejected so that typos do not silently select defaults.
//!
//! ```toml
//! root_directory = "/opt/orbit"
//! server_url = "https://tuf.example.com"
//! insecure_transport = false
//! platform = "linux"
//!
//! [channels]
//! orbit = "stable"
//! osqueryd = "beta"
//! ```

use crate::remote::{DEFAULT_TIMEOUT, TransportOptions};
use crate::trust::RootKey;
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Default update server.
pub const DEFAULT_SERVER_URL: &str = "https://tuf.fleetctl.com";

/// Default root keys used to bootstrap trust.
pub const DEFAULT_ROOT_KEYS: &str = r#"[{"keytype":"ed25519","scheme":"ed25519","keyid_hash_algorithms":["sha256","sha512"],"keyval":{"public":"6d71d3beac3b830be929f2b10d513448d49ec6bb62a680176b89ffdfca180eb4"}}]"#;

/// Default channel for every known target.
pub const DEFAULT_CHANNEL: &str = "stable";

/// Default smoke-test timeout in seconds.
pub const DEFAULT_SMOKE_TEST_TIMEOUT_SECS: u64 = 30;

/// Errors arising from loading or validating [`Options`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read options file {path}: {source}")]
    Read {
        /// Path of the file.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration document is not valid TOML for [`Options`].
    #[error("failed to parse options: {0}")]
    Parse(Box<toml::de::Error>),

    /// The root keys are not a JSON array of keys.
    #[error("unmarshal root keys: {0}")]
    RootKeys(#[from] serde_json::Error),

    /// A field holds an unusable value.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Name of the offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Options for constructing an [`Updater`](crate::updater::Updater).
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Options {
    /// Directory holding `bin/`, `staging/` and `locks/`.
    pub root_directory: Utf8PathBuf,
    /// URL of the update server.
    pub server_url: String,
    /// Skip TLS certificate verification. Target hashes are still checked.
    pub insecure_transport: bool,
    /// JSON array of root keys used to bootstrap trust.
    pub root_keys: String,
    /// Number of root signatures required.
    pub root_threshold: u32,
    /// Platform to install targets for. Defaults to the running platform.
    pub platform: String,
    /// Update channel per target name.
    pub channels: BTreeMap<String, String>,
    /// Seconds a staged binary may take to answer `--version`.
    pub smoke_test_timeout_secs: u64,
    /// Seconds each repository request may take.
    pub request_timeout_secs: u64,
}

impl Default for Options {
    fn default() -> Self {
        let channels = ["orbit", "osqueryd"]
            .into_iter()
            .map(|target| (target.to_owned(), DEFAULT_CHANNEL.to_owned()))
            .collect();
        Self {
            // Left empty when no data directory is known so that
            // `validate` rejects it.
            root_directory: default_root_directory().unwrap_or_default(),
            server_url: DEFAULT_SERVER_URL.to_owned(),
            insecure_transport: false,
            root_keys: DEFAULT_ROOT_KEYS.to_owned(),
            root_threshold: 1,
            platform: std::env::consts::OS.to_owned(),
            channels,
            smoke_test_timeout_secs: DEFAULT_SMOKE_TEST_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

impl Options {
    /// Load and validate options from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read, and any
    /// parse or validation error from [`Options::from_toml_str`].
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate options from a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed documents or unknown
    /// keys, and validation errors from [`Options::validate`].
    ///
    /// # Examples
    ///
    /// ```
    /// use orbit_updater::config::Options;
    ///
    /// let options = Options::from_toml_str("root_directory = \"/opt/orbit\"\n")
    ///     .expect("valid options");
    /// assert_eq!(options.root_directory, "/opt/orbit");
    /// assert_eq!(options.channel_for("orbit"), Some("stable"));
    /// ```
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let options: Self =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(Box::new(e)))?;
        options.validate()?;
        Ok(options)
    }

    /// Check that the options can drive an updater.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for an empty or relative root
    /// directory, a server URL that is not `http` or `https`, an empty
    /// platform, or a zero threshold, and
    /// [`ConfigError::RootKeys`] when the root keys do not parse.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.root_directory.as_str().is_empty() {
            return Err(invalid("root_directory", "must not be empty"));
        }
        if !self.root_directory.has_root() {
            return Err(invalid("root_directory", "must be an absolute path"));
        }
        if self.server_url.trim().is_empty() {
            return Err(invalid("server_url", "must not be empty"));
        }
        if !(self.server_url.starts_with("https://") || self.server_url.starts_with("http://")) {
            return Err(invalid("server_url", "expected an http or https URL"));
        }
        if self.platform.trim().is_empty() {
            return Err(invalid("platform", "must not be empty"));
        }
        if self.root_threshold == 0 {
            return Err(invalid("root_threshold", "must be at least 1"));
        }
        if let Some((target, _)) = self.channels.iter().find(|(_, c)| c.trim().is_empty()) {
            return Err(ConfigError::Invalid {
                field: "channels",
                reason: format!("channel for {target} must not be empty"),
            });
        }
        self.root_keys()?;
        Ok(())
    }

    /// Parse the configured root keys.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::RootKeys`] when the JSON is not a key array.
    pub fn root_keys(&self) -> Result<Vec<RootKey>, ConfigError> {
        Ok(RootKey::parse_list(&self.root_keys)?)
    }

    /// Return the configured channel for `target`.
    #[must_use]
    pub fn channel_for(&self, target: &str) -> Option<&str> {
        self.channels.get(target).map(String::as_str)
    }

    /// Return the smoke-test timeout.
    #[must_use]
    pub fn smoke_test_timeout(&self) -> Duration {
        Duration::from_secs(self.smoke_test_timeout_secs)
    }

    /// Return transport settings for an HTTP remote store.
    #[must_use]
    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            insecure_skip_verify: self.insecure_transport,
            timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}

/// Return the default root directory for the current platform.
///
/// The base directory comes from the per-user local data directory (for
/// example `~/.local/share/orbit` on many Linux distributions).
#[must_use]
pub fn default_root_directory() -> Option<Utf8PathBuf> {
    directories_next::ProjectDirs::from("com", "Orbit", "orbit")
        .and_then(|dirs| Utf8PathBuf::try_from(dirs.data_local_dir().to_path_buf()).ok())
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn defaults_are_valid() {
        let options = Options::default();
        options.validate().expect("defaults validate");
        assert_eq!(options.server_url, DEFAULT_SERVER_URL);
        assert_eq!(options.platform, std::env::consts::OS);
        assert_eq!(options.root_keys().expect("keys").len(), 1);
    }

    #[test]
    fn full_document_round_trips_into_fields() {
        let options = Options::from_toml_str(
            r#"
root_directory = "/opt/orbit"
server_url = "https://tuf.example.com"
insecure_transport = true
platform = "windows"
smoke_test_timeout_secs = 5

[channels]
orbit = "beta"
"#,
        )
        .expect("valid options");
        assert_eq!(options.root_directory, "/opt/orbit");
        assert!(options.transport_options().insecure_skip_verify);
        assert_eq!(options.channel_for("orbit"), Some("beta"));
        assert_eq!(options.channel_for("osqueryd"), None);
        assert_eq!(options.smoke_test_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = Options::from_toml_str("orbit_channel = \"stable\"\n").expect_err("unknown key");
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[rstest]
    #[case::relative_root("root_directory = \"orbit\"\n", "root_directory")]
    #[case::empty_url("server_url = \"\"\n", "server_url")]
    #[case::non_http_url("server_url = \"ftp://tuf.example.com\"\n", "server_url")]
    #[case::zero_threshold("root_threshold = 0\n", "root_threshold")]
    #[case::empty_platform("platform = \" \"\n", "platform")]
    #[case::empty_channel("[channels]\norbit = \"\"\n", "channels")]
    fn invalid_values_name_the_field(#[case] document: &str, #[case] field: &str) {
        let err = Options::from_toml_str(document).expect_err("invalid options");
        assert!(err.to_string().contains(field), "{err}");
    }

    #[test]
    fn missing_root_directory_is_rejected() {
        let options = Options {
            root_directory: Utf8PathBuf::new(),
            ..Options::default()
        };
        let err = options.validate().expect_err("no root directory");
        assert!(err.to_string().contains("root_directory"), "{err}");
    }

    #[test]
    fn malformed_root_keys_are_rejected() {
        let err = Options::from_toml_str("root_keys = \"{not json\"\n").expect_err("bad keys");
        assert!(matches!(err, ConfigError::RootKeys(_)));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Options::load(Utf8Path::new("/nonexistent/orbit.toml")).expect_err("missing");
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
