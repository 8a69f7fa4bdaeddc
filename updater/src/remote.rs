//! HTTP transport for trust metadata repositories.
//!
//! [`RemoteStore`] is the raw byte source a [`TrustClient`] backend reads
//! metadata documents and target files from. [`HttpRemoteStore`] serves it
//! over HTTP(S) with `ureq`. TLS certificate verification can be switched
//! off; target content is still hash-verified end to end by the trust
//! client, so a tampering intermediary is detected either way.
//!
//! [`TrustClient`]: crate::trust::TrustClient

use std::io::Read;
use std::time::Duration;

/// Default request timeout for repository downloads.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Directory under the server root holding target files.
const TARGETS_PREFIX: &str = "targets";

/// Errors arising from remote store requests.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// The server URL could not be used.
    #[error("invalid server URL \"{url}\": {reason}")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The HTTP request failed.
    #[error("request failed for {url}: {reason}")]
    Http {
        /// The URL that was requested.
        url: String,
        /// A human-readable description of the failure.
        reason: String,
    },

    /// The requested file does not exist on the server (HTTP 404).
    #[error("remote file not found: {url}")]
    NotFound {
        /// The URL that returned 404.
        url: String,
    },
}

/// Transport settings for [`HttpRemoteStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportOptions {
    /// Skip TLS certificate verification.
    pub insecure_skip_verify: bool,
    /// Overall timeout for each request, including the body.
    pub timeout: Duration,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            insecure_skip_verify: false,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// A response body with its advertised length.
pub struct RemoteBody {
    /// Reader over the body bytes.
    pub reader: Box<dyn Read + Send>,
    /// Length from the `Content-Length` header, when present.
    pub length: Option<u64>,
}

/// Source of raw repository files.
#[cfg_attr(test, mockall::automock)]
pub trait RemoteStore {
    /// Fetch a metadata document such as `timestamp.json`.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::NotFound`] for missing files and
    /// [`RemoteError::Http`] for any other request failure.
    fn fetch_meta(&self, name: &str) -> Result<RemoteBody, RemoteError>;

    /// Fetch a target file by repository path.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::NotFound`] for missing files and
    /// [`RemoteError::Http`] for any other request failure.
    fn fetch_target(&self, path: &str) -> Result<RemoteBody, RemoteError>;
}

/// [`RemoteStore`] over HTTP(S).
pub struct HttpRemoteStore {
    base_url: String,
    transport: TransportOptions,
    agent: ureq::Agent,
}

impl HttpRemoteStore {
    /// Create a store rooted at `server_url`.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::InvalidUrl`] unless the URL is `http` or
    /// `https`.
    ///
    /// # Examples
    ///
    /// ```
    /// use orbit_updater::remote::{HttpRemoteStore, TransportOptions};
    ///
    /// let store = HttpRemoteStore::new("https://tuf.example.com/", TransportOptions::default())
    ///     .expect("valid URL");
    /// assert_eq!(store.meta_url("root.json"), "https://tuf.example.com/root.json");
    /// ```
    pub fn new(server_url: &str, options: TransportOptions) -> Result<Self, RemoteError> {
        let base_url = server_url.trim_end_matches('/');
        if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
            return Err(RemoteError::InvalidUrl {
                url: server_url.to_owned(),
                reason: "expected an http or https URL".to_owned(),
            });
        }
        Ok(Self {
            base_url: base_url.to_owned(),
            transport: options,
            agent: build_agent(options),
        })
    }

    /// Return the transport settings the store was built with.
    #[must_use]
    pub fn transport(&self) -> TransportOptions {
        self.transport
    }

    /// Return the URL of a metadata document.
    #[must_use]
    pub fn meta_url(&self, name: &str) -> String {
        format!("{}/{}", self.base_url, name.trim_start_matches('/'))
    }

    /// Return the URL of a target file.
    #[must_use]
    pub fn target_url(&self, path: &str) -> String {
        format!(
            "{}/{TARGETS_PREFIX}/{}",
            self.base_url,
            path.trim_start_matches('/')
        )
    }

    fn get(&self, url: &str) -> Result<RemoteBody, RemoteError> {
        let response = self
            .agent
            .get(url)
            .call()
            .map_err(|e| map_ureq_error(url, &e))?;
        let length = response
            .headers()
            .get(ureq::http::header::CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok());
        Ok(RemoteBody {
            reader: Box::new(response.into_body().into_reader()),
            length,
        })
    }
}

impl RemoteStore for HttpRemoteStore {
    fn fetch_meta(&self, name: &str) -> Result<RemoteBody, RemoteError> {
        self.get(&self.meta_url(name))
    }

    fn fetch_target(&self, path: &str) -> Result<RemoteBody, RemoteError> {
        self.get(&self.target_url(path))
    }
}

fn build_agent(options: TransportOptions) -> ureq::Agent {
    let tls = ureq::tls::TlsConfig::builder()
        .disable_verification(options.insecure_skip_verify)
        .build();
    let config = ureq::Agent::config_builder()
        .timeout_global(Some(options.timeout))
        .tls_config(tls)
        .build();
    ureq::Agent::new_with_config(config)
}

fn map_ureq_error(url: &str, err: &ureq::Error) -> RemoteError {
    match err {
        ureq::Error::StatusCode(404) => RemoteError::NotFound {
            url: url.to_owned(),
        },
        other => RemoteError::Http {
            url: url.to_owned(),
            reason: other.to_string(),
        },
    }
}
