//! Transport abstraction over the identity-service HTTP session
//!
//! The client depends only on this trait, never on a concrete HTTP stack;
//! tests substitute scripted in-memory doubles.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use ecid_core::{Error, Result};
use tracing::{debug, warn};
use url::Url;

/// Abstract "send request, get bytes or error" capability plus session
/// lifecycle control
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a GET request and return the raw response body.
    ///
    /// An `Err` means a network/connectivity failure and is retryable; an
    /// unusable body is for the caller's parser to decide on.
    async fn send(&self, url: &Url) -> Result<Bytes>;

    /// Discard any session-level state (cookies, open connections)
    fn reset_session(&self);

    /// Tear the session down for good; no further sends are expected
    fn close(&self) {}
}

/// Production transport on top of reqwest.
///
/// No persistent cookie jar is configured, mirroring the service contract:
/// session cookies may ride along within one session but are dropped whenever
/// the session is reset. `reset_session` swaps the underlying client, which
/// discards connection pools and any session state with it.
pub struct HttpTransport {
    client: Mutex<reqwest::Client>,
    timeout: Duration,
}

impl HttpTransport {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new() -> Result<Self> {
        Self::with_timeout(Self::DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: Mutex::new(Self::build_client(timeout)?),
            timeout,
        })
    }

    fn build_client(timeout: Duration) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| Error::transport(format!("failed to build HTTP client: {err}")))
    }

    fn current_client(&self) -> reqwest::Client {
        // Lock held only to clone the handle; reqwest clients are cheap
        // Arc-backed clones.
        self.client
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, url: &Url) -> Result<Bytes> {
        let response = self
            .current_client()
            .get(url.clone())
            .send()
            .await
            .map_err(|err| Error::transport(err.to_string()))?;

        // The identity service signals problems in the body, not the status
        // line; a non-success status still gets handed to the parser.
        let status = response.status();
        if !status.is_success() {
            warn!(%status, "identity service returned a non-success status");
        }

        response
            .bytes()
            .await
            .map_err(|err| Error::transport(err.to_string()))
    }

    fn reset_session(&self) {
        debug!("resetting identity-service session");
        match Self::build_client(self.timeout) {
            Ok(fresh) => {
                *self
                    .client
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()) = fresh;
            }
            Err(err) => warn!(error = %err, "session reset failed; keeping existing session"),
        }
    }

    fn close(&self) {
        // reqwest tears the pool down when the last clone drops; nothing to
        // do eagerly.
    }
}
