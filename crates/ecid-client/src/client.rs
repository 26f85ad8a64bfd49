//! Identity service client
//!
//! Wraps every network operation in the per-request retry loop and the
//! degraded-merge fallback: a malformed response never erases a known-good
//! identifier, and transport failures are resubmitted until the configured
//! budget runs out.

use std::sync::{Arc, Mutex};

use ecid_core::types::{parse_fields, AuthState, VisitorConfig, VisitorRecord};
use ecid_core::{Error, Result, RetryScheduler};
use tracing::{debug, warn};
use url::Url;

use crate::transport::Transport;
use crate::urls;

/// Client for the identity-service operations.
///
/// Stateless apart from the cached last-observed record, which is only ever
/// used as a fallback merge target; the lifecycle manager stays the source of
/// truth for persistence decisions.
pub struct VisitorApiClient {
    transport: Arc<dyn Transport>,
    org_id: String,
    endpoint: Url,
    scheduler: RetryScheduler,
    max_retries: u32,
    last_known: Mutex<Option<VisitorRecord>>,
}

impl VisitorApiClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        config: &VisitorConfig,
        scheduler: RetryScheduler,
    ) -> Self {
        Self {
            transport,
            org_id: config.org_id.clone(),
            endpoint: config.endpoint.clone(),
            scheduler,
            max_retries: config.max_retries,
            last_known: Mutex::new(None),
        }
    }

    /// Request a brand-new identifier for a visitor with no prior record
    pub async fn fetch_new(&self) -> Result<VisitorRecord> {
        let url = urls::new_visitor_url(&self.endpoint, &self.org_id, None);
        self.send_request(url, None).await
    }

    /// Refresh an identifier whose TTL has lapsed, hinting the service with
    /// the existing value
    pub async fn refresh(&self, existing_id: &str) -> Result<VisitorRecord> {
        let url = urls::new_visitor_url(&self.endpoint, &self.org_id, Some(existing_id));
        self.send_request(url, None).await
    }

    /// Link a known visitor ID to an existing identifier.
    ///
    /// A link always yields an identifier: the identity is already known, so
    /// when the service response omits it, the input identifier is
    /// substituted.
    pub async fn link_known(
        &self,
        known_id: &str,
        data_provider_id: &str,
        existing_id: &str,
        auth_state: Option<AuthState>,
    ) -> Result<VisitorRecord> {
        if existing_id.is_empty() {
            return Err(Error::MissingExperienceCloudId);
        }
        let cid = urls::composite_cid(data_provider_id, known_id, auth_state);
        let url = urls::link_url(&self.endpoint, existing_id, &cid);
        self.send_request(url, Some(existing_id)).await
    }

    /// Fetch a new identifier and immediately link a known visitor ID to it.
    /// The first step guarantees an identifier, so the second never starts
    /// without one.
    pub async fn fetch_new_and_link(
        &self,
        known_id: &str,
        data_provider_id: &str,
        auth_state: Option<AuthState>,
    ) -> Result<VisitorRecord> {
        let fresh = self.fetch_new().await?;
        self.link_known(
            known_id,
            data_provider_id,
            &fresh.experience_cloud_id,
            auth_state,
        )
        .await
    }

    /// Tell the transport to discard session-level state (used before a
    /// fresh fetch after an explicit reset)
    pub fn reset_transport(&self) {
        self.transport.reset_session();
    }

    /// Replace the cached last-observed record
    pub fn remember(&self, record: Option<VisitorRecord>) {
        *self.lock_last_known() = record;
    }

    /// The last record this client observed, if any
    pub fn last_known(&self) -> Option<VisitorRecord> {
        self.lock_last_known().clone()
    }

    /// Send `url`, retrying the identical request on transport failure until
    /// the budget is exhausted, then parse the body with the degraded-merge
    /// fallback. `fallback_id` is the link-operation substitute identifier.
    async fn send_request(&self, url: Url, fallback_id: Option<&str>) -> Result<VisitorRecord> {
        let mut attempt: u32 = 0;
        let body = loop {
            match self.transport.send(&url).await {
                Ok(body) => break body,
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    debug!(attempt, max_retries = self.max_retries, error = %err, "identity request failed; scheduling retry");
                    self.scheduler.pause().await;
                }
                Err(err) if err.is_retryable() => {
                    warn!(attempts = attempt + 1, error = %err, "identity request failed; budget exhausted");
                    return Err(Error::retries_exhausted(attempt + 1, err));
                }
                Err(err) => return Err(err),
            }
        };

        let fields = parse_fields(&body);
        let record = match VisitorRecord::from_fields(&fields) {
            Some(record) => record,
            None => match (self.last_known(), fallback_id) {
                // A malformed or partial response must not erase a
                // known-good identifier.
                (Some(prior), _) => {
                    debug!("response lacked an identifier; merging into last known record");
                    prior.merged(&fields)
                }
                (None, Some(existing_id)) => {
                    debug!("link response omitted the identifier; substituting the input");
                    VisitorRecord::new(existing_id).merged(&fields)
                }
                (None, None) => return Err(Error::InvalidResponse),
            },
        };
        self.remember(Some(record.clone()));
        Ok(record)
    }

    fn lock_last_known(&self) -> std::sync::MutexGuard<'_, Option<VisitorRecord>> {
        self.last_known
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
