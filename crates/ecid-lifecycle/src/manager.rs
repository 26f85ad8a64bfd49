//! Visitor-identifier lifecycle
//!
//! The manager owns the single source of truth for "what is the current
//! visitor identifier". All mutations funnel through it: startup seeding,
//! network completions, explicit resets. Shared state lives behind one
//! `std::sync::Mutex` that is never held across an `.await`; network
//! completions take the lock in completion order, so when two operations
//! overlap the later completion wins.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use ecid_client::{Transport, VisitorApiClient};
use ecid_core::retry::DEFAULT_JITTER_RANGE_SECS;
use ecid_core::types::{AuthState, VisitorConfig, VisitorRecord};
use ecid_core::{Error, IdentifierNotifier, Result, RetryScheduler};
use tracing::{debug, info, warn};
use url::Url;

use crate::params;
use crate::store::VisitorStore;

/// What to do with an outbound dispatch right now
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchDecision {
    /// An identifier exists; decorate the dispatch with these parameters
    Decorate { params: Vec<(String, String)> },
    /// No identifier yet but none of the attempts failed terminally; hold
    /// the dispatch until one arrives
    Queue { reason: &'static str },
    /// No identifier and the last attempt failed; send undecorated rather
    /// than hold traffic forever
    Fail { reason: &'static str },
}

#[derive(Default)]
struct ManagerState {
    current: Option<VisitorRecord>,
    /// Rendered message of the most recent operation failure
    last_error: Option<String>,
}

struct Inner {
    config: VisitorConfig,
    client: VisitorApiClient,
    store: Arc<dyn VisitorStore>,
    notifier: IdentifierNotifier,
    state: Mutex<ManagerState>,
}

/// Manages the visitor identifier across the process lifetime.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct VisitorLifecycleManager {
    inner: Arc<Inner>,
}

impl VisitorLifecycleManager {
    /// Build a manager with the production retry delay (one jittered value
    /// drawn for the whole manager lifetime)
    pub fn new(
        config: VisitorConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn VisitorStore>,
    ) -> Self {
        Self::with_scheduler(
            config,
            transport,
            store,
            RetryScheduler::jittered(DEFAULT_JITTER_RANGE_SECS),
        )
    }

    pub fn with_scheduler(
        config: VisitorConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn VisitorStore>,
        scheduler: RetryScheduler,
    ) -> Self {
        let client = VisitorApiClient::new(transport, &config, scheduler);
        Self {
            inner: Arc::new(Inner {
                config,
                client,
                store,
                notifier: IdentifierNotifier::new(),
                state: Mutex::new(ManagerState::default()),
            }),
        }
    }

    /// Bring the manager to a steady state: seed from configuration or the
    /// persisted record, then fetch, link or refresh as needed.
    ///
    /// Failures are recorded in the error slot rather than returned; a host
    /// calling `initialize` has nothing useful to do with a network error.
    pub async fn initialize(&self) {
        let stored = self.inner.store.retrieve().await;
        // A configured identifier overrides a differing persisted record.
        let seeded = match &self.inner.config.existing_identifier {
            Some(existing)
                if stored
                    .as_ref()
                    .map(|record| record.experience_cloud_id.as_str())
                    != Some(existing.as_str()) =>
            {
                info!(ecid = %existing, "adopting configured identifier over persisted record");
                Some(VisitorRecord::new(existing.clone()))
            }
            _ => stored,
        };

        let has_record = seeded.is_some();
        if let Some(record) = seeded {
            self.adopt_record(record).await;
        }

        // A configured known-ID pair always takes the link transition, with
        // or without an existing record (linking falls back to
        // fetch-and-link when no identifier exists yet). Staleness only
        // matters when there is nothing to link.
        if self.inner.config.known_identifier_pair().is_some() {
            let _ = self.link_from_config().await;
        } else if !has_record {
            let _ = self.fetch_new().await;
        } else {
            let needs_refresh = self
                .lock_state()
                .current
                .as_ref()
                .is_some_and(VisitorRecord::should_refresh);
            if needs_refresh {
                let _ = self.refresh().await;
            }
        }
    }

    /// Fetch a brand-new identifier from the service
    pub async fn fetch_new(&self) -> Result<VisitorRecord> {
        self.run_operation("fetch_new", self.inner.client.fetch_new())
            .await
    }

    /// Link a known visitor ID to the current identifier, fetching a fresh
    /// identifier first when none exists yet
    pub async fn link_to_known_identifier(
        &self,
        known_id: &str,
        data_provider_id: &str,
        auth_state: Option<AuthState>,
    ) -> Result<VisitorRecord> {
        match self.current_identifier() {
            Some(existing_id) => {
                self.run_operation(
                    "link_known",
                    self.inner
                        .client
                        .link_known(known_id, data_provider_id, &existing_id, auth_state),
                )
                .await
            }
            None => {
                self.run_operation(
                    "fetch_new_and_link",
                    self.inner
                        .client
                        .fetch_new_and_link(known_id, data_provider_id, auth_state),
                )
                .await
            }
        }
    }

    /// Refresh the current identifier's TTL, or fetch a new one when no
    /// identifier exists
    pub async fn refresh(&self) -> Result<VisitorRecord> {
        match self.current_identifier() {
            Some(existing_id) => {
                self.run_operation("refresh", self.inner.client.refresh(&existing_id))
                    .await
            }
            None => self.fetch_new().await,
        }
    }

    /// Forget the current identifier entirely and start over.
    ///
    /// Clears the in-memory record, deletes the persisted copy, drops the
    /// notifier's replay value and resets the transport session, then kicks
    /// off a background fetch for a fresh identifier. An operation already
    /// in flight is not cancelled; if it completes after the reset its
    /// record lands as the new current one.
    pub async fn reset(&self) {
        info!("resetting visitor identifier");
        self.lock_state().current = None;
        self.inner.client.remember(None);
        if let Err(err) = self.inner.store.delete().await {
            warn!(error = %err, "failed to delete persisted visitor record during reset");
        }
        self.inner.notifier.clear();
        self.inner.client.reset_transport();

        let manager = self.clone();
        tokio::spawn(async move {
            let _ = manager.fetch_new().await;
        });
    }

    /// The current identifier, if one is known
    pub fn current_identifier(&self) -> Option<String> {
        self.lock_state()
            .current
            .as_ref()
            .map(|record| record.experience_cloud_id.clone())
    }

    /// The full current record, if one is known
    pub fn current_record(&self) -> Option<VisitorRecord> {
        self.lock_state().current.clone()
    }

    /// Rendered message of the most recent operation failure, cleared by the
    /// next success
    pub fn last_error(&self) -> Option<String> {
        self.lock_state().last_error.clone()
    }

    /// Decide what an outbound dispatch should do right now
    pub fn dispatch_decision(&self) -> DispatchDecision {
        let state = self.lock_state();
        match (&state.current, &state.last_error) {
            (Some(record), _) => DispatchDecision::Decorate {
                params: params::decoration_params(
                    Some(&record.experience_cloud_id),
                    &self.inner.config.org_id,
                ),
            },
            (None, None) => DispatchDecision::Queue {
                reason: "waiting for visitor identifier",
            },
            (None, Some(_)) => DispatchDecision::Fail {
                reason: "visitor identifier unavailable",
            },
        }
    }

    /// Wait for an identifier outcome and return the decoration query
    /// parameters. Empty when the outcome was "no identifier".
    pub async fn provide_parameters(&self) -> Vec<(String, String)> {
        let receiver = self.inner.notifier.subscribe_once();
        match receiver.await {
            Ok(ecid) => params::decoration_params(ecid.as_deref(), &self.inner.config.org_id),
            Err(_) => Vec::new(),
        }
    }

    /// Append the decoration parameter to `url` once an identifier outcome
    /// is known; a "no identifier" outcome leaves the URL untouched
    pub async fn decorate_url(&self, url: &mut Url) {
        if let Ok(Some(ecid)) = self.inner.notifier.subscribe_once().await {
            params::decorate_url(url, &ecid, &self.inner.config.org_id);
        }
    }

    /// Run one client operation and fold its outcome into the shared state
    async fn run_operation<F>(&self, label: &'static str, op: F) -> Result<VisitorRecord>
    where
        F: Future<Output = Result<VisitorRecord>>,
    {
        debug!(operation = label, "starting identity operation");
        match op.await {
            Ok(record) => {
                info!(operation = label, ecid = %record.experience_cloud_id, "identity operation succeeded");
                self.apply_success(record.clone()).await;
                Ok(record)
            }
            Err(err) => {
                warn!(operation = label, error = %err, "identity operation failed");
                self.apply_error(&err);
                Err(err)
            }
        }
    }

    /// Completion-order application of a successful operation
    async fn apply_success(&self, record: VisitorRecord) {
        {
            let mut state = self.lock_state();
            state.last_error = None;
            state.current = Some(record.clone());
        }
        self.persist_and_publish(record).await;
    }

    /// Seed a record that did not come from the network (persisted or
    /// configured); leaves the error slot untouched
    async fn adopt_record(&self, record: VisitorRecord) {
        self.lock_state().current = Some(record.clone());
        self.persist_and_publish(record).await;
    }

    async fn persist_and_publish(&self, record: VisitorRecord) {
        self.inner.client.remember(Some(record.clone()));
        if let Err(err) = self.inner.store.save(&record).await {
            // The identifier stays usable in memory even when persistence
            // fails.
            warn!(error = %err, "failed to persist visitor record");
        }
        self.inner.notifier.publish(Some(record.experience_cloud_id));
    }

    /// An operation failure never discards a known identifier; with no
    /// identifier at all, waiting decoration calls are unblocked with `None`.
    fn apply_error(&self, err: &Error) {
        let no_identifier = {
            let mut state = self.lock_state();
            state.last_error = Some(err.to_string());
            state.current.is_none()
        };
        if no_identifier {
            self.inner.notifier.publish(None);
        }
    }

    async fn link_from_config(&self) -> Result<VisitorRecord> {
        // Caller checked the pair is present.
        let (known_id, data_provider_id) = match self.inner.config.known_identifier_pair() {
            Some((known_id, data_provider_id)) => {
                (known_id.to_string(), data_provider_id.to_string())
            }
            None => return self.fetch_new().await,
        };
        self.link_to_known_identifier(&known_id, &data_provider_id, self.inner.config.auth_state)
            .await
    }

    fn lock_state(&self) -> MutexGuard<'_, ManagerState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicU32, Ordering};

    const RESPONSE: &str =
        r#"{"d_mid":"12345","dcs_region":"6","id_sync_ttl":"604800","d_blob":"wxyz5432"}"#;

    struct StaticTransport {
        body: Option<&'static str>,
        sends: AtomicU32,
    }

    impl StaticTransport {
        fn answering(body: &'static str) -> Arc<Self> {
            Arc::new(Self {
                body: Some(body),
                sends: AtomicU32::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                body: None,
                sends: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl Transport for StaticTransport {
        async fn send(&self, _url: &Url) -> Result<Bytes> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            match self.body {
                Some(body) => Ok(Bytes::from_static(body.as_bytes())),
                None => Err(Error::transport("connection refused")),
            }
        }

        fn reset_session(&self) {}
    }

    fn manager_with(
        config: VisitorConfig,
        transport: Arc<StaticTransport>,
        store: Arc<MemoryStore>,
    ) -> VisitorLifecycleManager {
        VisitorLifecycleManager::with_scheduler(
            config,
            transport,
            store,
            RetryScheduler::immediate(),
        )
    }

    #[tokio::test]
    async fn fetch_new_sets_and_persists_the_record() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager_with(
            VisitorConfig::new("ABC123").unwrap(),
            StaticTransport::answering(RESPONSE),
            store.clone(),
        );

        let record = manager.fetch_new().await.unwrap();
        assert_eq!(record.experience_cloud_id, "12345");
        assert_eq!(manager.current_identifier().as_deref(), Some("12345"));
        assert_eq!(store.retrieve().await, Some(record));
        assert!(manager.last_error().is_none());
    }

    #[tokio::test]
    async fn failure_records_the_error_without_touching_a_prior_record() {
        let store = Arc::new(MemoryStore::new());
        store.save(&VisitorRecord::new("12345")).await.unwrap();
        let manager = manager_with(
            VisitorConfig::new("ABC123").unwrap(),
            StaticTransport::failing(),
            store.clone(),
        );
        manager.initialize().await;

        assert_eq!(manager.current_identifier().as_deref(), Some("12345"));
        assert!(manager.last_error().is_some());
        assert!(store.retrieve().await.is_some());
    }

    #[tokio::test]
    async fn a_success_clears_the_error_slot() {
        struct Recovering {
            healthy: std::sync::atomic::AtomicBool,
        }

        #[async_trait]
        impl Transport for Recovering {
            async fn send(&self, _url: &Url) -> Result<Bytes> {
                if self.healthy.load(Ordering::SeqCst) {
                    Ok(Bytes::from_static(RESPONSE.as_bytes()))
                } else {
                    Err(Error::transport("connection refused"))
                }
            }

            fn reset_session(&self) {}
        }

        let transport = Arc::new(Recovering {
            healthy: std::sync::atomic::AtomicBool::new(false),
        });
        let manager = VisitorLifecycleManager::with_scheduler(
            VisitorConfig::new("ABC123").unwrap(),
            transport.clone(),
            Arc::new(MemoryStore::new()),
            RetryScheduler::immediate(),
        );

        manager.fetch_new().await.unwrap_err();
        assert!(manager.last_error().is_some());

        transport.healthy.store(true, Ordering::SeqCst);
        manager.fetch_new().await.unwrap();
        assert!(manager.last_error().is_none());
    }

    #[tokio::test]
    async fn configured_identifier_overrides_a_differing_persisted_record() {
        let store = Arc::new(MemoryStore::new());
        store.save(&VisitorRecord::new("old-ecid")).await.unwrap();
        // Failing transport so the refresh attempt cannot mask the seeding.
        let manager = manager_with(
            VisitorConfig::new("ABC123")
                .unwrap()
                .with_existing_identifier("configured-ecid"),
            StaticTransport::failing(),
            store.clone(),
        );
        manager.initialize().await;

        assert_eq!(
            manager.current_identifier().as_deref(),
            Some("configured-ecid")
        );
        assert_eq!(
            store.retrieve().await.map(|r| r.experience_cloud_id),
            Some("configured-ecid".to_string())
        );
    }

    #[tokio::test]
    async fn dispatch_decision_tracks_the_lifecycle() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager_with(
            VisitorConfig::new("ABC123").unwrap(),
            StaticTransport::failing(),
            store,
        );

        assert!(matches!(
            manager.dispatch_decision(),
            DispatchDecision::Queue { .. }
        ));

        manager.fetch_new().await.unwrap_err();
        assert!(matches!(
            manager.dispatch_decision(),
            DispatchDecision::Fail { .. }
        ));
    }

    #[tokio::test]
    async fn dispatch_decision_decorates_once_an_identifier_exists() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager_with(
            VisitorConfig::new("ABC123").unwrap(),
            StaticTransport::answering(RESPONSE),
            store,
        );
        manager.fetch_new().await.unwrap();

        match manager.dispatch_decision() {
            DispatchDecision::Decorate { params } => {
                assert_eq!(params[0].0, "adobe_mc");
                assert!(params[0].1.starts_with("MCMID=12345|MCORGID=ABC123@AdobeOrg|TS="));
            }
            other => panic!("expected Decorate, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn provide_parameters_waits_for_the_outcome() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager_with(
            VisitorConfig::new("ABC123").unwrap(),
            StaticTransport::answering(RESPONSE),
            store,
        );

        let waiter = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.provide_parameters().await })
        };
        tokio::task::yield_now().await;
        manager.fetch_new().await.unwrap();

        let params = waiter.await.unwrap();
        assert_eq!(params.len(), 1);
        assert!(params[0].1.contains("MCMID=12345"));
    }

    #[tokio::test]
    async fn provide_parameters_is_empty_after_a_terminal_failure() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager_with(
            VisitorConfig::new("ABC123").unwrap(),
            StaticTransport::failing(),
            store,
        );
        manager.fetch_new().await.unwrap_err();

        assert!(manager.provide_parameters().await.is_empty());
    }

    #[tokio::test]
    async fn decorate_url_appends_the_parameter() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager_with(
            VisitorConfig::new("ABC123").unwrap(),
            StaticTransport::answering(RESPONSE),
            store,
        );
        manager.fetch_new().await.unwrap();

        let mut url = Url::parse("https://example.com/collect").unwrap();
        manager.decorate_url(&mut url).await;
        assert!(url.as_str().contains("adobe_mc="));
    }
}
