//! Module configuration
//!
//! The host hands the lifecycle manager one of these at construction. The
//! organization ID is the only required value; everything else has a default
//! or is optional.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};
use crate::keys::{DEFAULT_ENDPOINT, ORG_ID_SUFFIX};

/// Default operation retry budget
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Authentication state of a known visitor at link time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthState {
    Unknown,
    Authenticated,
    LoggedOut,
}

impl AuthState {
    /// Numeric form sent inside the composite `d_cid` value
    pub fn as_wire_value(&self) -> &'static str {
        match self {
            AuthState::Unknown => "0",
            AuthState::Authenticated => "1",
            AuthState::LoggedOut => "2",
        }
    }
}

/// Configuration for the visitor-identifier lifecycle
#[derive(Debug, Clone)]
pub struct VisitorConfig {
    /// Tenant identifier for the identity service, `@AdobeOrg` suffix
    /// included (appended automatically when missing)
    pub org_id: String,

    /// Pre-existing identifier override; takes precedence over a persisted
    /// record when the two differ
    pub existing_identifier: Option<String>,

    /// External identifier (e.g. an email address) to link to the
    /// service-issued identifier; requires `data_provider_id`
    pub known_visitor_id: Option<String>,

    /// Namespace identifier for `known_visitor_id`
    pub data_provider_id: Option<String>,

    /// Authentication state reported on link requests
    pub auth_state: Option<AuthState>,

    /// Maximum retries per operation (both the per-request and the
    /// operation-level loops read this)
    pub max_retries: u32,

    /// Identity-service endpoint
    pub endpoint: Url,
}

impl VisitorConfig {
    /// Create a configuration for the given organization ID.
    ///
    /// Fails with `Error::MissingOrgId` when the ID is empty; this is the
    /// fatal construction-time check, no network activity happens without it.
    pub fn new(org_id: impl Into<String>) -> Result<Self> {
        let mut org_id = org_id.into();
        if org_id.trim().is_empty() {
            return Err(Error::MissingOrgId);
        }
        if !org_id.ends_with(ORG_ID_SUFFIX) {
            org_id.push_str(ORG_ID_SUFFIX);
        }
        Ok(Self {
            org_id,
            existing_identifier: None,
            known_visitor_id: None,
            data_provider_id: None,
            auth_state: None,
            max_retries: DEFAULT_MAX_RETRIES,
            endpoint: Url::parse(DEFAULT_ENDPOINT)?,
        })
    }

    /// Set a pre-existing identifier override
    pub fn with_existing_identifier(mut self, ecid: impl Into<String>) -> Self {
        self.existing_identifier = Some(ecid.into());
        self
    }

    /// Configure a known visitor ID and its data-provider namespace
    pub fn with_known_visitor(
        mut self,
        known_id: impl Into<String>,
        data_provider_id: impl Into<String>,
    ) -> Self {
        self.known_visitor_id = Some(known_id.into());
        self.data_provider_id = Some(data_provider_id.into());
        self
    }

    /// Set the known visitor's authentication state
    pub fn with_auth_state(mut self, auth_state: AuthState) -> Self {
        self.auth_state = Some(auth_state);
        self
    }

    /// Override the retry budget
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Point at a non-default identity-service endpoint
    pub fn with_endpoint(mut self, endpoint: Url) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// Both halves of the known-identifier configuration, when present
    pub fn known_identifier_pair(&self) -> Option<(&str, &str)> {
        match (&self.known_visitor_id, &self.data_provider_id) {
            (Some(known), Some(dpid)) => Some((known, dpid)),
            _ => None,
        }
    }
}
