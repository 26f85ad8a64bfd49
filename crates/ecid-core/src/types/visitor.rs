//! The visitor record returned by the identity service
//!
//! A `VisitorRecord` always carries an identifier; "no valid identifier yet"
//! is represented as `Option<VisitorRecord>::None` at the owner, never as a
//! record with an empty identifier. Persisting a record therefore always
//! implies the identifier is present.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::keys::{wire, NULL_SENTINEL};

/// One identity-service record: the resolved identifier plus the opaque
/// region/blob pass-through fields and the computed refresh deadline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitorRecord {
    /// The resolved visitor identifier (ECID)
    #[serde(rename = "d_mid")]
    pub experience_cloud_id: String,

    /// TTL in seconds as returned by the service; only used to compute
    /// `next_refresh`
    #[serde(rename = "id_sync_ttl", skip_serializing_if = "Option::is_none")]
    pub id_sync_ttl: Option<String>,

    /// Opaque region hint, passed through untouched
    #[serde(rename = "dcs_region", skip_serializing_if = "Option::is_none")]
    pub dcs_region: Option<String>,

    /// Opaque encrypted metadata, passed through untouched
    #[serde(rename = "d_blob", skip_serializing_if = "Option::is_none")]
    pub blob: Option<String>,

    /// Absolute time after which the record is considered stale
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_refresh: Option<DateTime<Utc>>,
}

impl VisitorRecord {
    /// Construct a bare record around a known identifier (no TTL, never
    /// considered fresh)
    pub fn new(experience_cloud_id: impl Into<String>) -> Self {
        Self {
            experience_cloud_id: experience_cloud_id.into(),
            id_sync_ttl: None,
            dcs_region: None,
            blob: None,
            next_refresh: None,
        }
    }

    /// Decode a service response body into a record.
    ///
    /// Returns `None` when the body is not a flat JSON object, when the
    /// identifier key is missing, or when its value is the literal
    /// `"<null>"` sentinel.
    pub fn decode(body: &[u8]) -> Option<Self> {
        Self::from_fields(&parse_fields(body))
    }

    /// Build a record from already-stringified response fields
    pub fn from_fields(fields: &HashMap<String, String>) -> Option<Self> {
        let ecid = fields.get(wire::EXPERIENCE_CLOUD_ID)?;
        if ecid == NULL_SENTINEL {
            return None;
        }
        Some(Self::new(ecid.clone()).merged(fields))
    }

    /// Merge newly supplied fields over this record: prefer the new value,
    /// fall back to the prior one. `next_refresh` is recomputed only when the
    /// new fields carry a TTL, so merging an empty field set is an identity.
    pub fn merged(&self, fields: &HashMap<String, String>) -> Self {
        let (id_sync_ttl, next_refresh) = match fields.get(wire::ID_SYNC_TTL) {
            Some(ttl) => (Some(ttl.clone()), future_date(Some(ttl))),
            None => (self.id_sync_ttl.clone(), self.next_refresh),
        };
        Self {
            experience_cloud_id: self.experience_cloud_id.clone(),
            id_sync_ttl,
            dcs_region: fields
                .get(wire::REGION)
                .cloned()
                .or_else(|| self.dcs_region.clone()),
            blob: fields
                .get(wire::ENCRYPTED_BLOB)
                .cloned()
                .or_else(|| self.blob.clone()),
            next_refresh,
        }
    }

    /// True when the record has no TTL information or its refresh deadline
    /// has passed. Absence of TTL means "always needs refresh".
    pub fn should_refresh(&self) -> bool {
        match self.next_refresh {
            Some(next_refresh) => Utc::now() >= next_refresh,
            None => true,
        }
    }
}

/// Stringify a response body's JSON object, keeping only recognized wire
/// keys. Unparseable bodies yield an empty map so callers can still run a
/// degraded merge against a prior record.
pub fn parse_fields(body: &[u8]) -> HashMap<String, String> {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) else {
        return HashMap::new();
    };
    let Some(object) = value.as_object() else {
        return HashMap::new();
    };
    object
        .iter()
        .filter(|(key, _)| wire::is_known_key(key))
        .map(|(key, value)| {
            let rendered = match value.as_str() {
                Some(s) => s.to_string(),
                None => value.to_string(),
            };
            (key.clone(), rendered)
        })
        .collect()
}

fn future_date(ttl_seconds: Option<&str>) -> Option<DateTime<Utc>> {
    let seconds: i64 = ttl_seconds?.parse().ok()?;
    Some(Utc::now() + Duration::seconds(seconds))
}
