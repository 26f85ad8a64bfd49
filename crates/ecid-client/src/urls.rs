//! Request-URL construction for the identity service
//!
//! Every parameter is appended through the URL encoder, so the composite
//! `d_cid` separator (a 0x01 control character) reaches the wire as `%01`.
//! Absent optional values are skipped entirely rather than sent empty.

use ecid_core::keys::{self, wire};
use ecid_core::types::AuthState;
use url::Url;

/// URL requesting a new identifier, optionally hinting the service with an
/// existing one (the refresh case)
pub(crate) fn new_visitor_url(endpoint: &Url, org_id: &str, existing_id: Option<&str>) -> Url {
    let mut url = endpoint.clone();
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair(wire::ORG_ID, org_id);
        if let Some(existing_id) = existing_id {
            pairs.append_pair(wire::EXPERIENCE_CLOUD_ID, existing_id);
        }
        pairs.append_pair(wire::VERSION, &keys::API_VERSION.to_string());
    }
    url
}

/// URL linking a known visitor ID (already folded into `composite_cid`) to
/// an existing identifier
pub(crate) fn link_url(endpoint: &Url, existing_id: &str, composite_cid: &str) -> Url {
    let mut url = endpoint.clone();
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair(wire::EXPERIENCE_CLOUD_ID, existing_id);
        pairs.append_pair(wire::DATA_PROVIDER_ID, composite_cid);
        pairs.append_pair(wire::VERSION, &keys::API_VERSION.to_string());
    }
    url
}

/// Join data-provider ID, known visitor ID, and auth state into the `d_cid`
/// value, omitting the auth state when absent
pub(crate) fn composite_cid(
    data_provider_id: &str,
    known_id: &str,
    auth_state: Option<AuthState>,
) -> String {
    let mut parts = vec![data_provider_id, known_id];
    if let Some(auth_state) = auth_state {
        parts.push(auth_state.as_wire_value());
    }
    parts.join(keys::DATA_PROVIDER_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> Url {
        Url::parse(keys::DEFAULT_ENDPOINT).unwrap()
    }

    #[test]
    fn new_visitor_url_skips_the_absent_identifier() {
        let url = new_visitor_url(&endpoint(), "ABC123@AdobeOrg", None);
        assert_eq!(
            url.as_str(),
            "https://dpm.demdex.net/id?d_orgid=ABC123%40AdobeOrg&d_ver=2"
        );
    }

    #[test]
    fn refresh_url_carries_the_existing_identifier() {
        let url = new_visitor_url(&endpoint(), "ABC123@AdobeOrg", Some("12345"));
        assert_eq!(
            url.as_str(),
            "https://dpm.demdex.net/id?d_orgid=ABC123%40AdobeOrg&d_mid=12345&d_ver=2"
        );
    }

    #[test]
    fn composite_cid_joins_with_the_control_separator() {
        let cid = composite_cid("dpid", "someuser@example.com", Some(AuthState::Authenticated));
        assert_eq!(cid, "dpid\u{0001}someuser@example.com\u{0001}1");
    }

    #[test]
    fn composite_cid_omits_absent_auth_state() {
        let cid = composite_cid("dpid", "someuser@example.com", None);
        assert_eq!(cid, "dpid\u{0001}someuser@example.com");
    }

    #[test]
    fn link_url_percent_encodes_the_separator() {
        let cid = composite_cid("dpid", "user", Some(AuthState::Unknown));
        let url = link_url(&endpoint(), "12345", &cid);
        assert_eq!(
            url.as_str(),
            "https://dpm.demdex.net/id?d_mid=12345&d_cid=dpid%01user%010&d_ver=2"
        );
    }
}
