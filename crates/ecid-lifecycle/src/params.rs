//! Cross-domain decoration parameters
//!
//! The identifier travels to other web properties as a single `adobe_mc`
//! query parameter packing the identifier, the organization ID and a
//! freshness timestamp.

use chrono::Utc;
use ecid_core::keys::query;
use url::Url;

/// The query parameters to decorate outbound traffic with.
///
/// Empty when no identifier is known; decoration is never done with a
/// placeholder value.
pub fn decoration_params(ecid: Option<&str>, org_id: &str) -> Vec<(String, String)> {
    match ecid {
        Some(ecid) => vec![(query::ADOBE_MC.to_string(), adobe_mc_value(ecid, org_id))],
        None => Vec::new(),
    }
}

/// Append the decoration parameters to `url` in place
pub fn decorate_url(url: &mut Url, ecid: &str, org_id: &str) {
    url.query_pairs_mut()
        .append_pair(query::ADOBE_MC, &adobe_mc_value(ecid, org_id));
}

fn adobe_mc_value(ecid: &str, org_id: &str) -> String {
    format!(
        "{}={ecid}|{}={org_id}|{}={}",
        query::MCID,
        query::MCORGID,
        query::TS,
        Utc::now().timestamp()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_pack_identifier_org_and_timestamp() {
        let params = decoration_params(Some("12345"), "ABC123@AdobeOrg");
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].0, "adobe_mc");

        let value = &params[0].1;
        let parts: Vec<&str> = value.split('|').collect();
        assert_eq!(parts[0], "MCMID=12345");
        assert_eq!(parts[1], "MCORGID=ABC123@AdobeOrg");
        assert!(parts[2].starts_with("TS="));
        assert!(parts[2]["TS=".len()..].parse::<i64>().is_ok());
    }

    #[test]
    fn no_identifier_means_no_params() {
        assert!(decoration_params(None, "ABC123@AdobeOrg").is_empty());
    }

    #[test]
    fn decorate_url_appends_the_single_parameter() {
        let mut url = Url::parse("https://example.com/page?x=1").unwrap();
        decorate_url(&mut url, "12345", "ABC123@AdobeOrg");

        let (key, value) = url.query_pairs().last().unwrap();
        assert_eq!(key, "adobe_mc");
        assert!(value.starts_with("MCMID=12345|MCORGID=ABC123@AdobeOrg|TS="));
    }
}
