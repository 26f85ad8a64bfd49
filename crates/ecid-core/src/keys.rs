//! Wire-format keys and constants for the identity service

/// Default identity-service endpoint
pub const DEFAULT_ENDPOINT: &str = "https://dpm.demdex.net/id";

/// Identity service API version sent as `d_ver`
pub const API_VERSION: u32 = 2;

/// Separator between the fields of the composite `d_cid` value.
/// A non-printing control character; percent-encodes to `%01` on the wire.
pub const DATA_PROVIDER_SEPARATOR: &str = "\u{0001}";

/// Literal string the service returns for an absent identifier
pub const NULL_SENTINEL: &str = "<null>";

/// Suffix every organization ID must carry
pub const ORG_ID_SUFFIX: &str = "@AdobeOrg";

/// Query and response keys recognized by the identity service
pub mod wire {
    pub const EXPERIENCE_CLOUD_ID: &str = "d_mid";
    pub const ORG_ID: &str = "d_orgid";
    pub const DATA_PROVIDER_ID: &str = "d_cid";
    pub const REGION: &str = "dcs_region";
    pub const ENCRYPTED_BLOB: &str = "d_blob";
    pub const VERSION: &str = "d_ver";
    pub const ID_SYNC_TTL: &str = "id_sync_ttl";

    /// All keys the core interprets; unrecognized response keys are dropped
    pub const KNOWN_KEYS: &[&str] = &[
        EXPERIENCE_CLOUD_ID,
        ORG_ID,
        DATA_PROVIDER_ID,
        REGION,
        ENCRYPTED_BLOB,
        VERSION,
        ID_SYNC_TTL,
    ];

    pub fn is_known_key(key: &str) -> bool {
        KNOWN_KEYS.contains(&key)
    }
}

/// Keys used to build the outbound decoration parameter
pub mod query {
    pub const ADOBE_MC: &str = "adobe_mc";
    pub const MCID: &str = "MCMID";
    pub const MCORGID: &str = "MCORGID";
    pub const TS: &str = "TS";
}
