//! Error types for the ECID crates

use thiserror::Error;

/// Result type alias using the shared ECID error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the identifier lifecycle
#[derive(Error, Debug)]
pub enum Error {
    /// No organization ID configured; the identity service cannot be called
    #[error("organization ID missing; no identity requests can be made")]
    MissingOrgId,

    /// No experience cloud ID is available where one is required
    #[error("experience cloud ID not available")]
    MissingExperienceCloudId,

    /// Response body was unusable and no prior record exists to fall back on
    #[error("identity service returned an invalid response")]
    InvalidResponse,

    /// Network or connectivity failure; retryable up to the configured budget
    #[error("transport error: {message}")]
    Transport { message: String },

    /// The per-request retry budget was exhausted
    #[error("request failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    /// Persisted-record storage failure
    #[error("storage error: {message}")]
    Storage { message: String },

    /// JSON encoding error while persisting a record
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid service endpoint URL
    #[error("invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl Error {
    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Wrap the final error after an exhausted retry budget
    pub fn retries_exhausted(attempts: u32, source: Error) -> Self {
        Self::RetriesExhausted {
            attempts,
            source: Box::new(source),
        }
    }

    /// Whether the per-request retry loop should resubmit after this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport { .. })
    }
}
