//! # ecid-client
//!
//! HTTP client for the identity service:
//! - `Transport` trait with a reqwest production implementation
//! - Request-URL construction for the fetch/link/refresh operations
//! - `VisitorApiClient` wrapping every call in the per-request retry loop
//!   and the degraded-merge fallback

pub mod client;
pub mod transport;
mod urls;

pub use client::VisitorApiClient;
pub use transport::{HttpTransport, Transport};
