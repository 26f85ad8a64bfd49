//! # ecid-core
//!
//! Core library for the ECID visitor-identifier lifecycle providing:
//! - The `VisitorRecord` model with wire-format decoding and field merging
//! - Configuration and validation (`VisitorConfig`)
//! - Retry scheduling with a once-per-instance jittered delay
//! - The replay-latest, single-shot `IdentifierNotifier`

pub mod error;
pub mod keys;
pub mod notifier;
pub mod retry;
pub mod types;

pub use error::{Error, Result};
pub use notifier::IdentifierNotifier;
pub use retry::RetryScheduler;
pub use types::{AuthState, VisitorConfig, VisitorRecord};
