//! Type definitions for the visitor record and module configuration

mod config;
mod visitor;

pub use config::{AuthState, VisitorConfig, DEFAULT_MAX_RETRIES};
pub use visitor::{parse_fields, VisitorRecord};
