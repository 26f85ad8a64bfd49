//! # ecid-lifecycle
//!
//! Lifecycle management for the visitor identifier: persistence, startup
//! seeding, refresh and linking, reset, and the decoration / dispatch
//! decisions that depend on the identifier.

pub mod manager;
pub mod params;
pub mod store;

pub use manager::{DispatchDecision, VisitorLifecycleManager};
pub use store::{FileStore, MemoryStore, VisitorStore};
