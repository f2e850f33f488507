//! Node access façade.
//!
//! Composes the health registry, request deduplicator, telemetry engine, event
//! observer and optimization recommender into the single entry point consumed by
//! applications:
//!
//! - `call`: deduplicated, health-aware RPC with timeout, deadline and failover
//! - `subscribe`: contract event delivery through the adaptive observer
//! - read-only health, telemetry and recommendation snapshots

mod error;
mod service;

pub use error::AccessError;
pub use service::{NodeAccessService, SubscriptionHandle, TelemetrySnapshot};
