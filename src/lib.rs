//! Resilient access layer for EVM node endpoints.
//!
//! The crate wraps a pool of JSON-RPC endpoints behind a single service that:
//! - tracks endpoint liveness and latency (`services::health`)
//! - collapses identical in-flight calls (`services::dedup`)
//! - records every outbound call and derives insights (`services::telemetry`)
//! - observes contract events through server-side filters or log polling (`services::observer`)
//! - suggests tuning changes from recorded traffic (`services::recommender`)
//!
//! `services::access::NodeAccessService` ties these together and is the entry point
//! for applications. `bootstrap` builds it from an `AccessConfig`.

pub mod bootstrap;
pub mod models;
pub mod services;
pub mod utils;
