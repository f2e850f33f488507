//! Core services implementing the node access layer.
//!
//! This module contains the main service implementations:
//! - `access`: The façade composing every other service
//! - `blockchain`: Node transports and the typed EVM client
//! - `dedup`: Collapsing of concurrent identical calls
//! - `health`: Endpoint liveness, latency and selection
//! - `observer`: Contract event delivery via filters or log polling
//! - `recommender`: Advisory tuning suggestions from telemetry
//! - `telemetry`: Call lifecycle recording, statistics and insights

pub mod access;
pub mod blockchain;
pub mod dedup;
pub mod health;
pub mod observer;
pub mod recommender;
pub mod telemetry;
