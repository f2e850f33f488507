//! Domain models and data structures for node access.
//!
//! This module contains the data structures shared across services:
//!
//! - `blockchain`: EVM event signatures, log queries and decoded events
//! - `config`: Configuration loading and validation
//! - `core`: Endpoint, call, insight, recommendation and subscription models

mod blockchain;
mod config;
mod core;

// Re-export blockchain types
pub use blockchain::evm::{
	DecodedEvent, EventBatch, EventLog, EventParam, EventParseError, EventSignature, LogQuery,
	RawEvent,
};

// Re-export core types
pub use core::{
	CallId, CallRecord, CallStatus, CallTags, EndpointSnapshot, ErrorKind, GroupStatus, Insight,
	InsightKind, ObserverMode, ObserverStatus, Priority, Recommendation, RecommendationKind,
	Severity, SubscriptionId,
};

// Re-export config types
pub use config::{
	AccessConfig, CallConfig, ConfigError, ConfigLoader, DedupConfig, EndpointConfig,
	HealthConfig, HttpRetrySettings, ObserverConfig, RecommenderConfig, TelemetryConfig,
};
