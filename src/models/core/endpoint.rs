use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time view of a single node endpoint as tracked by the health registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointSnapshot {
	/// Endpoint URL
	pub url: String,

	/// Optional human readable label
	pub label: Option<String>,

	/// Selection priority (lower is preferred)
	pub priority: u32,

	/// Round-trip latency of the most recent probe, if any
	pub last_latency_ms: Option<u64>,

	/// When the endpoint was last probed
	pub last_checked_at: Option<DateTime<Utc>>,

	/// Failures since the last recorded success
	pub consecutive_failures: u32,

	/// Whether the most recent probe (or live success) proved the endpoint alive
	pub last_probe_ok: bool,

	/// Derived health flag
	pub is_healthy: bool,

	/// Message of the most recent failure
	pub last_error: Option<String>,
}
