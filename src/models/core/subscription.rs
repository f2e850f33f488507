use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier returned when registering interest in an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl Default for SubscriptionId {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for SubscriptionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// How the event observer obtains logs
///
/// Starts as `Unknown`, resolves once to `Filter` or `Polling`, and may only
/// move from `Filter` to `Polling` afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObserverMode {
	Unknown,
	Filter,
	Polling,
}

impl ObserverMode {
	/// Numeric encoding used for metrics
	pub fn as_gauge(&self) -> f64 {
		match self {
			Self::Unknown => 0.0,
			Self::Filter => 1.0,
			Self::Polling => 2.0,
		}
	}
}

/// State of one (address, event) subscription group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupStatus {
	pub address: Address,
	pub event: String,
	pub subscribers: usize,
	pub last_polled_block: Option<u64>,
	pub has_filter: bool,
	pub endpoint: Option<String>,
}

/// Diagnostic view of the event observer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObserverStatus {
	pub mode: ObserverMode,
	pub is_active: bool,
	pub subscriptions: usize,
	pub groups: Vec<GroupStatus>,
}
