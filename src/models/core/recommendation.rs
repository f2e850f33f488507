use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Parameter family a recommendation is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
	Cache,
	Retry,
	Batch,
	Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
	Low,
	Medium,
	High,
}

impl Priority {
	/// Maps an estimated impact percentage to a priority
	pub fn from_impact(impact_pct: u8) -> Self {
		match impact_pct {
			50.. => Self::High,
			25..=49 => Self::Medium,
			_ => Self::Low,
		}
	}
}

/// Suggested parameter change for a group of calls
///
/// Recommendations are advisory. Nothing in the crate applies them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
	pub id: Uuid,
	pub kind: RecommendationKind,
	/// The calls this applies to, e.g. a method, a contract or an endpoint
	pub call_group: String,
	pub current: Value,
	pub suggested: Value,
	pub rationale: String,
	pub estimated_impact_pct: u8,
	pub priority: Priority,
	pub created_at: DateTime<Utc>,
}
