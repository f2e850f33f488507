use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Category of a telemetry insight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
	SlowCall,
	RepeatedFailure,
	ExcessiveCallRate,
	ElevatedErrorRate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
	Info,
	Warning,
	Critical,
}

/// Advisory observation derived from recorded calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
	pub id: Uuid,
	pub kind: InsightKind,
	pub severity: Severity,
	pub message: String,
	pub method: Option<String>,
	pub endpoint: Option<String>,
	pub created_at: DateTime<Utc>,
}

impl Insight {
	pub fn new(kind: InsightKind, severity: Severity, message: impl Into<String>) -> Self {
		Self {
			id: Uuid::new_v4(),
			kind,
			severity,
			message: message.into(),
			method: None,
			endpoint: None,
			created_at: Utc::now(),
		}
	}

	pub fn with_method(mut self, method: impl Into<String>) -> Self {
		self.method = Some(method.into());
		self
	}

	pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
		self.endpoint = Some(endpoint.into());
		self
	}
}
