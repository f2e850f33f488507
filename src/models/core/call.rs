use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Identifier of an instrumented call
pub type CallId = Uuid;

/// Lifecycle status of a call record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
	Pending,
	Success,
	Error,
}

/// Error taxonomy shared by transports, telemetry and the access service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
	/// Connection refused, reset or closed
	Network,
	/// The call did not complete in time
	Timeout,
	/// HTTP 429 or an equivalent node error
	RateLimit,
	/// The node does not implement the requested method
	UnsupportedMethod,
	/// A server-side filter handle was invalidated
	FilterExpired,
	/// Well-formed error response from the node
	RemoteCall,
	/// Anything else
	Unknown,
}

impl ErrorKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Network => "network",
			Self::Timeout => "timeout",
			Self::RateLimit => "rate_limit",
			Self::UnsupportedMethod => "unsupported_method",
			Self::FilterExpired => "filter_expired",
			Self::RemoteCall => "remote_call",
			Self::Unknown => "unknown",
		}
	}
}

impl fmt::Display for ErrorKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Optional attribution attached to a call for analytics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallTags {
	/// Contract the call targets
	pub contract: Option<String>,
	/// Contract function being invoked
	pub function: Option<String>,
	/// Caller-defined origin, such as a page or subsystem name
	pub source: Option<String>,
}

impl CallTags {
	/// Tags carrying only a source
	pub fn source(source: impl Into<String>) -> Self {
		Self {
			source: Some(source.into()),
			..Default::default()
		}
	}

	pub fn with_contract(mut self, contract: impl Into<String>) -> Self {
		self.contract = Some(contract.into());
		self
	}

	pub fn with_function(mut self, function: impl Into<String>) -> Self {
		self.function = Some(function.into());
		self
	}
}

/// One instrumented RPC invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
	pub id: CallId,
	/// Endpoint of the latest attempt
	pub endpoint: String,
	pub method: String,
	pub params: Value,
	pub tags: CallTags,
	pub started_at: DateTime<Utc>,
	pub finished_at: Option<DateTime<Utc>>,
	pub duration_ms: Option<u64>,
	pub status: CallStatus,
	pub error_kind: Option<ErrorKind>,
	pub retry_count: u32,
}

impl CallRecord {
	pub fn is_finished(&self) -> bool {
		self.status != CallStatus::Pending
	}

	pub fn is_error(&self) -> bool {
		self.status == CallStatus::Error
	}
}
