//! Transport error types.
//!
//! Every failure seen while talking to a node is classified into one of these
//! variants so callers can decide between failover, retry, mode changes and
//! plain propagation.

use thiserror::Error;

use crate::models::ErrorKind;

const RATE_LIMIT_CODE: i64 = -32005;
const METHOD_NOT_FOUND_CODE: i64 = -32601;

const UNSUPPORTED_MARKERS: [&str; 5] = [
	"method not found",
	"not supported",
	"not allowed",
	"does not exist",
	"not available",
];
const RATE_LIMIT_MARKERS: [&str; 2] = ["rate limit", "too many requests"];
const RATE_LIMIT_STATUS: &str = "429";
const NETWORK_MARKERS: [&str; 5] = [
	"connection closed",
	"connection reset",
	"connection refused",
	"fetch failed",
	"network error",
];

/// Errors produced by node transports and typed clients
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
	/// Connection could not be established or was dropped
	#[error("Network error: {0}")]
	Network(String),

	/// No response within the allotted time
	#[error("Timeout: {0}")]
	Timeout(String),

	/// HTTP 429 or an equivalent node error
	#[error("Rate limited: {0}")]
	RateLimited(String),

	/// The node does not implement the method
	#[error("Unsupported method: {0}")]
	UnsupportedMethod(String),

	/// A filter handle is no longer known to the node
	#[error("Filter not found: {0}")]
	FilterNotFound(String),

	/// Well-formed JSON-RPC error response
	#[error("RPC error {code}: {message}")]
	Rpc { code: i64, message: String },

	/// Non-success HTTP status
	#[error("HTTP error {status}: {body}")]
	Http { status: u16, body: String },

	/// Response body could not be interpreted
	#[error("Failed to parse response: {0}")]
	ResponseParse(String),

	/// Request body could not be built
	#[error("Failed to serialize request: {0}")]
	Serialization(String),
}

impl TransportError {
	/// Classifies a JSON-RPC `error` object
	pub fn from_rpc_error(code: i64, message: impl Into<String>) -> Self {
		let message = message.into();
		let lower = normalize(&message);

		if lower.contains("filter not found") {
			Self::FilterNotFound(message)
		} else if code == RATE_LIMIT_CODE
			|| contains_any(&lower, &RATE_LIMIT_MARKERS)
			|| has_word(&lower, RATE_LIMIT_STATUS)
		{
			Self::RateLimited(message)
		} else if code == METHOD_NOT_FOUND_CODE || contains_any(&lower, &UNSUPPORTED_MARKERS) {
			Self::UnsupportedMethod(message)
		} else if contains_any(&lower, &NETWORK_MARKERS) {
			Self::Network(message)
		} else {
			Self::Rpc { code, message }
		}
	}

	/// Classifies a non-success HTTP response
	pub fn from_http_status(status: u16, body: impl Into<String>) -> Self {
		let body = body.into();
		if status == 429 {
			Self::RateLimited(format!("HTTP 429: {}", body))
		} else {
			Self::Http { status, body }
		}
	}

	/// Maps the error onto the shared error taxonomy
	pub fn kind(&self) -> ErrorKind {
		match self {
			Self::Network(_) => ErrorKind::Network,
			Self::Timeout(_) => ErrorKind::Timeout,
			Self::RateLimited(_) => ErrorKind::RateLimit,
			Self::UnsupportedMethod(_) => ErrorKind::UnsupportedMethod,
			Self::FilterNotFound(_) => ErrorKind::FilterExpired,
			Self::Rpc { .. } => ErrorKind::RemoteCall,
			Self::Http { status, .. } if *status >= 500 => ErrorKind::Network,
			Self::Http { .. } | Self::ResponseParse(_) | Self::Serialization(_) => {
				ErrorKind::Unknown
			}
		}
	}

	/// Whether the failure says something bad about the endpoint itself
	///
	/// Well-formed node errors prove the endpoint is alive and do not count.
	pub fn is_endpoint_fault(&self) -> bool {
		match self {
			Self::Network(_) | Self::Timeout(_) | Self::RateLimited(_) | Self::ResponseParse(_) => {
				true
			}
			Self::Http { status, .. } => *status >= 500,
			Self::UnsupportedMethod(_)
			| Self::FilterNotFound(_)
			| Self::Rpc { .. }
			| Self::Serialization(_) => false,
		}
	}

	/// Whether the same request may succeed on a different endpoint
	pub fn is_retryable(&self) -> bool {
		self.is_endpoint_fault() || matches!(self, Self::UnsupportedMethod(_))
	}

	/// Connection-level failures, as opposed to slow or refusing endpoints
	pub fn is_connection_level(&self) -> bool {
		matches!(self, Self::Network(_))
	}

	pub fn is_rate_limited(&self) -> bool {
		matches!(self, Self::RateLimited(_))
	}
}

impl From<reqwest_middleware::Error> for TransportError {
	fn from(error: reqwest_middleware::Error) -> Self {
		match error {
			reqwest_middleware::Error::Reqwest(e) if e.is_timeout() => Self::Timeout(e.to_string()),
			reqwest_middleware::Error::Reqwest(e) if e.is_builder() => {
				Self::Serialization(e.to_string())
			}
			reqwest_middleware::Error::Reqwest(e) => Self::Network(e.to_string()),
			reqwest_middleware::Error::Middleware(e) => Self::Network(e.to_string()),
		}
	}
}

/// Lowercases and turns `CONNECTION_CLOSED` style identifiers into plain words
fn normalize(message: &str) -> String {
	message.to_lowercase().replace(['_', '-'], " ")
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
	needles.iter().any(|needle| haystack.contains(needle))
}

fn has_word(haystack: &str, word: &str) -> bool {
	haystack
		.split(|c: char| !c.is_ascii_alphanumeric())
		.any(|token| token == word)
}
