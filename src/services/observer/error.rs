//! Event observer error types.

use thiserror::Error;

use crate::models::EventParseError;

/// Errors raised when registering a subscription
///
/// Once registered, a subscription never fails observably: node errors are
/// logged, recorded in telemetry and retried on later ticks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObserverError {
	#[error("Invalid event signature: {0}")]
	InvalidSignature(#[from] EventParseError),

	#[error("Invalid contract address '{0}'")]
	InvalidAddress(String),

	#[error("Event observer is stopped")]
	Stopped,
}
