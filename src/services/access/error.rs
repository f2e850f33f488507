//! Access service error types.

use std::time::Duration;
use thiserror::Error;

use crate::{models::ErrorKind, services::blockchain::TransportError};

/// Errors returned by [`NodeAccessService`](super::NodeAccessService)
///
/// `Clone` so that every caller joined on a deduplicated call receives the same
/// outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
	/// The last attempt failed and no further failover was possible
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// The call ran out of time across its failover attempts
	#[error("Call exceeded its {}ms deadline", .0.as_millis())]
	DeadlineExceeded(Duration),

	#[error("No endpoints configured")]
	NoEndpoints,

	/// The service could not be built from its configuration
	#[error("Invalid configuration: {0}")]
	InvalidConfig(String),

	/// The task carrying the call panicked or was cancelled by runtime shutdown
	#[error("Call aborted: {0}")]
	Aborted(String),
}

impl AccessError {
	/// Maps the error onto the shared error taxonomy
	pub fn kind(&self) -> ErrorKind {
		match self {
			Self::Transport(e) => e.kind(),
			Self::DeadlineExceeded(_) => ErrorKind::Timeout,
			Self::NoEndpoints | Self::InvalidConfig(_) | Self::Aborted(_) => ErrorKind::Unknown,
		}
	}
}
