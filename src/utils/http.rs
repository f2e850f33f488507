//! Retryable HTTP client construction.
//!
//! Node requests go through `reqwest-middleware` with `reqwest-retry`, so
//! transient failures (connection resets, 5xx) are retried with exponential
//! backoff before they reach the access layer's own failover logic.

use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{
	policies::ExponentialBackoff, Jitter, RetryTransientMiddleware, RetryableStrategy,
};
use std::time::Duration;

/// Configuration for HTTP retry policies
#[derive(Debug, Clone)]
pub struct HttpRetryConfig {
	/// Maximum number of retries for transient errors
	pub max_retries: u32,
	/// Base duration for exponential backoff calculations
	pub base_for_backoff: u32,
	/// Initial backoff duration before the first retry
	pub initial_backoff: Duration,
	/// Maximum backoff duration for retries
	pub max_backoff: Duration,
	/// Jitter to apply to the backoff duration
	pub jitter: Jitter,
}

impl Default for HttpRetryConfig {
	fn default() -> Self {
		Self {
			max_retries: 3,
			base_for_backoff: 2,
			initial_backoff: Duration::from_millis(250),
			max_backoff: Duration::from_secs(10),
			jitter: Jitter::Full,
		}
	}
}

impl HttpRetryConfig {
	/// Builds the exponential backoff policy described by this configuration
	pub fn retry_policy(&self) -> ExponentialBackoff {
		ExponentialBackoff::builder()
			.base(self.base_for_backoff)
			.retry_bounds(self.initial_backoff, self.max_backoff.max(self.initial_backoff))
			.jitter(self.jitter)
			.build_with_max_retries(self.max_retries)
	}
}

/// Creates a retryable HTTP client
///
/// # Parameters:
/// - `config`: Configuration for retry policies
/// - `base_client`: The base HTTP client to use
/// - `custom_strategy`: Optional custom retry strategy, replacing the default transient-error detection
///
/// # Returns
/// A `ClientWithMiddleware` that includes retry capabilities
pub fn create_retryable_http_client<S>(
	config: &HttpRetryConfig,
	base_client: reqwest::Client,
	custom_strategy: Option<S>,
) -> ClientWithMiddleware
where
	S: RetryableStrategy + Send + Sync + 'static,
{
	let retry_policy = config.retry_policy();

	if let Some(strategy) = custom_strategy {
		ClientBuilder::new(base_client).with(
			RetryTransientMiddleware::new_with_policy_and_strategy(retry_policy, strategy),
		)
	} else {
		ClientBuilder::new(base_client)
			.with(RetryTransientMiddleware::new_with_policy(retry_policy))
	}
	.build()
}
