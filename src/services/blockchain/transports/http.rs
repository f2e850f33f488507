//! HTTP transport implementation for node interactions.
//!
//! This module provides the JSON-RPC over HTTP client used for every endpoint:
//! - One pooled connection set shared by all endpoints
//! - Exponential backoff retries for transient 5xx and connection failures
//! - Rate-limit responses surfaced to the caller instead of being retried

use anyhow::Context;
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::{
	default_on_request_failure, default_on_request_success, Retryable, RetryableStrategy,
};
use serde_json::Value;
use std::time::Duration;

use crate::{
	services::blockchain::transports::{NodeTransport, TransportError},
	utils::http::{create_retryable_http_client, HttpRetryConfig},
};

/// Retry strategy that leaves HTTP 429 to the caller
///
/// Rate limits are handled by the callers' own policies (endpoint failover,
/// observer backoff), so the middleware must not burn its retries on them.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransientErrorRetryStrategy;

impl RetryableStrategy for TransientErrorRetryStrategy {
	fn handle(
		&self,
		res: &Result<reqwest::Response, reqwest_middleware::Error>,
	) -> Option<Retryable> {
		match res {
			Ok(response) if response.status() == StatusCode::TOO_MANY_REQUESTS => None,
			Ok(response) => default_on_request_success(response),
			Err(error) => default_on_request_failure(error),
		}
	}
}

/// Basic HTTP transport client for node interactions
///
/// The client is cheap to clone and can be shared across tasks. It holds no
/// notion of an active endpoint; callers pass the URL with each request.
#[derive(Clone, Debug)]
pub struct HttpTransportClient {
	/// HTTP client wrapped with the retry middleware
	client: ClientWithMiddleware,
}

impl HttpTransportClient {
	/// Creates a new HTTP transport client
	///
	/// # Arguments
	/// * `retry_config` - Backoff policy for transient failures
	/// * `request_timeout` - Socket-level timeout applied to every request
	///
	/// # Returns
	/// * `Result<Self, anyhow::Error>` - New client instance or construction error
	pub fn new(
		retry_config: &HttpRetryConfig,
		request_timeout: Duration,
	) -> Result<Self, anyhow::Error> {
		let http_client = reqwest::ClientBuilder::new()
			.pool_idle_timeout(Duration::from_secs(90))
			.pool_max_idle_per_host(32)
			.timeout(request_timeout)
			.connect_timeout(request_timeout.min(Duration::from_secs(20)))
			.build()
			.context("Failed to create HTTP client")?;

		let client = create_retryable_http_client(
			retry_config,
			http_client,
			Some(TransientErrorRetryStrategy),
		);

		Ok(Self { client })
	}
}

#[async_trait]
impl NodeTransport for HttpTransportClient {
	/// Sends a JSON-RPC request to the given endpoint
	///
	/// Non-success statuses are classified into `TransportError`; the JSON body of a
	/// successful response is returned unchanged, including any `error` member.
	async fn send_raw_request(
		&self,
		url: &str,
		method: &str,
		params: Option<Value>,
	) -> Result<Value, TransportError> {
		let request_body = self.customize_request(method, params).await;

		let response = self
			.client
			.post(url)
			.header("Content-Type", "application/json")
			.json(&request_body)
			.send()
			.await?;

		let status = response.status();
		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();
			return Err(TransportError::from_http_status(status.as_u16(), body));
		}

		response
			.json::<Value>()
			.await
			.map_err(|e| TransportError::ResponseParse(e.to_string()))
	}
}
