//! EVM JSON-RPC client.
//!
//! Typed wrappers over the raw transport for the calls the access layer needs:
//! chain head, log ranges and the filter create/poll/destroy triple. Every call
//! carries an explicit timeout.

use alloy::rpc::types::Log;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};

use crate::{
	models::LogQuery,
	services::blockchain::transports::{extract_result, NodeTransport, TransportError},
};

/// Client for EVM-compatible nodes over any [`NodeTransport`]
pub struct EvmClient<T> {
	/// The underlying transport for RPC communication
	transport: Arc<T>,
	/// Timeout applied to each request
	timeout: Duration,
}

impl<T> Clone for EvmClient<T> {
	fn clone(&self) -> Self {
		Self {
			transport: Arc::clone(&self.transport),
			timeout: self.timeout,
		}
	}
}

impl<T: NodeTransport> EvmClient<T> {
	/// Creates a new EVM client instance
	///
	/// # Arguments
	/// * `transport` - Shared transport used for every request
	/// * `timeout` - Per-request timeout
	pub fn new(transport: Arc<T>, timeout: Duration) -> Self {
		Self { transport, timeout }
	}

	pub fn transport(&self) -> &Arc<T> {
		&self.transport
	}

	pub fn timeout(&self) -> Duration {
		self.timeout
	}

	/// Sends a request with the client's default timeout and extracts its result
	pub async fn request(
		&self,
		url: &str,
		method: &str,
		params: Option<Value>,
	) -> Result<Value, TransportError> {
		self.request_with_timeout(url, method, params, self.timeout)
			.await
	}

	/// Sends a request bounded by `timeout` and extracts its result
	///
	/// # Returns
	/// * `Ok(Value)` - The `result` member of the response
	/// * `Err(TransportError::Timeout)` - If no response arrived in time
	/// * `Err(TransportError)` - Any transport or node error
	pub async fn request_with_timeout(
		&self,
		url: &str,
		method: &str,
		params: Option<Value>,
		timeout: Duration,
	) -> Result<Value, TransportError> {
		match tokio::time::timeout(timeout, self.transport.send_raw_request(url, method, params))
			.await
		{
			Ok(response) => extract_result(response?),
			Err(_) => Err(TransportError::Timeout(format!(
				"{} to {} exceeded {}ms",
				method,
				url,
				timeout.as_millis()
			))),
		}
	}
}

/// Extended functionality specific to EVM-compatible nodes
#[async_trait]
pub trait EvmClientTrait {
	/// Retrieves the latest block number
	async fn block_number(&self, url: &str) -> Result<u64, TransportError>;

	/// Retrieves logs matching a bounded query
	async fn get_logs(&self, url: &str, query: &LogQuery) -> Result<Vec<Log>, TransportError>;

	/// Installs a server-side log filter and returns its handle
	async fn new_filter(&self, url: &str, query: &LogQuery) -> Result<String, TransportError>;

	/// Returns logs recorded by a filter since the previous poll
	async fn get_filter_changes(
		&self,
		url: &str,
		filter_id: &str,
	) -> Result<Vec<Log>, TransportError>;

	/// Releases a server-side filter
	async fn uninstall_filter(&self, url: &str, filter_id: &str) -> Result<bool, TransportError>;
}

#[async_trait]
impl<T: NodeTransport> EvmClientTrait for EvmClient<T> {
	async fn block_number(&self, url: &str) -> Result<u64, TransportError> {
		let result = self.request(url, "eth_blockNumber", Some(json!([]))).await?;
		parse_quantity(&result)
	}

	async fn get_logs(&self, url: &str, query: &LogQuery) -> Result<Vec<Log>, TransportError> {
		let result = self
			.request(url, "eth_getLogs", Some(query.to_params()))
			.await?;
		parse_logs(result)
	}

	async fn new_filter(&self, url: &str, query: &LogQuery) -> Result<String, TransportError> {
		let result = self
			.request(url, "eth_newFilter", Some(query.to_params()))
			.await?;
		result
			.as_str()
			.map(str::to_string)
			.ok_or_else(|| TransportError::ResponseParse(format!("Invalid filter id: {}", result)))
	}

	async fn get_filter_changes(
		&self,
		url: &str,
		filter_id: &str,
	) -> Result<Vec<Log>, TransportError> {
		let result = self
			.request(url, "eth_getFilterChanges", Some(json!([filter_id])))
			.await?;
		parse_logs(result)
	}

	async fn uninstall_filter(&self, url: &str, filter_id: &str) -> Result<bool, TransportError> {
		let result = self
			.request(url, "eth_uninstallFilter", Some(json!([filter_id])))
			.await?;
		Ok(result.as_bool().unwrap_or(false))
	}
}

/// Parses a hex quantity (`"0x1b4"`) into a `u64`
pub fn parse_quantity(value: &Value) -> Result<u64, TransportError> {
	let hex_str = value
		.as_str()
		.ok_or_else(|| TransportError::ResponseParse(format!("Expected hex quantity, got {}", value)))?;

	u64::from_str_radix(hex_str.trim_start_matches("0x"), 16).map_err(|e| {
		TransportError::ResponseParse(format!("Failed to parse quantity {}: {}", hex_str, e))
	})
}

fn parse_logs(result: Value) -> Result<Vec<Log>, TransportError> {
	if result.is_null() {
		return Ok(Vec::new());
	}
	serde_json::from_value(result)
		.map_err(|e| TransportError::ResponseParse(format!("Failed to parse logs: {}", e)))
}
