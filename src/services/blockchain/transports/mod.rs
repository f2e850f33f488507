//! Network transport implementations for node access.
//!
//! Provides the JSON-RPC transport abstraction used by every service:
//! - `NodeTransport`: sends a request to an explicitly chosen endpoint
//! - `HttpTransportClient`: pooled HTTP implementation with transient-error retries
//! - `TransportError`: classification of transport and node failures

mod error;
mod http;

pub use error::TransportError;
pub use http::{HttpTransportClient, TransientErrorRetryStrategy};

use serde_json::{json, Value};

/// Base trait for JSON-RPC node transports
///
/// Endpoint choice belongs to the caller (usually the health registry), so every
/// request names the URL it targets.
#[async_trait::async_trait]
pub trait NodeTransport: Send + Sync {
	/// Send a raw JSON-RPC request to `url` and return the full response envelope
	async fn send_raw_request(
		&self,
		url: &str,
		method: &str,
		params: Option<Value>,
	) -> Result<Value, TransportError>;

	/// Customizes the request for specific node requirements
	async fn customize_request(&self, method: &str, params: Option<Value>) -> Value {
		// Default implementation for JSON-RPC
		json!({
			"jsonrpc": "2.0",
			"id": 1,
			"method": method,
			"params": params.unwrap_or_else(|| json!([]))
		})
	}
}

/// Extracts the `result` member of a JSON-RPC response envelope
///
/// # Arguments
/// * `response` - The full response returned by [`NodeTransport::send_raw_request`]
///
/// # Returns
/// * `Ok(Value)` - The result, which may be `null`
/// * `Err(TransportError)` - The classified node error, or `ResponseParse` if the envelope is malformed
pub fn extract_result(response: Value) -> Result<Value, TransportError> {
	if let Some(error) = response.get("error").filter(|error| !error.is_null()) {
		let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
		let message = error
			.get("message")
			.and_then(Value::as_str)
			.map(str::to_string)
			.unwrap_or_else(|| error.to_string());
		return Err(TransportError::from_rpc_error(code, message));
	}

	match response {
		Value::Object(mut envelope) => envelope.remove("result").ok_or_else(|| {
			TransportError::ResponseParse("Missing 'result' field".to_string())
		}),
		other => Err(TransportError::ResponseParse(format!(
			"Expected a JSON-RPC object, got {}",
			other
		))),
	}
}
