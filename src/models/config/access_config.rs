//! Access layer configuration.
//!
//! Every threshold and cadence used by the services lives here with its default.
//! Durations are stored as milliseconds so the JSON form stays flat; each section
//! exposes `Duration` accessors.

use serde::{Deserialize, Serialize};
use std::{collections::HashSet, path::Path, time::Duration};
use url::Url;

use crate::{
	models::config::{ConfigError, ConfigLoader},
	utils::http::HttpRetryConfig,
};

/// A configured node endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
	pub url: String,

	/// Lower values are preferred. Ties keep declaration order.
	#[serde(default)]
	pub priority: u32,

	#[serde(default)]
	pub label: Option<String>,
}

impl EndpointConfig {
	pub fn new(url: impl Into<String>, priority: u32) -> Self {
		Self {
			url: url.into(),
			priority,
			label: None,
		}
	}

	pub fn with_label(mut self, label: impl Into<String>) -> Self {
		self.label = Some(label.into());
		self
	}
}

/// Endpoint health probing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
	pub probe_interval_ms: u64,
	pub probe_timeout_ms: u64,
	pub latency_threshold_ms: u64,
	pub max_failures: u32,
}

impl Default for HealthConfig {
	fn default() -> Self {
		Self {
			probe_interval_ms: 30_000,
			probe_timeout_ms: 5_000,
			latency_threshold_ms: 3_000,
			max_failures: 3,
		}
	}
}

impl HealthConfig {
	pub fn probe_interval(&self) -> Duration {
		Duration::from_millis(self.probe_interval_ms)
	}

	pub fn probe_timeout(&self) -> Duration {
		Duration::from_millis(self.probe_timeout_ms)
	}
}

/// Request deduplication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
	pub window_ms: u64,
}

impl Default for DedupConfig {
	fn default() -> Self {
		Self { window_ms: 5_000 }
	}
}

impl DedupConfig {
	pub fn window(&self) -> Duration {
		Duration::from_millis(self.window_ms)
	}
}

/// Live call timeouts and failover
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallConfig {
	/// Timeout of a single attempt
	pub timeout_ms: u64,
	/// Upper bound for a call across all failover attempts
	pub deadline_ms: u64,
	/// Distinct endpoints tried per call
	pub max_attempts: u32,
	/// Pause before failing over to the next endpoint
	pub retry_delay_ms: u64,
}

impl Default for CallConfig {
	fn default() -> Self {
		Self {
			timeout_ms: 10_000,
			deadline_ms: 30_000,
			max_attempts: 3,
			retry_delay_ms: 500,
		}
	}
}

impl CallConfig {
	pub fn timeout(&self) -> Duration {
		Duration::from_millis(self.timeout_ms)
	}

	pub fn deadline(&self) -> Duration {
		Duration::from_millis(self.deadline_ms)
	}

	pub fn retry_delay(&self) -> Duration {
		Duration::from_millis(self.retry_delay_ms)
	}
}

/// Event observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObserverConfig {
	pub filter_poll_interval_ms: u64,
	pub block_poll_interval_ms: u64,
	/// Blocks per `eth_getLogs` range
	pub batch_size: u64,
	pub batch_pause_ms: u64,
	pub rate_limit_backoff_ms: u64,
	/// Blocks processed per polling tick; the remainder is caught up later
	pub max_blocks_per_tick: u64,
	/// Contract used for the filter capability probe
	pub probe_address: String,
	/// Event used for the filter capability probe
	pub probe_event: String,
}

impl Default for ObserverConfig {
	fn default() -> Self {
		Self {
			filter_poll_interval_ms: 10_000,
			block_poll_interval_ms: 15_000,
			batch_size: 5,
			batch_pause_ms: 100,
			rate_limit_backoff_ms: 1_000,
			max_blocks_per_tick: 100,
			probe_address: "0x0000000000000000000000000000000000000000".to_string(),
			probe_event: "Transfer(address,address,uint256)".to_string(),
		}
	}
}

impl ObserverConfig {
	pub fn filter_poll_interval(&self) -> Duration {
		Duration::from_millis(self.filter_poll_interval_ms)
	}

	pub fn block_poll_interval(&self) -> Duration {
		Duration::from_millis(self.block_poll_interval_ms)
	}

	pub fn batch_pause(&self) -> Duration {
		Duration::from_millis(self.batch_pause_ms)
	}

	pub fn rate_limit_backoff(&self) -> Duration {
		Duration::from_millis(self.rate_limit_backoff_ms)
	}
}

/// Call telemetry and insight thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
	pub history_size: usize,
	pub max_insights: usize,
	pub sweep_interval_ms: u64,
	pub slow_call_ms: u64,
	pub rate_window_ms: u64,
	pub max_calls_per_window: usize,
	pub error_rate_threshold: f64,
	/// Completed calls required in the window before the error rate is judged
	pub min_error_samples: usize,
	pub repeated_failure_retries: u32,
	/// Records included in `export()`
	pub export_recent: usize,
}

impl Default for TelemetryConfig {
	fn default() -> Self {
		Self {
			history_size: 1_000,
			max_insights: 50,
			sweep_interval_ms: 60_000,
			slow_call_ms: 3_000,
			rate_window_ms: 60_000,
			max_calls_per_window: 60,
			error_rate_threshold: 0.1,
			min_error_samples: 5,
			repeated_failure_retries: 2,
			export_recent: 100,
		}
	}
}

impl TelemetryConfig {
	pub fn sweep_interval(&self) -> Duration {
		Duration::from_millis(self.sweep_interval_ms)
	}

	pub fn rate_window(&self) -> Duration {
		Duration::from_millis(self.rate_window_ms)
	}
}

/// Optimization recommender thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommenderConfig {
	pub interval_ms: u64,
	pub max_recommendations: usize,
	/// Identical calls needed before caching is suggested
	pub duplicate_threshold: usize,
	pub retry_rate_threshold: f64,
	/// Calls a method or endpoint needs before the retry and timeout rules judge it
	pub min_samples: usize,
	/// Calls to one contract inside this window are batch candidates
	pub batch_window_ms: u64,
	pub batch_min_calls: usize,
	/// Fraction of the call timeout an endpoint's average latency may use
	pub comfort_ratio: f64,
}

impl Default for RecommenderConfig {
	fn default() -> Self {
		Self {
			interval_ms: 60_000,
			max_recommendations: 20,
			duplicate_threshold: 3,
			retry_rate_threshold: 0.15,
			min_samples: 5,
			batch_window_ms: 100,
			batch_min_calls: 3,
			comfort_ratio: 0.5,
		}
	}
}

impl RecommenderConfig {
	pub fn interval(&self) -> Duration {
		Duration::from_millis(self.interval_ms)
	}
}

/// Transport-level retry policy for transient HTTP failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpRetrySettings {
	pub max_retries: u32,
	pub initial_backoff_ms: u64,
	pub max_backoff_ms: u64,
}

impl Default for HttpRetrySettings {
	fn default() -> Self {
		Self {
			max_retries: 2,
			initial_backoff_ms: 250,
			max_backoff_ms: 2_000,
		}
	}
}

impl HttpRetrySettings {
	pub fn to_retry_config(&self) -> HttpRetryConfig {
		HttpRetryConfig {
			max_retries: self.max_retries,
			initial_backoff: Duration::from_millis(self.initial_backoff_ms),
			max_backoff: Duration::from_millis(self.max_backoff_ms),
			..HttpRetryConfig::default()
		}
	}
}

/// Top-level configuration of the access layer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
	pub endpoints: Vec<EndpointConfig>,
	pub health: HealthConfig,
	pub dedup: DedupConfig,
	pub call: CallConfig,
	pub observer: ObserverConfig,
	pub telemetry: TelemetryConfig,
	pub recommender: RecommenderConfig,
	pub http_retry: HttpRetrySettings,
}

impl AccessConfig {
	/// Default configuration over the given URLs, prioritized in order
	pub fn with_endpoints<I, S>(urls: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self {
			endpoints: urls
				.into_iter()
				.enumerate()
				.map(|(index, url)| EndpointConfig::new(url, index as u32))
				.collect(),
			..Default::default()
		}
	}

	/// Applies overrides from the process environment
	pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
		self.apply_overrides_from(|key| std::env::var(key).ok())
	}

	/// Applies overrides from an arbitrary key lookup
	///
	/// Recognised keys:
	/// * `RPC_ENDPOINTS` - comma separated URLs, replacing the configured endpoints
	/// * `RPC_CALL_TIMEOUT_MS` - per-attempt call timeout
	/// * `RPC_DEDUP_WINDOW_MS` - deduplication window
	/// * `RPC_PROBE_INTERVAL_MS` - health probe interval
	pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		if let Some(raw) = lookup("RPC_ENDPOINTS") {
			let urls: Vec<&str> = raw
				.split(',')
				.map(str::trim)
				.filter(|url| !url.is_empty())
				.collect();
			if urls.is_empty() {
				return Err(ConfigError::environment_error(
					"RPC_ENDPOINTS is set but contains no URLs",
				));
			}
			self.endpoints = urls
				.into_iter()
				.enumerate()
				.map(|(index, url)| EndpointConfig::new(url, index as u32))
				.collect();
		}

		let millis = |key: &str| -> Result<Option<u64>, ConfigError> {
			lookup(key)
				.map(|value| {
					value.trim().parse::<u64>().map_err(|e| {
						ConfigError::environment_error(format!("{} is not a number: {}", key, e))
					})
				})
				.transpose()
		};

		if let Some(value) = millis("RPC_CALL_TIMEOUT_MS")? {
			self.call.timeout_ms = value;
		}
		if let Some(value) = millis("RPC_DEDUP_WINDOW_MS")? {
			self.dedup.window_ms = value;
		}
		if let Some(value) = millis("RPC_PROBE_INTERVAL_MS")? {
			self.health.probe_interval_ms = value;
		}

		Ok(())
	}

	/// Reads a JSON configuration file without validating it
	///
	/// Used when later overrides may still complete the configuration.
	pub fn read_from_path(path: &Path) -> Result<Self, ConfigError> {
		if !Self::is_json_file(path) {
			return Err(ConfigError::file_error(format!(
				"{} is not a JSON file",
				path.display()
			)));
		}

		let file = std::fs::File::open(path)?;
		Ok(serde_json::from_reader(file)?)
	}
}

impl ConfigLoader for AccessConfig {
	fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
		let config = Self::read_from_path(path)?;

		// Validate the config after loading
		if let Err(validation_error) = config.validate() {
			return Err(ConfigError::validation_error(validation_error));
		}

		Ok(config)
	}

	fn validate(&self) -> Result<(), String> {
		if self.endpoints.is_empty() {
			return Err("At least one endpoint must be configured".to_string());
		}

		let mut seen = HashSet::new();
		for endpoint in &self.endpoints {
			let url = Url::parse(&endpoint.url)
				.map_err(|e| format!("Invalid endpoint URL '{}': {}", endpoint.url, e))?;
			if !matches!(url.scheme(), "http" | "https") {
				return Err(format!(
					"Endpoint URL '{}' must use http or https",
					endpoint.url
				));
			}
			if !seen.insert(endpoint.url.as_str()) {
				return Err(format!("Duplicate endpoint URL '{}'", endpoint.url));
			}
		}

		if self.health.max_failures == 0 {
			return Err("health.max_failures must be greater than 0".to_string());
		}

		let durations = [
			("health.probe_interval_ms", self.health.probe_interval_ms),
			("health.probe_timeout_ms", self.health.probe_timeout_ms),
			("health.latency_threshold_ms", self.health.latency_threshold_ms),
			("dedup.window_ms", self.dedup.window_ms),
			("call.timeout_ms", self.call.timeout_ms),
			("call.deadline_ms", self.call.deadline_ms),
			(
				"observer.filter_poll_interval_ms",
				self.observer.filter_poll_interval_ms,
			),
			(
				"observer.block_poll_interval_ms",
				self.observer.block_poll_interval_ms,
			),
			("telemetry.sweep_interval_ms", self.telemetry.sweep_interval_ms),
			("telemetry.rate_window_ms", self.telemetry.rate_window_ms),
			("recommender.interval_ms", self.recommender.interval_ms),
		];
		if let Some((name, _)) = durations.iter().find(|(_, value)| *value == 0) {
			return Err(format!("{} must be greater than 0", name));
		}

		if self.call.max_attempts == 0 {
			return Err("call.max_attempts must be greater than 0".to_string());
		}

		if self.observer.batch_size == 0 || self.observer.max_blocks_per_tick == 0 {
			return Err(
				"observer.batch_size and observer.max_blocks_per_tick must be greater than 0"
					.to_string(),
			);
		}

		if !(self.telemetry.error_rate_threshold > 0.0
			&& self.telemetry.error_rate_threshold <= 1.0)
		{
			return Err("telemetry.error_rate_threshold must be within (0, 1]".to_string());
		}

		if self.telemetry.history_size == 0 {
			return Err("telemetry.history_size must be greater than 0".to_string());
		}

		Ok(())
	}
}
