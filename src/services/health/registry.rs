//! Endpoint health registry.
//!
//! Holds one entry per configured endpoint, ordered by priority. Each field is an
//! independent atomic so probes and live-traffic reports can update an endpoint
//! concurrently without a table-wide lock.
//!
//! An endpoint is healthy while all of the following hold:
//! - fewer than `max_failures` consecutive failures
//! - last measured latency below `latency_threshold_ms` (unmeasured counts as fast)
//! - the latest probe, or live success, proved it alive

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde_json::json;
use std::sync::{
	atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, AtomicUsize, Ordering},
	Mutex,
};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{
	models::{ConfigError, EndpointConfig, EndpointSnapshot, HealthConfig},
	services::blockchain::{extract_result, NodeTransport, TransportError},
	utils::{constants::PROBE_METHOD, sync::lock},
};

const UNKNOWN_LATENCY: u64 = u64::MAX;
const NEVER_CHECKED: i64 = i64::MIN;

struct EndpointState {
	url: String,
	label: Option<String>,
	priority: u32,
	latency_ms: AtomicU64,
	last_checked_ms: AtomicI64,
	failures: AtomicU32,
	last_probe_ok: AtomicBool,
	last_error: Mutex<Option<String>>,
}

impl EndpointState {
	fn new(config: &EndpointConfig) -> Self {
		Self {
			url: config.url.clone(),
			label: config.label.clone(),
			priority: config.priority,
			latency_ms: AtomicU64::new(UNKNOWN_LATENCY),
			last_checked_ms: AtomicI64::new(NEVER_CHECKED),
			failures: AtomicU32::new(0),
			last_probe_ok: AtomicBool::new(true),
			last_error: Mutex::new(None),
		}
	}

	fn latency(&self) -> Option<u64> {
		match self.latency_ms.load(Ordering::Acquire) {
			UNKNOWN_LATENCY => None,
			latency => Some(latency),
		}
	}

	fn failures(&self) -> u32 {
		self.failures.load(Ordering::Acquire)
	}

	fn is_healthy(&self, config: &HealthConfig) -> bool {
		self.failures() < config.max_failures
			&& self
				.latency()
				.is_none_or(|latency| latency < config.latency_threshold_ms)
			&& self.last_probe_ok.load(Ordering::Acquire)
	}

	fn record_success(&self) {
		self.failures.store(0, Ordering::Release);
		self.last_probe_ok.store(true, Ordering::Release);
	}

	/// Increments the failure counter and returns the new value
	fn record_failure(&self, reason: String) -> u32 {
		let previous = self
			.failures
			.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
				Some(n.saturating_add(1))
			})
			.unwrap_or_else(|n| n);
		*lock(&self.last_error) = Some(reason);
		previous.saturating_add(1)
	}

	fn snapshot(&self, config: &HealthConfig) -> EndpointSnapshot {
		let last_checked_at = match self.last_checked_ms.load(Ordering::Acquire) {
			NEVER_CHECKED => None,
			millis => DateTime::<Utc>::from_timestamp_millis(millis),
		};

		EndpointSnapshot {
			url: self.url.clone(),
			label: self.label.clone(),
			priority: self.priority,
			last_latency_ms: self.latency(),
			last_checked_at,
			consecutive_failures: self.failures(),
			last_probe_ok: self.last_probe_ok.load(Ordering::Acquire),
			is_healthy: self.is_healthy(config),
			last_error: lock(&self.last_error).clone(),
		}
	}
}

/// Liveness and latency tracker for a fixed set of endpoints
///
/// Selection never fails: when nothing is healthy the highest priority endpoint
/// is returned and a warning is logged.
pub struct EndpointHealthRegistry {
	endpoints: Vec<EndpointState>,
	cursor: AtomicUsize,
	config: HealthConfig,
}

impl EndpointHealthRegistry {
	/// Creates a registry over the configured endpoints
	///
	/// # Arguments
	/// * `endpoints` - Endpoint list; sorted by ascending priority, ties keep their order
	/// * `config` - Probe cadence and health thresholds
	///
	/// # Returns
	/// * `Result<Self, ConfigError>` - Fails when `endpoints` is empty
	pub fn new(endpoints: &[EndpointConfig], config: HealthConfig) -> Result<Self, ConfigError> {
		if endpoints.is_empty() {
			return Err(ConfigError::validation_error(
				"Health registry requires at least one endpoint",
			));
		}

		let mut sorted: Vec<&EndpointConfig> = endpoints.iter().collect();
		sorted.sort_by_key(|endpoint| endpoint.priority);

		Ok(Self {
			endpoints: sorted.into_iter().map(EndpointState::new).collect(),
			cursor: AtomicUsize::new(0),
			config,
		})
	}

	pub fn config(&self) -> &HealthConfig {
		&self.config
	}

	pub fn len(&self) -> usize {
		self.endpoints.len()
	}

	pub fn is_empty(&self) -> bool {
		self.endpoints.is_empty()
	}

	/// Endpoint URLs in priority order
	pub fn urls(&self) -> Vec<String> {
		self.endpoints.iter().map(|state| state.url.clone()).collect()
	}

	/// Probes every endpoint concurrently and updates its health
	///
	/// Probe failures are absorbed into endpoint state; this never errors.
	///
	/// # Arguments
	/// * `transport` - Transport used for the liveness calls
	///
	/// # Returns
	/// * `Vec<EndpointSnapshot>` - Health of every endpoint after the probe
	pub async fn probe_all<T>(&self, transport: &T) -> Vec<EndpointSnapshot>
	where
		T: NodeTransport + ?Sized,
	{
		join_all(
			self.endpoints
				.iter()
				.map(|state| self.probe_endpoint(state, transport)),
		)
		.await;

		let snapshot = self.snapshot();
		debug!(
			healthy = snapshot.iter().filter(|endpoint| endpoint.is_healthy).count(),
			total = snapshot.len(),
			"Health probe completed"
		);
		snapshot
	}

	async fn probe_endpoint<T>(&self, state: &EndpointState, transport: &T)
	where
		T: NodeTransport + ?Sized,
	{
		let was_healthy = state.is_healthy(&self.config);
		let started = Instant::now();
		let outcome = tokio::time::timeout(
			self.config.probe_timeout(),
			transport.send_raw_request(&state.url, PROBE_METHOD, Some(json!([]))),
		)
		.await;
		let latency = started.elapsed().as_millis() as u64;

		let result = match outcome {
			Ok(Ok(response)) => extract_result(response).map(|_| ()),
			Ok(Err(error)) => Err(error),
			Err(_) => Err(TransportError::Timeout(format!(
				"probe exceeded {}ms",
				self.config.probe_timeout_ms
			))),
		};

		state
			.last_checked_ms
			.store(Utc::now().timestamp_millis(), Ordering::Release);

		match result {
			Ok(()) => {
				state.latency_ms.store(latency, Ordering::Release);
				if latency < self.config.latency_threshold_ms {
					state.record_success();
				} else {
					state.last_probe_ok.store(false, Ordering::Release);
					state.record_failure(format!(
						"probe latency {}ms exceeds {}ms",
						latency, self.config.latency_threshold_ms
					));
				}
			}
			Err(error) => {
				state.last_probe_ok.store(false, Ordering::Release);
				state.record_failure(error.to_string());
			}
		}

		let is_healthy = state.is_healthy(&self.config);
		if was_healthy && !is_healthy {
			warn!(
				endpoint = %state.url,
				failures = state.failures(),
				latency_ms = latency,
				"Endpoint marked unhealthy"
			);
		} else if !was_healthy && is_healthy {
			info!(endpoint = %state.url, latency_ms = latency, "Endpoint recovered");
		}
	}

	/// Returns the healthy endpoint with the lowest latency
	///
	/// Unmeasured endpoints rank after measured ones; ties go to priority order.
	pub fn select_fastest_healthy(&self) -> String {
		self.fastest_healthy_where(|_| true)
			.unwrap_or_else(|| self.degraded_fallback())
	}

	/// Round-robins across healthy endpoints
	pub fn select_next_healthy(&self) -> String {
		let healthy: Vec<&EndpointState> = self
			.endpoints
			.iter()
			.filter(|state| state.is_healthy(&self.config))
			.collect();

		if healthy.is_empty() {
			return self.degraded_fallback();
		}

		let index = self.cursor.fetch_add(1, Ordering::Relaxed) % healthy.len();
		healthy[index].url.clone()
	}

	/// Picks a failover target that has not been tried yet
	///
	/// Prefers the fastest healthy endpoint outside `tried`, then any untried
	/// endpoint in priority order.
	///
	/// # Returns
	/// * `None` - Every endpoint has been tried
	pub fn select_excluding(&self, tried: &[String]) -> Option<String> {
		let untried = |state: &EndpointState| !tried.iter().any(|url| url == &state.url);

		self.fastest_healthy_where(untried).or_else(|| {
			let fallback = self.endpoints.iter().find(|state| untried(state))?;
			debug!(endpoint = %fallback.url, "No untried healthy endpoint, using next by priority");
			Some(fallback.url.clone())
		})
	}

	/// Records a successful live call
	pub fn report_success(&self, url: &str) {
		if let Some(state) = self.find(url) {
			let was_healthy = state.is_healthy(&self.config);
			state.record_success();
			if !was_healthy && state.is_healthy(&self.config) {
				info!(endpoint = %url, "Endpoint recovered after successful call");
			}
		}
	}

	/// Records a failed live call
	pub fn report_failure(&self, url: &str, reason: &str) {
		if let Some(state) = self.find(url) {
			let failures = state.record_failure(reason.to_string());
			if failures == self.config.max_failures {
				warn!(
					endpoint = %url,
					failures,
					reason,
					"Endpoint reached failure threshold"
				);
			}
		}
	}

	/// Marks an endpoint unhealthy until its next successful probe or call
	pub fn demote(&self, url: &str, reason: &str) {
		if let Some(state) = self.find(url) {
			state.last_probe_ok.store(false, Ordering::Release);
			*lock(&state.last_error) = Some(reason.to_string());
			warn!(endpoint = %url, reason, "Endpoint demoted");
		}
	}

	pub fn is_healthy(&self, url: &str) -> bool {
		self.find(url)
			.is_some_and(|state| state.is_healthy(&self.config))
	}

	pub fn healthy_count(&self) -> usize {
		self.endpoints
			.iter()
			.filter(|state| state.is_healthy(&self.config))
			.count()
	}

	/// Read-only view of every endpoint, in priority order
	pub fn snapshot(&self) -> Vec<EndpointSnapshot> {
		self.endpoints
			.iter()
			.map(|state| state.snapshot(&self.config))
			.collect()
	}

	fn find(&self, url: &str) -> Option<&EndpointState> {
		let state = self.endpoints.iter().find(|state| state.url == url);
		if state.is_none() {
			debug!(endpoint = %url, "Ignoring report for unknown endpoint");
		}
		state
	}

	fn fastest_healthy_where<F>(&self, predicate: F) -> Option<String>
	where
		F: Fn(&EndpointState) -> bool,
	{
		self.endpoints
			.iter()
			.enumerate()
			.filter(|(_, state)| state.is_healthy(&self.config) && predicate(state))
			.min_by_key(|(index, state)| (state.latency().unwrap_or(UNKNOWN_LATENCY), *index))
			.map(|(_, state)| state.url.clone())
	}

	fn degraded_fallback(&self) -> String {
		let first = &self.endpoints[0];
		warn!(
			endpoint = %first.url,
			"No healthy endpoints available, falling back to highest priority endpoint"
		);
		first.url.clone()
	}
}
