//! Metrics module for the application.
//!
//! - This module contains the global Prometheus registry.
//! - Defines gauges mirroring endpoint health, call telemetry and the observer.
//! - Gauges are refreshed from service snapshots at scrape time.

pub mod server;
use lazy_static::lazy_static;
use prometheus::{Encoder, Gauge, GaugeVec, Opts, Registry, TextEncoder};

use crate::{
	models::{EndpointSnapshot, ObserverStatus},
	services::{
		access::{NodeAccessService, TelemetrySnapshot},
		blockchain::NodeTransport,
	},
};

lazy_static! {
	// Global Prometheus registry.
	pub static ref REGISTRY: Registry = Registry::new();

	// Gauge Vector for per-endpoint health (1 healthy, 0 unhealthy)
	pub static ref ENDPOINT_HEALTHY: GaugeVec = {
		let gauge = GaugeVec::new(
			Opts::new("endpoint_healthy", "Whether an endpoint is currently healthy"),
			&["endpoint"]
		).unwrap();
		REGISTRY.register(Box::new(gauge.clone())).unwrap();
		gauge
	};

	// Gauge Vector for the latest probe latency per endpoint
	pub static ref ENDPOINT_LATENCY_MS: GaugeVec = {
		let gauge = GaugeVec::new(
			Opts::new("endpoint_latency_ms", "Latency of the most recent probe in milliseconds"),
			&["endpoint"]
		).unwrap();
		REGISTRY.register(Box::new(gauge.clone())).unwrap();
		gauge
	};

	// Gauge Vector for consecutive failures per endpoint
	pub static ref ENDPOINT_FAILURES: GaugeVec = {
		let gauge = GaugeVec::new(
			Opts::new("endpoint_consecutive_failures", "Failures since the last success"),
			&["endpoint"]
		).unwrap();
		REGISTRY.register(Box::new(gauge.clone())).unwrap();
		gauge
	};

	// Gauge for the number of healthy endpoints
	pub static ref ENDPOINTS_HEALTHY: Gauge = {
		let gauge = Gauge::new("endpoints_healthy", "Number of healthy endpoints").unwrap();
		REGISTRY.register(Box::new(gauge.clone())).unwrap();
		gauge
	};

	// Gauge for finished calls
	pub static ref CALLS_TOTAL: Gauge = {
		let gauge = Gauge::new("calls_total", "Finished RPC calls").unwrap();
		REGISTRY.register(Box::new(gauge.clone())).unwrap();
		gauge
	};

	// Gauge for failed calls
	pub static ref CALL_ERRORS: Gauge = {
		let gauge = Gauge::new("call_errors_total", "Finished RPC calls that failed").unwrap();
		REGISTRY.register(Box::new(gauge.clone())).unwrap();
		gauge
	};

	// Gauge for calls still in flight
	pub static ref CALLS_PENDING: Gauge = {
		let gauge = Gauge::new("calls_pending", "RPC calls still in flight").unwrap();
		REGISTRY.register(Box::new(gauge.clone())).unwrap();
		gauge
	};

	// Gauge for the average call duration
	pub static ref CALL_AVERAGE_DURATION_MS: Gauge = {
		let gauge = Gauge::new("call_average_duration_ms", "Average duration of finished calls").unwrap();
		REGISTRY.register(Box::new(gauge.clone())).unwrap();
		gauge
	};

	// Gauge Vector for finished calls per method
	pub static ref METHOD_CALLS: GaugeVec = {
		let gauge = GaugeVec::new(
			Opts::new("method_calls", "Finished RPC calls per method"),
			&["method"]
		).unwrap();
		REGISTRY.register(Box::new(gauge.clone())).unwrap();
		gauge
	};

	// Gauge for retained telemetry insights
	pub static ref INSIGHTS_TOTAL: Gauge = {
		let gauge = Gauge::new("insights_total", "Retained telemetry insights").unwrap();
		REGISTRY.register(Box::new(gauge.clone())).unwrap();
		gauge
	};

	// Gauge for retained recommendations
	pub static ref RECOMMENDATIONS_TOTAL: Gauge = {
		let gauge = Gauge::new("recommendations_total", "Retained optimization recommendations").unwrap();
		REGISTRY.register(Box::new(gauge.clone())).unwrap();
		gauge
	};

	// Gauge for the observer mode (0 unknown, 1 filter, 2 polling)
	pub static ref OBSERVER_MODE: Gauge = {
		let gauge = Gauge::new("observer_mode", "Event observer mode: 0 unknown, 1 filter, 2 polling").unwrap();
		REGISTRY.register(Box::new(gauge.clone())).unwrap();
		gauge
	};

	// Gauge for active subscriptions
	pub static ref SUBSCRIPTIONS_ACTIVE: Gauge = {
		let gauge = Gauge::new("subscriptions_active", "Registered event subscriptions").unwrap();
		REGISTRY.register(Box::new(gauge.clone())).unwrap();
		gauge
	};

	// Gauge for observed (address, event) groups
	pub static ref OBSERVER_GROUPS: Gauge = {
		let gauge = Gauge::new("observer_groups", "Observed contract event groups").unwrap();
		REGISTRY.register(Box::new(gauge.clone())).unwrap();
		gauge
	};

	// Gauge for deduplicated operations in flight
	pub static ref DEDUP_IN_FLIGHT: Gauge = {
		let gauge = Gauge::new("dedup_in_flight", "Deduplicated operations in flight").unwrap();
		REGISTRY.register(Box::new(gauge.clone())).unwrap();
		gauge
	};
}

/// Gather all metrics and encode into the provided format.
pub fn gather_metrics() -> Result<Vec<u8>, Box<dyn std::error::Error>> {
	let encoder = TextEncoder::new();
	let metric_families = REGISTRY.gather();
	let mut buffer = Vec::new();
	encoder.encode(&metric_families, &mut buffer)?;
	Ok(buffer)
}

/// Updates the per-endpoint health gauges.
pub fn update_endpoint_metrics(endpoints: &[EndpointSnapshot]) {
	ENDPOINT_HEALTHY.reset();
	ENDPOINT_LATENCY_MS.reset();
	ENDPOINT_FAILURES.reset();

	for endpoint in endpoints {
		let labels = [endpoint.url.as_str()];
		ENDPOINT_HEALTHY
			.with_label_values(&labels)
			.set(if endpoint.is_healthy { 1.0 } else { 0.0 });
		if let Some(latency) = endpoint.last_latency_ms {
			ENDPOINT_LATENCY_MS
				.with_label_values(&labels)
				.set(latency as f64);
		}
		ENDPOINT_FAILURES
			.with_label_values(&labels)
			.set(endpoint.consecutive_failures as f64);
	}

	ENDPOINTS_HEALTHY.set(endpoints.iter().filter(|e| e.is_healthy).count() as f64);
}

/// Updates call and insight gauges.
pub fn update_call_metrics(snapshot: &TelemetrySnapshot) {
	let stats = &snapshot.stats;
	CALLS_TOTAL.set(stats.total_requests as f64);
	CALL_ERRORS.set(stats.error_count as f64);
	CALLS_PENDING.set(stats.pending_count as f64);
	CALL_AVERAGE_DURATION_MS.set(stats.average_duration_ms);

	METHOD_CALLS.reset();
	for (method, tally) in &stats.by_method {
		METHOD_CALLS
			.with_label_values(&[method.as_str()])
			.set(tally.count as f64);
	}

	INSIGHTS_TOTAL.set(snapshot.insights.len() as f64);
}

/// Updates observer gauges.
pub fn update_observer_metrics(status: &ObserverStatus) {
	OBSERVER_MODE.set(status.mode.as_gauge());
	SUBSCRIPTIONS_ACTIVE.set(status.subscriptions as f64);
	OBSERVER_GROUPS.set(status.groups.len() as f64);
}

/// Refreshes every gauge from the service's current snapshots.
pub fn update_access_metrics<T: NodeTransport + 'static>(service: &NodeAccessService<T>) {
	update_endpoint_metrics(&service.get_health_snapshot());
	update_call_metrics(&service.get_telemetry_snapshot());
	update_observer_metrics(&service.observer_status());
	RECOMMENDATIONS_TOTAL.set(service.get_recommendations().len() as f64);
	DEDUP_IN_FLIGHT.set(service.dedup_stats().in_flight as f64);
}
