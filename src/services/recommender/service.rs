use chrono::Utc;
use itertools::Itertools;
use serde_json::json;
use std::{
	collections::{HashMap, VecDeque},
	sync::{Arc, Mutex},
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
	models::{
		CallConfig, CallRecord, Priority, Recommendation, RecommendationKind, RecommenderConfig,
	},
	services::{dedup::call_key, telemetry::TelemetryEngine},
	utils::{constants::OBSERVER_SOURCE, sync::lock},
};

const MINUTE_MS: u64 = 60_000;

/// A finding before it is merged into the retained list
struct Finding {
	kind: RecommendationKind,
	call_group: String,
	current: serde_json::Value,
	suggested: serde_json::Value,
	rationale: String,
	impact: u8,
}

/// Derives tuning suggestions from telemetry history
pub struct OptimizationRecommender {
	telemetry: Arc<TelemetryEngine>,
	config: RecommenderConfig,
	call: CallConfig,
	recommendations: Mutex<VecDeque<Recommendation>>,
}

impl OptimizationRecommender {
	/// # Arguments
	/// * `telemetry` - Source of call history
	/// * `config` - Rule thresholds and retention
	/// * `call` - Live call policy the suggestions are compared against
	pub fn new(telemetry: Arc<TelemetryEngine>, config: RecommenderConfig, call: CallConfig) -> Self {
		Self {
			telemetry,
			config,
			call,
			recommendations: Mutex::new(VecDeque::new()),
		}
	}

	pub fn config(&self) -> &RecommenderConfig {
		&self.config
	}

	/// Runs every rule over the current history
	///
	/// Findings replace earlier recommendations of the same kind and call group.
	///
	/// # Returns
	/// * `Vec<Recommendation>` - Recommendations produced by this pass
	pub fn analyze(&self) -> Vec<Recommendation> {
		let history = self.telemetry.history();

		let mut findings = self.cache_findings(&history);
		findings.extend(self.retry_findings(&history));
		findings.extend(self.batch_findings(&history));
		findings.extend(self.timeout_findings(&history));

		let mut retained = lock(&self.recommendations);
		let produced: Vec<Recommendation> = findings
			.into_iter()
			.map(|finding| {
				let previous = retained
					.iter()
					.position(|r| r.kind == finding.kind && r.call_group == finding.call_group)
					.and_then(|index| retained.remove(index));
				let recommendation = Recommendation {
					id: previous.map_or_else(Uuid::new_v4, |r| r.id),
					kind: finding.kind,
					call_group: finding.call_group,
					current: finding.current,
					suggested: finding.suggested,
					rationale: finding.rationale,
					estimated_impact_pct: finding.impact,
					priority: Priority::from_impact(finding.impact),
					created_at: Utc::now(),
				};
				debug!(
					kind = ?recommendation.kind,
					group = %recommendation.call_group,
					impact = recommendation.estimated_impact_pct,
					"{}",
					recommendation.rationale
				);
				retained.push_back(recommendation.clone());
				recommendation
			})
			.collect();

		while retained.len() > self.config.max_recommendations {
			retained.pop_front();
		}

		if !produced.is_empty() {
			info!(
				produced = produced.len(),
				retained = retained.len(),
				"Optimization analysis completed"
			);
		}
		produced
	}

	/// Retained recommendations, oldest first
	pub fn recommendations(&self) -> Vec<Recommendation> {
		lock(&self.recommendations).iter().cloned().collect()
	}

	pub fn clear(&self) {
		lock(&self.recommendations).clear();
	}

	/// Identical calls that could be served from a cache
	fn cache_findings(&self, history: &[CallRecord]) -> Vec<Finding> {
		history
			.iter()
			// Observer polling is not cacheable
			.filter(|record| record.tags.source.as_deref() != Some(OBSERVER_SOURCE))
			.into_group_map_by(|record| call_key(&record.method, &record.params))
			.into_iter()
			.filter(|(_, calls)| calls.len() >= self.config.duplicate_threshold)
			.sorted_by(|a, b| a.0.cmp(&b.0))
			.map(|(key, calls)| {
				let frequency = calls.len();
				let average = average_duration(calls.iter().copied());
				let stale_minutes = if average > 2_000.0 && frequency > 10 {
					15
				} else if frequency > 20 {
					10
				} else {
					5
				};
				Finding {
					kind: RecommendationKind::Cache,
					rationale: format!(
						"{} was called {} times with identical parameters (avg {:.0}ms)",
						calls[0].method, frequency, average
					),
					call_group: key,
					current: json!({ "stale_time_ms": 0 }),
					suggested: json!({ "stale_time_ms": stale_minutes * MINUTE_MS }),
					impact: clamp_impact(frequency as f64 * 2.0, 80),
				}
			})
			.collect()
	}

	/// Methods whose calls keep needing retries
	fn retry_findings(&self, history: &[CallRecord]) -> Vec<Finding> {
		let by_method: HashMap<&str, Vec<&CallRecord>> = history
			.iter()
			.map(|record| (record.method.as_str(), record))
			.into_group_map();

		by_method
			.into_iter()
			.filter(|(_, calls)| calls.len() >= self.config.min_samples)
			.sorted_by(|a, b| a.0.cmp(b.0))
			.filter_map(|(method, calls)| {
				let retries: u64 = calls.iter().map(|r| u64::from(r.retry_count)).sum();
				let rate = retries as f64 / calls.len() as f64;
				if rate <= self.config.retry_rate_threshold {
					return None;
				}
				let (max_attempts, delay_ms) = if rate > 0.3 { (2, 2_000) } else { (3, 1_500) };
				Some(Finding {
					kind: RecommendationKind::Retry,
					call_group: method.to_string(),
					current: json!({
						"max_attempts": self.call.max_attempts,
						"retry_delay_ms": self.call.retry_delay_ms,
					}),
					suggested: json!({
						"max_attempts": max_attempts,
						"retry_delay_ms": delay_ms,
					}),
					rationale: format!(
						"{} needed {:.0}% retries over {} calls",
						method,
						rate * 100.0,
						calls.len()
					),
					impact: clamp_impact(rate * 100.0, 50),
				})
			})
			.collect()
	}

	/// Bursts of calls to one contract that could share a request
	fn batch_findings(&self, history: &[CallRecord]) -> Vec<Finding> {
		let window = chrono::Duration::milliseconds(self.config.batch_window_ms as i64);
		let by_contract: HashMap<&str, Vec<&CallRecord>> = history
			.iter()
			.filter_map(|record| record.tags.contract.as_deref().map(|contract| (contract, record)))
			.into_group_map();

		by_contract
			.into_iter()
			.sorted_by(|a, b| a.0.cmp(b.0))
			.filter_map(|(contract, mut calls)| {
				calls.sort_by_key(|record| record.started_at);
				// Largest number of calls starting within one window
				let mut burst = 0;
				let mut start = 0;
				for end in 0..calls.len() {
					while calls[end].started_at - calls[start].started_at > window {
						start += 1;
					}
					burst = burst.max(end - start + 1);
				}
				if burst < self.config.batch_min_calls {
					return None;
				}
				Some(Finding {
					kind: RecommendationKind::Batch,
					call_group: contract.to_string(),
					current: json!({ "batch_size": 1 }),
					suggested: json!({ "batch_size": burst }),
					rationale: format!(
						"{} calls to {} started within {}ms",
						burst, contract, self.config.batch_window_ms
					),
					impact: clamp_impact(burst as f64 * 10.0, 70),
				})
			})
			.collect()
	}

	/// Endpoints whose latency leaves too little headroom under the call timeout
	fn timeout_findings(&self, history: &[CallRecord]) -> Vec<Finding> {
		let comfort_ms = self.call.timeout_ms as f64 * self.config.comfort_ratio;
		let by_endpoint: HashMap<&str, Vec<u64>> = history
			.iter()
			.filter_map(|record| record.duration_ms.map(|d| (record.endpoint.as_str(), d)))
			.into_group_map();

		by_endpoint
			.into_iter()
			.filter(|(_, durations)| durations.len() >= self.config.min_samples)
			.sorted_by(|a, b| a.0.cmp(b.0))
			.filter_map(|(endpoint, mut durations)| {
				let average = durations.iter().sum::<u64>() as f64 / durations.len() as f64;
				if average <= comfort_ms {
					return None;
				}
				durations.sort_unstable();
				let p95_index = ((durations.len() as f64 * 0.95).ceil() as usize)
					.saturating_sub(1)
					.min(durations.len() - 1);
				let p95 = durations[p95_index] as f64;
				let suggested_ms = round_up_to_second((average * 2.0).max(p95 * 1.2));

				Some(Finding {
					kind: RecommendationKind::Timeout,
					call_group: endpoint.to_string(),
					current: json!({ "timeout_ms": self.call.timeout_ms }),
					suggested: json!({ "timeout_ms": suggested_ms }),
					rationale: format!(
						"{} averages {:.0}ms (p95 {:.0}ms) against a {}ms timeout",
						endpoint, average, p95, self.call.timeout_ms
					),
					impact: 20,
				})
			})
			.collect()
	}
}

fn average_duration<'a>(records: impl Iterator<Item = &'a CallRecord>) -> f64 {
	let (total, count) = records.fold((0u64, 0u64), |(total, count), record| {
		(total + record.duration_ms.unwrap_or_default(), count + 1)
	});
	if count == 0 {
		0.0
	} else {
		total as f64 / count as f64
	}
}

fn clamp_impact(raw: f64, max: u8) -> u8 {
	raw.round().clamp(0.0, f64::from(max)) as u8
}

fn round_up_to_second(ms: f64) -> u64 {
	((ms / 1_000.0).ceil() as u64).max(1) * 1_000
}
