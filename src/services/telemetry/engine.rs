use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
	collections::{HashMap, VecDeque},
	sync::Mutex,
};
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
	models::{
		CallId, CallRecord, CallStatus, CallTags, ErrorKind, Insight, InsightKind, Severity,
		TelemetryConfig,
	},
	services::telemetry::stats::{CallStats, PerformanceReport},
	utils::sync::lock,
};

/// Diagnostic dump of the telemetry state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryExport {
	pub stats: CallStats,
	pub insights: Vec<Insight>,
	/// Most recent finished records, oldest first
	pub recent: Vec<CallRecord>,
	pub exported_at: DateTime<Utc>,
}

struct PendingRecord {
	record: CallRecord,
	started: Instant,
}

#[derive(Default)]
struct TelemetryState {
	pending: HashMap<CallId, PendingRecord>,
	history: VecDeque<CallRecord>,
	stats: CallStats,
	insights: VecDeque<Insight>,
	/// Start instants of calls in the trailing rate window
	call_starts: VecDeque<Instant>,
	/// Completion instants and success flags in the trailing window
	outcomes: VecDeque<(Instant, bool)>,
	rate_alarm: bool,
	error_alarm: bool,
}

/// Records call lifecycles and derives statistics and insights
///
/// Every operation takes one short lock and never fails, so instrumentation
/// cannot break the call it observes.
pub struct TelemetryEngine {
	state: Mutex<TelemetryState>,
	config: TelemetryConfig,
}

impl TelemetryEngine {
	pub fn new(config: TelemetryConfig) -> Self {
		Self {
			state: Mutex::new(TelemetryState::default()),
			config,
		}
	}

	pub fn config(&self) -> &TelemetryConfig {
		&self.config
	}

	/// Opens a pending record for a call about to be sent
	pub fn start_call(
		&self,
		endpoint: &str,
		method: &str,
		params: &Value,
		tags: CallTags,
	) -> CallId {
		let id = Uuid::new_v4();
		let record = CallRecord {
			id,
			endpoint: endpoint.to_string(),
			method: method.to_string(),
			params: params.clone(),
			tags,
			started_at: Utc::now(),
			finished_at: None,
			duration_ms: None,
			status: CallStatus::Pending,
			error_kind: None,
			retry_count: 0,
		};

		let now = Instant::now();
		let mut state = lock(&self.state);
		state.pending.insert(
			id,
			PendingRecord {
				record,
				started: now,
			},
		);
		state.call_starts.push_back(now);
		id
	}

	/// Notes that a pending call is being retried against `endpoint`
	pub fn record_retry(&self, id: CallId, endpoint: &str) {
		let mut state = lock(&self.state);
		let Some(pending) = state.pending.get_mut(&id) else {
			debug!(call_id = %id, "Ignoring retry for unknown call");
			return;
		};
		pending.record.retry_count += 1;
		pending.record.endpoint = endpoint.to_string();
		state.stats.total_retries += 1;
	}

	/// Closes a pending record and evaluates insights
	///
	/// Finishing an unknown or already finished call is a no-op.
	///
	/// # Arguments
	/// * `id` - Identifier returned by [`TelemetryEngine::start_call`]
	/// * `error` - Error kind, `None` on success
	///
	/// # Returns
	/// * `Option<CallRecord>` - The finalized record
	pub fn finish_call(&self, id: CallId, error: Option<ErrorKind>) -> Option<CallRecord> {
		let now = Instant::now();
		let mut state = lock(&self.state);

		let Some(PendingRecord {
			mut record,
			started,
		}) = state.pending.remove(&id)
		else {
			debug!(call_id = %id, "Ignoring finish for unknown call");
			return None;
		};

		let duration_ms = now.duration_since(started).as_millis() as u64;
		record.duration_ms = Some(duration_ms);
		record.finished_at =
			Some(record.started_at + chrono::Duration::milliseconds(duration_ms as i64));
		record.status = if error.is_some() {
			CallStatus::Error
		} else {
			CallStatus::Success
		};
		record.error_kind = error;

		state.stats.record(&record);
		state.outcomes.push_back((now, error.is_none()));
		while state.history.len() >= self.config.history_size {
			state.history.pop_front();
		}
		state.history.push_back(record.clone());

		let mut found = self.call_insights(&record);
		found.extend(self.window_insights(&mut state, now));
		self.push_insights(&mut state, found);

		Some(record)
	}

	/// Periodic re-evaluation of the trailing window
	///
	/// # Returns
	/// * `Vec<Insight>` - Insights raised by this sweep
	pub fn sweep(&self) -> Vec<Insight> {
		let mut state = lock(&self.state);
		let found = self.window_insights(&mut state, Instant::now());
		self.push_insights(&mut state, found.clone());
		found
	}

	/// Currently retained insights, oldest first
	pub fn insights(&self) -> Vec<Insight> {
		lock(&self.state).insights.iter().cloned().collect()
	}

	pub fn stats(&self) -> CallStats {
		let state = lock(&self.state);
		let mut stats = state.stats.clone();
		stats.pending_count = state.pending.len();
		stats
	}

	/// Finished records still in the rolling history, oldest first
	pub fn history(&self) -> Vec<CallRecord> {
		lock(&self.state).history.iter().cloned().collect()
	}

	pub fn pending_count(&self) -> usize {
		lock(&self.state).pending.len()
	}

	pub fn export(&self) -> TelemetryExport {
		let state = lock(&self.state);
		let mut stats = state.stats.clone();
		stats.pending_count = state.pending.len();
		let skip = state.history.len().saturating_sub(self.config.export_recent);

		TelemetryExport {
			stats,
			insights: state.insights.iter().cloned().collect(),
			recent: state.history.iter().skip(skip).cloned().collect(),
			exported_at: Utc::now(),
		}
	}

	pub fn report(&self) -> PerformanceReport {
		let state = lock(&self.state);
		PerformanceReport::build(&state.stats, &state.history)
	}

	/// Aggregates over the history records tagged with `source`
	pub fn stats_for_source(&self, source: &str) -> CallStats {
		let state = lock(&self.state);
		CallStats::from_records(
			state
				.history
				.iter()
				.filter(|record| record.tags.source.as_deref() == Some(source)),
		)
	}

	/// Aggregates over the history records tagged with `contract`
	pub fn stats_for_contract(&self, contract: &str) -> CallStats {
		let state = lock(&self.state);
		CallStats::from_records(
			state
				.history
				.iter()
				.filter(|record| record.tags.contract.as_deref() == Some(contract)),
		)
	}

	/// Drops history, aggregates and insights; pending calls stay open
	pub fn clear(&self) {
		let mut state = lock(&self.state);
		state.history.clear();
		state.stats = CallStats::default();
		state.insights.clear();
		state.call_starts.clear();
		state.outcomes.clear();
		state.rate_alarm = false;
		state.error_alarm = false;
	}

	fn call_insights(&self, record: &CallRecord) -> Vec<Insight> {
		let mut found = Vec::new();
		let duration_ms = record.duration_ms.unwrap_or_default();

		if duration_ms > self.config.slow_call_ms {
			found.push(
				Insight::new(
					InsightKind::SlowCall,
					Severity::Warning,
					format!(
						"{} took {}ms (threshold {}ms)",
						record.method, duration_ms, self.config.slow_call_ms
					),
				)
				.with_method(&record.method)
				.with_endpoint(&record.endpoint),
			);
		}

		if record.is_error() && record.retry_count > self.config.repeated_failure_retries {
			found.push(
				Insight::new(
					InsightKind::RepeatedFailure,
					Severity::Critical,
					format!(
						"{} failed after {} retries",
						record.method, record.retry_count
					),
				)
				.with_method(&record.method)
				.with_endpoint(&record.endpoint),
			);
		}

		found
	}

	/// Evaluates the latched window conditions
	///
	/// Each condition raises one insight when it is crossed and re-arms only
	/// once it has cleared.
	fn window_insights(&self, state: &mut TelemetryState, now: Instant) -> Vec<Insight> {
		let window = self.config.rate_window();
		let expired = |at: &Instant| now.duration_since(*at) >= window;
		while state.call_starts.front().is_some_and(expired) {
			state.call_starts.pop_front();
		}
		while state.outcomes.front().is_some_and(|(at, _)| expired(at)) {
			state.outcomes.pop_front();
		}

		let mut found = Vec::new();

		let calls = state.call_starts.len();
		if calls > self.config.max_calls_per_window {
			if !state.rate_alarm {
				state.rate_alarm = true;
				found.push(Insight::new(
					InsightKind::ExcessiveCallRate,
					Severity::Warning,
					format!(
						"{} calls in the last {}s (limit {})",
						calls,
						window.as_secs(),
						self.config.max_calls_per_window
					),
				));
			}
		} else {
			state.rate_alarm = false;
		}

		let samples = state.outcomes.len();
		let errors = state.outcomes.iter().filter(|(_, ok)| !ok).count();
		let error_rate = if samples == 0 {
			0.0
		} else {
			errors as f64 / samples as f64
		};
		if samples >= self.config.min_error_samples
			&& error_rate > self.config.error_rate_threshold
		{
			if !state.error_alarm {
				state.error_alarm = true;
				let severity = if error_rate > 0.5 {
					Severity::Critical
				} else {
					Severity::Warning
				};
				found.push(Insight::new(
					InsightKind::ElevatedErrorRate,
					severity,
					format!(
						"{:.1}% of {} calls failed in the last {}s",
						error_rate * 100.0,
						samples,
						window.as_secs()
					),
				));
			}
		} else {
			state.error_alarm = false;
		}

		found
	}

	fn push_insights(&self, state: &mut TelemetryState, found: Vec<Insight>) {
		for insight in found {
			info!(
				kind = ?insight.kind,
				severity = ?insight.severity,
				method = insight.method.as_deref().unwrap_or("-"),
				"{}",
				insight.message
			);
			while state.insights.len() >= self.config.max_insights {
				state.insights.pop_front();
			}
			state.insights.push_back(insight);
		}
	}
}
