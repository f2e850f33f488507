//! Aggregates and performance report derived from call records.

use chrono::{Local, Timelike};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, collections::BTreeMap};

use crate::models::{CallRecord, ErrorKind};

/// Count, error and duration totals for one dimension value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tally {
	pub count: u64,
	pub errors: u64,
	pub total_duration_ms: u64,
}

impl Tally {
	fn record(&mut self, duration_ms: u64, is_error: bool) {
		self.count += 1;
		self.total_duration_ms = self.total_duration_ms.saturating_add(duration_ms);
		if is_error {
			self.errors += 1;
		}
	}

	pub fn average_duration_ms(&self) -> f64 {
		if self.count == 0 {
			0.0
		} else {
			self.total_duration_ms as f64 / self.count as f64
		}
	}

	pub fn error_rate(&self) -> f64 {
		if self.count == 0 {
			0.0
		} else {
			self.errors as f64 / self.count as f64
		}
	}
}

/// Rolling aggregates over every finished call
///
/// `total_requests` counts finished calls only, so it always equals
/// `success_count + error_count`. Calls still running are in `pending_count`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallStats {
	pub total_requests: u64,
	pub success_count: u64,
	pub error_count: u64,
	pub pending_count: usize,
	pub total_retries: u64,
	pub total_duration_ms: u64,
	pub average_duration_ms: f64,
	pub by_method: BTreeMap<String, Tally>,
	pub by_endpoint: BTreeMap<String, Tally>,
	pub by_contract: BTreeMap<String, Tally>,
	pub by_source: BTreeMap<String, Tally>,
	pub errors_by_kind: BTreeMap<ErrorKind, u64>,
	/// Calls started in each local hour of the day
	pub hourly: [u64; 24],
}

impl CallStats {
	/// Aggregates over a set of finished records
	pub fn from_records<'a, I>(records: I) -> Self
	where
		I: IntoIterator<Item = &'a CallRecord>,
	{
		let mut stats = Self::default();
		for record in records {
			stats.record(record);
			stats.total_retries += u64::from(record.retry_count);
		}
		stats
	}

	/// Folds one finished record into the aggregates
	///
	/// Retries are counted as they happen, not here.
	pub(crate) fn record(&mut self, record: &CallRecord) {
		let duration_ms = record.duration_ms.unwrap_or_default();
		let is_error = record.is_error();

		self.total_requests += 1;
		if is_error {
			self.error_count += 1;
		} else {
			self.success_count += 1;
		}
		self.total_duration_ms = self.total_duration_ms.saturating_add(duration_ms);
		self.average_duration_ms = self.total_duration_ms as f64 / self.total_requests as f64;

		self.by_method
			.entry(record.method.clone())
			.or_default()
			.record(duration_ms, is_error);
		self.by_endpoint
			.entry(record.endpoint.clone())
			.or_default()
			.record(duration_ms, is_error);
		if let Some(contract) = &record.tags.contract {
			self.by_contract
				.entry(contract.clone())
				.or_default()
				.record(duration_ms, is_error);
		}
		if let Some(source) = &record.tags.source {
			self.by_source
				.entry(source.clone())
				.or_default()
				.record(duration_ms, is_error);
		}
		if let Some(kind) = record.error_kind {
			*self.errors_by_kind.entry(kind).or_default() += 1;
		}

		let hour = record.started_at.with_timezone(&Local).hour() as usize;
		self.hourly[hour % 24] += 1;
	}

	pub fn success_rate(&self) -> f64 {
		if self.total_requests == 0 {
			0.0
		} else {
			self.success_count as f64 / self.total_requests as f64
		}
	}
}

/// Letter grade on average call duration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
	A,
	B,
	C,
	D,
	F,
}

impl Grade {
	pub fn from_average_ms(average_ms: f64) -> Self {
		match average_ms {
			avg if avg < 300.0 => Self::A,
			avg if avg < 600.0 => Self::B,
			avg if avg < 1_200.0 => Self::C,
			avg if avg < 2_400.0 => Self::D,
			_ => Self::F,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionBucket {
	pub label: String,
	pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodSummary {
	pub method: String,
	pub count: u64,
	pub average_duration_ms: f64,
	pub error_rate: f64,
}

impl MethodSummary {
	fn new(method: &str, tally: &Tally) -> Self {
		Self {
			method: method.to_string(),
			count: tally.count,
			average_duration_ms: tally.average_duration_ms(),
			error_rate: tally.error_rate(),
		}
	}
}

/// Human-oriented summary of recorded performance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
	pub grade: Grade,
	pub total_requests: u64,
	pub success_rate: f64,
	pub average_duration_ms: f64,
	/// Response times of the calls still in history
	pub distribution: Vec<DistributionBucket>,
	/// Most called methods, up to five
	pub top_methods: Vec<MethodSummary>,
	/// Methods with the highest average duration, up to five
	pub slowest_methods: Vec<MethodSummary>,
}

const BUCKETS: [(&str, u64); 5] = [
	("0-100ms", 100),
	("100-500ms", 500),
	("500ms-1s", 1_000),
	("1-3s", 3_000),
	("3s+", u64::MAX),
];

const TOP_N: usize = 5;

impl PerformanceReport {
	pub fn build<'a, I>(stats: &CallStats, history: I) -> Self
	where
		I: IntoIterator<Item = &'a CallRecord>,
	{
		let mut counts = [0usize; BUCKETS.len()];
		for duration in history.into_iter().filter_map(|record| record.duration_ms) {
			let index = BUCKETS
				.iter()
				.position(|(_, upper)| duration < *upper)
				.unwrap_or(BUCKETS.len() - 1);
			counts[index] += 1;
		}
		let distribution = BUCKETS
			.iter()
			.zip(counts)
			.map(|((label, _), count)| DistributionBucket {
				label: label.to_string(),
				count,
			})
			.collect();

		let top_methods = stats
			.by_method
			.iter()
			.sorted_by(|a, b| b.1.count.cmp(&a.1.count).then_with(|| a.0.cmp(b.0)))
			.take(TOP_N)
			.map(|(method, tally)| MethodSummary::new(method, tally))
			.collect();

		let slowest_methods = stats
			.by_method
			.iter()
			.sorted_by(|a, b| {
				b.1.average_duration_ms()
					.partial_cmp(&a.1.average_duration_ms())
					.unwrap_or(Ordering::Equal)
					.then_with(|| a.0.cmp(b.0))
			})
			.take(TOP_N)
			.map(|(method, tally)| MethodSummary::new(method, tally))
			.collect();

		Self {
			grade: Grade::from_average_ms(stats.average_duration_ms),
			total_requests: stats.total_requests,
			success_rate: stats.success_rate(),
			average_duration_ms: stats.average_duration_ms,
			distribution,
			top_methods,
			slowest_methods,
		}
	}
}
