use proptest::{prelude::*, test_runner::Config};
use serde_json::json;

use rpc_sentinel::{
	models::{CallTags, TelemetryConfig},
	services::telemetry::TelemetryEngine,
};

use crate::properties::strategies::{call_plan_strategy, CallPlan};

const ENDPOINT: &str = "https://node.example";

fn replay(engine: &TelemetryEngine, plans: &[CallPlan]) {
	for plan in plans {
		let tags = CallTags {
			source: plan.source.clone(),
			..CallTags::default()
		};
		let id = engine.start_call(ENDPOINT, &plan.method, &json!([]), tags);
		for _ in 0..plan.retries {
			engine.record_retry(id, ENDPOINT);
		}
		if plan.finish {
			engine.finish_call(id, plan.error);
			// Finishing twice changes nothing
			assert!(engine.finish_call(id, None).is_none());
		}
	}
}

proptest! {
	#![proptest_config(Config {
		failure_persistence: None,
		..Config::default()
	})]

	#[test]
	fn test_aggregates_account_for_every_call(
		plans in call_plan_strategy(),
		history_size in 1..20usize,
	) {
		let engine = TelemetryEngine::new(TelemetryConfig {
			history_size,
			..TelemetryConfig::default()
		});
		replay(&engine, &plans);

		let finished: Vec<&CallPlan> = plans.iter().filter(|plan| plan.finish).collect();
		let failed = finished.iter().filter(|plan| plan.error.is_some()).count() as u64;
		let stats = engine.stats();

		prop_assert_eq!(stats.total_requests, finished.len() as u64);
		prop_assert_eq!(stats.success_count + stats.error_count, stats.total_requests);
		prop_assert_eq!(stats.error_count, failed);
		prop_assert_eq!(stats.pending_count, plans.len() - finished.len());
		prop_assert_eq!(engine.pending_count(), stats.pending_count);
		prop_assert_eq!(
			stats.total_retries,
			plans.iter().map(|plan| u64::from(plan.retries)).sum::<u64>()
		);

		let by_method: u64 = stats.by_method.values().map(|tally| tally.count).sum();
		prop_assert_eq!(by_method, stats.total_requests);
		let by_kind: u64 = stats.errors_by_kind.values().sum();
		prop_assert_eq!(by_kind, stats.error_count);
		let hourly: u64 = stats.hourly.iter().sum();
		prop_assert_eq!(hourly, stats.total_requests);

		let tagged = finished.iter().filter(|plan| plan.source.is_some()).count() as u64;
		let by_source: u64 = stats.by_source.values().map(|tally| tally.count).sum();
		prop_assert_eq!(by_source, tagged);
	}

	#[test]
	fn test_history_keeps_the_most_recent_calls(
		plans in call_plan_strategy(),
		history_size in 1..20usize,
	) {
		let engine = TelemetryEngine::new(TelemetryConfig {
			history_size,
			..TelemetryConfig::default()
		});
		replay(&engine, &plans);

		let finished: Vec<&CallPlan> = plans.iter().filter(|plan| plan.finish).collect();
		let history = engine.history();
		prop_assert_eq!(history.len(), finished.len().min(history_size));

		let expected = &finished[finished.len() - history.len()..];
		for (record, plan) in history.iter().zip(expected) {
			prop_assert_eq!(&record.method, &plan.method);
			prop_assert_eq!(record.error_kind, plan.error);
			prop_assert_eq!(record.retry_count, u32::from(plan.retries));
			prop_assert!(record.duration_ms.is_some());
			prop_assert!(record.finished_at.is_some());
		}
	}
}
