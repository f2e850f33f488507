use proptest::{prelude::*, test_runner::Config};
use serde_json::{json, Value};
use std::{
	sync::{
		atomic::{AtomicUsize, Ordering},
		Arc,
	},
	time::Duration,
};

use futures::future::join_all;
use rpc_sentinel::services::dedup::{call_key, RequestDeduplicator};

use crate::properties::strategies::json_params_strategy;

fn runtime() -> tokio::runtime::Runtime {
	tokio::runtime::Builder::new_current_thread()
		.enable_time()
		.start_paused(true)
		.build()
		.unwrap()
}

proptest! {
	#![proptest_config(Config {
		failure_persistence: None,
		..Config::default()
	})]

	#[test]
	fn test_call_key_separates_methods(
		params in json_params_strategy(),
	) {
		let key = call_key("eth_call", &params);
		prop_assert_eq!(&key, &call_key("eth_call", &params.clone()));
		prop_assert_ne!(&key, &call_key("eth_getBalance", &params));
		prop_assert!(key.starts_with("eth_call:"));
		let round_trip: Value = serde_json::from_str(&key["eth_call:".len()..]).unwrap();
		prop_assert_eq!(round_trip, params);
	}

	#[test]
	fn test_concurrent_callers_share_one_execution(
		params in json_params_strategy(),
		callers in 1..16usize,
		delay_ms in 1..500u64,
	) {
		let (outcomes, executions, stats) = runtime().block_on(async {
			let dedup = RequestDeduplicator::<Result<Value, String>>::new(Duration::from_secs(5));
			let executions = Arc::new(AtomicUsize::new(0));
			let key = call_key("eth_call", &params);

			let outcomes = join_all((0..callers).map(|caller| {
				let executions = Arc::clone(&executions);
				dedup.execute(&key, async move {
					executions.fetch_add(1, Ordering::SeqCst);
					tokio::time::sleep(Duration::from_millis(delay_ms)).await;
					Ok(json!(caller))
				})
			}))
			.await;

			(outcomes, executions.load(Ordering::SeqCst), dedup.stats())
		});

		prop_assert_eq!(executions, 1);
		prop_assert!(outcomes.iter().all(|outcome| outcome == &outcomes[0]));
		prop_assert_eq!(stats.in_flight, 0);
		let key_stats = stats.keys.values().next().unwrap();
		prop_assert_eq!(key_stats.requests, callers as u64);
		prop_assert_eq!(key_stats.joins, callers as u64 - 1);
	}
}
