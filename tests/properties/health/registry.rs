use proptest::{prelude::*, test_runner::Config};

use rpc_sentinel::{
	models::{EndpointConfig, HealthConfig},
	services::health::EndpointHealthRegistry,
};

use crate::properties::strategies::{health_events_strategy, HealthEvent};

const ENDPOINTS: usize = 4;

fn urls() -> Vec<String> {
	(0..ENDPOINTS)
		.map(|index| format!("https://node-{}.example", index))
		.collect()
}

fn create_registry(max_failures: u32) -> EndpointHealthRegistry {
	let endpoints: Vec<EndpointConfig> = urls()
		.into_iter()
		.enumerate()
		.map(|(index, url)| EndpointConfig::new(url, index as u32))
		.collect();
	EndpointHealthRegistry::new(
		&endpoints,
		HealthConfig {
			max_failures,
			..HealthConfig::default()
		},
	)
	.unwrap()
}

proptest! {
	#![proptest_config(Config {
		failure_persistence: None,
		..Config::default()
	})]

	#[test]
	fn test_health_follows_failure_streaks(
		events in health_events_strategy(ENDPOINTS),
		max_failures in 1..5u32,
	) {
		let urls = urls();
		let registry = create_registry(max_failures);
		let mut streaks = [0u32; ENDPOINTS];
		let mut demoted = [false; ENDPOINTS];

		for event in events {
			match event {
				HealthEvent::Success(index) => {
					registry.report_success(&urls[index]);
					streaks[index] = 0;
					demoted[index] = false;
				}
				HealthEvent::Failure(index) => {
					registry.report_failure(&urls[index], "failure");
					streaks[index] += 1;
				}
				HealthEvent::Demote(index) => {
					registry.demote(&urls[index], "demoted");
					demoted[index] = true;
				}
			}

			let snapshot = registry.snapshot();
			for index in 0..ENDPOINTS {
				let expected = streaks[index] < max_failures && !demoted[index];
				prop_assert_eq!(snapshot[index].consecutive_failures, streaks[index]);
				prop_assert_eq!(snapshot[index].is_healthy, expected);
				prop_assert_eq!(registry.is_healthy(&urls[index]), expected);
			}
		}
	}

	#[test]
	fn test_selection_always_returns_a_configured_endpoint(
		events in health_events_strategy(ENDPOINTS),
	) {
		let urls = urls();
		let registry = create_registry(2);

		for event in events {
			match event {
				HealthEvent::Success(index) => registry.report_success(&urls[index]),
				HealthEvent::Failure(index) => registry.report_failure(&urls[index], "failure"),
				HealthEvent::Demote(index) => registry.demote(&urls[index], "demoted"),
			}
		}

		let fastest = registry.select_fastest_healthy();
		let next = registry.select_next_healthy();
		prop_assert!(urls.contains(&fastest));
		prop_assert!(urls.contains(&next));

		if registry.healthy_count() > 0 {
			prop_assert!(registry.is_healthy(&fastest));
			prop_assert!(registry.is_healthy(&next));
			// Unmeasured endpoints tie on latency, so priority decides
			let first_healthy = urls.iter().find(|url| registry.is_healthy(url)).unwrap();
			prop_assert_eq!(&fastest, first_healthy);
		} else {
			prop_assert_eq!(&fastest, &urls[0]);
			prop_assert_eq!(&next, &urls[0]);
		}
	}

	#[test]
	fn test_failover_never_repeats_an_endpoint(
		events in health_events_strategy(ENDPOINTS),
	) {
		let urls = urls();
		let registry = create_registry(1);
		for event in events {
			if let HealthEvent::Failure(index) = event {
				registry.report_failure(&urls[index], "failure");
			}
		}

		let mut tried = vec![registry.select_fastest_healthy()];
		while let Some(next) = registry.select_excluding(&tried) {
			prop_assert!(!tried.contains(&next));
			tried.push(next);
		}

		let mut sorted = tried.clone();
		sorted.sort();
		let mut expected = urls.clone();
		expected.sort();
		prop_assert_eq!(sorted, expected);
	}
}
