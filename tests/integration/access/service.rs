use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;
use std::{
	sync::{Arc, Mutex},
	time::Duration,
};

use rpc_sentinel::{
	bootstrap::initialize_services,
	models::{AccessConfig, CallTags, DecodedEvent, EventBatch, ObserverMode, RecommendationKind},
	services::{
		access::{AccessError, NodeAccessService},
		blockchain::{HttpTransportClient, TransportError},
	},
	utils::constants::OBSERVER_SOURCE,
};

use crate::integration::mocks::{SimulatedNode, TOKEN};

const BALANCE_PARAMS: [&str; 2] = ["0x00000000000000000000000000000000000000bb", "latest"];

fn create_service(servers: &[&ServerGuard]) -> Arc<NodeAccessService<HttpTransportClient>> {
	let mut config = AccessConfig::with_endpoints(servers.iter().map(|server| server.url()));
	config.call.retry_delay_ms = 10;
	config.http_retry.max_retries = 0;
	initialize_services(config).unwrap()
}

fn method(name: &str) -> Matcher {
	Matcher::PartialJson(json!({ "method": name }))
}

#[tokio::test]
async fn test_call_fails_over_between_http_endpoints() {
	let mut primary = Server::new_async().await;
	let mut secondary = Server::new_async().await;
	let primary_mock = primary
		.mock("POST", "/")
		.match_body(method("eth_getBalance"))
		.with_status(502)
		.with_body("bad gateway")
		.expect(1)
		.create_async()
		.await;
	let secondary_mock = secondary
		.mock("POST", "/")
		.match_body(method("eth_getBalance"))
		.with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0x2a"}"#)
		.expect(1)
		.create_async()
		.await;

	let service = create_service(&[&primary, &secondary]);
	let result = service
		.call(
			"eth_getBalance",
			json!(BALANCE_PARAMS),
			CallTags::source("wallet"),
		)
		.await
		.unwrap();
	assert_eq!(result, json!("0x2a"));

	let telemetry = service.get_telemetry_snapshot();
	assert_eq!(telemetry.stats.total_requests, 1);
	assert_eq!(telemetry.stats.success_count, 1);
	assert_eq!(telemetry.stats.total_retries, 1);
	assert_eq!(telemetry.stats.by_source["wallet"].count, 1);

	let health = service.get_health_snapshot();
	assert_eq!(health[0].consecutive_failures, 1);
	assert_eq!(health[1].consecutive_failures, 0);

	primary_mock.assert_async().await;
	secondary_mock.assert_async().await;
}

#[tokio::test]
async fn test_node_error_is_returned_without_failover() {
	let mut primary = Server::new_async().await;
	let mut secondary = Server::new_async().await;
	primary
		.mock("POST", "/")
		.with_body(r#"{"jsonrpc":"2.0","id":1,"error":{"code":3,"message":"execution reverted"}}"#)
		.expect(1)
		.create_async()
		.await;
	let secondary_mock = secondary
		.mock("POST", "/")
		.expect(0)
		.create_async()
		.await;

	let service = create_service(&[&primary, &secondary]);
	let error = service
		.call("eth_call", json!([{"to": TOKEN}, "latest"]), CallTags::default())
		.await
		.unwrap_err();

	assert!(matches!(
		error,
		AccessError::Transport(TransportError::Rpc { code: 3, .. })
	));
	// A well-formed node error proves the endpoint is alive
	assert!(service.get_health_snapshot()[0].is_healthy);
	assert_eq!(service.get_telemetry_snapshot().stats.error_count, 1);
	secondary_mock.assert_async().await;
}

#[tokio::test]
async fn test_concurrent_identical_calls_send_one_request() {
	let mut server = Server::new_async().await;
	let mock = server
		.mock("POST", "/")
		.match_body(method("eth_getBalance"))
		.with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0x2a"}"#)
		.expect(1)
		.create_async()
		.await;

	let service = create_service(&[&server]);
	let (first, second, third) = tokio::join!(
		service.call("eth_getBalance", json!(BALANCE_PARAMS), CallTags::default()),
		service.call("eth_getBalance", json!(BALANCE_PARAMS), CallTags::default()),
		service.call("eth_getBalance", json!(BALANCE_PARAMS), CallTags::default()),
	);

	assert_eq!(first.unwrap(), json!("0x2a"));
	assert_eq!(second.unwrap(), json!("0x2a"));
	assert_eq!(third.unwrap(), json!("0x2a"));
	assert_eq!(service.get_telemetry_snapshot().stats.total_requests, 1);

	let dedup = service.dedup_stats();
	assert_eq!(dedup.in_flight, 0);
	let key_stats = dedup.keys.values().next().unwrap();
	assert_eq!(key_stats.requests, 3);
	assert_eq!(key_stats.joins, 2);
	mock.assert_async().await;
}

#[tokio::test]
async fn test_probe_routes_calls_away_from_failing_endpoint() {
	let mut primary = Server::new_async().await;
	let mut secondary = Server::new_async().await;
	primary
		.mock("POST", "/")
		.with_status(500)
		.create_async()
		.await;
	secondary
		.mock("POST", "/")
		.with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0x64"}"#)
		.create_async()
		.await;

	let service = create_service(&[&primary, &secondary]);
	let health = service.probe_health().await;
	assert!(!health[0].is_healthy);
	assert!(health[1].is_healthy);
	assert!(health[1].last_latency_ms.is_some());

	let result = service
		.call("eth_blockNumber", json!([]), CallTags::default())
		.await
		.unwrap();
	assert_eq!(result, json!("0x64"));

	let history = service.telemetry().history();
	assert_eq!(history[0].endpoint, secondary.url());
	assert_eq!(history[0].retry_count, 0);
}

#[tokio::test]
async fn test_repeated_calls_produce_cache_recommendation() {
	let mut server = Server::new_async().await;
	server
		.mock("POST", "/")
		.with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0x2a"}"#)
		.expect(4)
		.create_async()
		.await;

	let service = create_service(&[&server]);
	for _ in 0..4 {
		service
			.call(
				"eth_getBalance",
				json!(BALANCE_PARAMS),
				CallTags::source("dashboard"),
			)
			.await
			.unwrap();
	}

	let produced = service.recommender().analyze();
	let cache: Vec<_> = produced
		.iter()
		.filter(|r| r.kind == RecommendationKind::Cache)
		.collect();
	assert_eq!(cache.len(), 1);
	assert!(cache[0].call_group.starts_with("eth_getBalance:"));
	assert_eq!(cache[0].estimated_impact_pct, 8);
	assert_eq!(service.get_recommendations(), produced);
}

#[tokio::test(start_paused = true)]
async fn test_subscription_delivers_events_in_polling_mode() {
	let node = Arc::new(SimulatedNode::new(false, 100));
	let service = NodeAccessService::new(
		AccessConfig::with_endpoints(["http://node.example"]),
		Arc::clone(&node),
	)
	.unwrap();

	let batches: Arc<Mutex<Vec<EventBatch>>> = Arc::new(Mutex::new(Vec::new()));
	let sink = Arc::clone(&batches);
	let handle = service
		.subscribe(
			TOKEN,
			"event Transfer(address indexed from, address indexed to, uint256 value)",
			move |batch| sink.lock().unwrap().push(batch),
		)
		.await
		.unwrap();

	assert_eq!(service.observer_status().mode, ObserverMode::Polling);
	tokio::time::sleep(Duration::from_secs(1)).await;

	node.add_logs(&[99, 102, 104]);
	node.set_head(104);
	tokio::time::sleep(Duration::from_secs(15)).await;

	{
		let batches = batches.lock().unwrap();
		let blocks: Vec<u64> = batches
			.iter()
			.flat_map(|batch| batch.logs.iter().filter_map(|log| log.block_number))
			.collect();
		assert_eq!(blocks, vec![102, 104]);
		assert_eq!(batches[0].subscription_id, handle.id());
		assert!(matches!(
			batches[0].logs[0].event,
			DecodedEvent::Transfer { .. }
		));
	}

	let status = service.observer_status();
	assert_eq!(status.subscriptions, 1);
	assert_eq!(status.groups[0].last_polled_block, Some(104));

	// Observer traffic is tracked but never offered for caching
	assert!(service.telemetry().stats_for_source(OBSERVER_SOURCE).total_requests > 0);
	assert!(service
		.recommender()
		.analyze()
		.iter()
		.all(|r| r.kind != RecommendationKind::Cache));

	assert!(handle.unsubscribe().await);
	let status = service.observer_status();
	assert_eq!(status.subscriptions, 0);
	assert!(status.groups.is_empty());
	assert!(!status.is_active);

	service.shutdown().await;
}
