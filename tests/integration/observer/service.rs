use serde_json::json;
use std::{
	sync::{Arc, Mutex},
	time::Duration,
};

use rpc_sentinel::{
	models::{
		EndpointConfig, EventBatch, HealthConfig, ObserverConfig, ObserverMode, TelemetryConfig,
	},
	services::{
		blockchain::EvmClient,
		health::EndpointHealthRegistry,
		observer::{EventCallback, EventObserver, ObserverError},
		telemetry::TelemetryEngine,
	},
	utils::{constants::OBSERVER_SOURCE, supervisor::TaskSupervisor},
};

use crate::integration::mocks::{transfer_log, SimulatedNode, TOKEN};

const NODE: &str = "http://node.example";
const TRANSFER: &str = "Transfer(address,address,uint256)";
const APPROVAL: &str = "Approval(address,address,uint256)";

struct Setup {
	observer: EventObserver<SimulatedNode>,
	supervisor: Arc<TaskSupervisor>,
	telemetry: Arc<TelemetryEngine>,
}

fn setup(node: &Arc<SimulatedNode>) -> Setup {
	let registry = Arc::new(
		EndpointHealthRegistry::new(&[EndpointConfig::new(NODE, 0)], HealthConfig::default())
			.unwrap(),
	);
	let telemetry = Arc::new(TelemetryEngine::new(TelemetryConfig::default()));
	let supervisor = Arc::new(TaskSupervisor::new());
	let observer = EventObserver::new(
		EvmClient::new(Arc::clone(node), Duration::from_secs(10)),
		registry,
		Arc::clone(&telemetry),
		Arc::clone(&supervisor),
		ObserverConfig::default(),
	)
	.unwrap();

	Setup {
		observer,
		supervisor,
		telemetry,
	}
}

fn collector() -> (Arc<Mutex<Vec<EventBatch>>>, EventCallback) {
	let batches = Arc::new(Mutex::new(Vec::new()));
	let sink = Arc::clone(&batches);
	let callback: EventCallback = Arc::new(move |batch| sink.lock().unwrap().push(batch));
	(batches, callback)
}

#[tokio::test(start_paused = true)]
async fn test_filter_mode_fans_out_to_every_subscriber() {
	let node = Arc::new(SimulatedNode::new(true, 100));
	node.push_filter_changes(json!([transfer_log(101)]));
	let setup = setup(&node);

	let (first, first_callback) = collector();
	let (second, second_callback) = collector();
	let first_id = setup
		.observer
		.subscribe(TOKEN, TRANSFER, first_callback)
		.await
		.unwrap();
	let second_id = setup
		.observer
		.subscribe(TOKEN, TRANSFER, second_callback)
		.await
		.unwrap();
	assert_eq!(setup.observer.mode(), ObserverMode::Filter);

	tokio::time::sleep(Duration::from_secs(1)).await;

	let first = first.lock().unwrap();
	let second = second.lock().unwrap();
	assert_eq!(first.len(), 1);
	assert_eq!(second.len(), 1);
	assert_eq!(first[0].subscription_id, first_id);
	assert_eq!(second[0].subscription_id, second_id);
	assert_eq!(first[0].logs, second[0].logs);
	drop((first, second));

	let status = setup.observer.status();
	assert_eq!(status.subscriptions, 2);
	assert_eq!(status.groups.len(), 1);
	assert_eq!(status.groups[0].subscribers, 2);
	assert!(status.groups[0].has_filter);
	assert_eq!(status.groups[0].last_polled_block, Some(101));

	setup.observer.shutdown().await;
	// The capability probe filter and the group filter are both released
	assert_eq!(node.count("eth_uninstallFilter"), 2);
	assert!(!setup
		.supervisor
		.task_names()
		.iter()
		.any(|name| name.starts_with("observer:group:")));
	assert!(!setup.observer.status().is_active);
}

#[tokio::test(start_paused = true)]
async fn test_each_event_gets_its_own_group() {
	let node = Arc::new(SimulatedNode::new(false, 50));
	let setup = setup(&node);

	let (_, transfer_callback) = collector();
	let (_, approval_callback) = collector();
	let transfer_id = setup
		.observer
		.subscribe(TOKEN, TRANSFER, transfer_callback)
		.await
		.unwrap();
	setup
		.observer
		.subscribe(TOKEN, APPROVAL, approval_callback)
		.await
		.unwrap();
	tokio::time::sleep(Duration::from_secs(1)).await;

	let groups: Vec<String> = setup
		.observer
		.status()
		.groups
		.into_iter()
		.map(|group| group.event)
		.collect();
	assert_eq!(groups.len(), 2);
	assert!(groups.contains(&TRANSFER.to_string()));
	assert!(groups.contains(&APPROVAL.to_string()));
	let group_tasks = setup
		.supervisor
		.task_names()
		.into_iter()
		.filter(|name| name.starts_with("observer:group:"))
		.count();
	assert_eq!(group_tasks, 2);

	assert!(setup.observer.unsubscribe(transfer_id).await);
	assert!(!setup.observer.unsubscribe(transfer_id).await);
	let status = setup.observer.status();
	assert_eq!(status.groups.len(), 1);
	assert_eq!(status.groups[0].event, APPROVAL);
	assert!(status.is_active);

	let observer_stats = setup.telemetry.stats_for_source(OBSERVER_SOURCE);
	assert!(observer_stats.by_method.contains_key("eth_blockNumber"));

	setup.observer.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_subscribe_after_shutdown_is_rejected() {
	let node = Arc::new(SimulatedNode::new(false, 1));
	let setup = setup(&node);
	setup.observer.shutdown().await;

	let (_, callback) = collector();
	let result = setup.observer.subscribe(TOKEN, TRANSFER, callback).await;
	assert!(matches!(result, Err(ObserverError::Stopped)));
	assert_eq!(node.count("eth_newFilter"), 0);
}
