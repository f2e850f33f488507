use async_trait::async_trait;
use proptest::{prelude::*, test_runner::Config};
use serde_json::{json, Value};
use std::{
	sync::{
		atomic::{AtomicU64, Ordering},
		Arc, Mutex,
	},
	time::Duration,
};

use rpc_sentinel::{
	models::{EndpointConfig, HealthConfig, ObserverConfig, TelemetryConfig},
	services::{
		blockchain::{parse_quantity, EvmClient, NodeTransport, TransportError},
		health::EndpointHealthRegistry,
		observer::{EventCallback, EventObserver},
		telemetry::TelemetryEngine,
	},
	utils::supervisor::TaskSupervisor,
};

use crate::properties::strategies::head_steps_strategy;

const NODE: &str = "http://node.example";
const TOKEN: &str = "0x00000000000000000000000000000000000000aa";
const TRANSFER: &str = "Transfer(address,address,uint256)";
const TRANSFER_TOPIC: &str = "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";
const START_HEAD: u64 = 1_000;
const BLOCKS_PER_TICK: u64 = 20;

/// Polling-only node that emits one Transfer log in every block
struct ChainNode {
	head: AtomicU64,
}

fn transfer_log(block: u64) -> Value {
	json!({
		"address": TOKEN,
		"topics": [
			TRANSFER_TOPIC,
			"0x0000000000000000000000000000000000000000000000000000000000000001",
			"0x0000000000000000000000000000000000000000000000000000000000000002"
		],
		"data": format!("0x{:064x}", block),
		"blockNumber": format!("{:#x}", block),
		"blockHash": format!("0x{:064x}", block),
		"transactionHash": format!("0x{:064x}", block + 1_000_000),
		"transactionIndex": "0x0",
		"logIndex": "0x0",
		"removed": false
	})
}

#[async_trait]
impl NodeTransport for ChainNode {
	async fn send_raw_request(
		&self,
		_url: &str,
		method: &str,
		params: Option<Value>,
	) -> Result<Value, TransportError> {
		let params = params.unwrap_or_else(|| json!([]));
		let result = match method {
			"eth_blockNumber" => json!(format!("{:#x}", self.head.load(Ordering::SeqCst))),
			"eth_getLogs" => {
				let from = parse_quantity(&params[0]["fromBlock"])?;
				let to = parse_quantity(&params[0]["toBlock"])?;
				json!((from..=to).map(transfer_log).collect::<Vec<_>>())
			}
			"eth_uninstallFilter" => json!(true),
			_ => {
				return Ok(json!({
					"jsonrpc": "2.0",
					"id": 1,
					"error": {"code": -32601, "message": "method not found"}
				}))
			}
		};
		Ok(json!({"jsonrpc": "2.0", "id": 1, "result": result}))
	}
}

struct Trace {
	/// Cursor observed after every step
	cursors: Vec<Option<u64>>,
	/// Head the node reported during every step
	heads: Vec<u64>,
	delivered: Vec<u64>,
}

fn run(steps: &[i64]) -> Trace {
	let runtime = tokio::runtime::Builder::new_current_thread()
		.enable_time()
		.start_paused(true)
		.build()
		.unwrap();

	runtime.block_on(async {
		let node = Arc::new(ChainNode {
			head: AtomicU64::new(START_HEAD),
		});
		let registry = Arc::new(
			EndpointHealthRegistry::new(&[EndpointConfig::new(NODE, 0)], HealthConfig::default())
				.unwrap(),
		);
		let observer = EventObserver::new(
			EvmClient::new(Arc::clone(&node), Duration::from_secs(10)),
			registry,
			Arc::new(TelemetryEngine::new(TelemetryConfig::default())),
			Arc::new(TaskSupervisor::new()),
			ObserverConfig {
				batch_pause_ms: 0,
				max_blocks_per_tick: BLOCKS_PER_TICK,
				..ObserverConfig::default()
			},
		)
		.unwrap();

		let delivered = Arc::new(Mutex::new(Vec::new()));
		let sink = Arc::clone(&delivered);
		let callback: EventCallback = Arc::new(move |batch| {
			let mut sink = sink.lock().unwrap();
			sink.extend(batch.logs.iter().filter_map(|log| log.block_number));
		});
		observer.subscribe(TOKEN, TRANSFER, callback).await.unwrap();

		// Observe halfway between polling ticks
		tokio::time::sleep(Duration::from_millis(7_500)).await;
		let mut cursors = vec![observer.status().groups[0].last_polled_block];
		let mut heads = vec![START_HEAD];
		let mut head = START_HEAD as i64;
		for step in steps {
			head = (head + step).max(0);
			node.head.store(head as u64, Ordering::SeqCst);
			tokio::time::sleep(Duration::from_secs(15)).await;
			cursors.push(observer.status().groups[0].last_polled_block);
			heads.push(head as u64);
		}

		observer.shutdown().await;
		let delivered = delivered.lock().unwrap().clone();
		Trace {
			cursors,
			heads,
			delivered,
		}
	})
}

proptest! {
	#![proptest_config(Config {
		cases: 32,
		failure_persistence: None,
		..Config::default()
	})]

	#[test]
	fn test_block_cursor_only_moves_forward(steps in head_steps_strategy()) {
		let trace = run(&steps);

		prop_assert_eq!(trace.cursors[0], Some(START_HEAD));
		let mut expected = START_HEAD;
		for (cursor, head) in trace.cursors.iter().zip(&trace.heads).skip(1) {
			if *head > expected {
				expected = (*head).min(expected + BLOCKS_PER_TICK);
			}
			prop_assert_eq!(*cursor, Some(expected));
		}
		for pair in trace.cursors.windows(2) {
			prop_assert!(pair[0] <= pair[1]);
		}

		// Every block after the anchor is delivered exactly once, in order
		let last = trace.cursors.last().copied().flatten().unwrap();
		let expected_blocks: Vec<u64> = (START_HEAD + 1..=last).collect();
		prop_assert_eq!(trace.delivered, expected_blocks);
	}
}
