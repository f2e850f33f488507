//! Mock implementations shared by the integration tests.

use async_trait::async_trait;
use mockall::mock;
use serde_json::{json, Value};
use std::{
	collections::VecDeque,
	sync::{
		atomic::{AtomicU64, Ordering},
		Mutex,
	},
};

use rpc_sentinel::services::blockchain::{parse_quantity, NodeTransport, TransportError};

pub const TOKEN: &str = "0x00000000000000000000000000000000000000aa";
pub const TRANSFER_TOPIC: &str =
	"0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

// Mock implementation of a node transport.
// Used for testing typed clients and the health registry against
// scripted JSON-RPC envelopes.
mock! {
	pub NodeTransport {}

	#[async_trait]
	impl NodeTransport for NodeTransport {
		async fn send_raw_request(
			&self,
			url: &str,
			method: &str,
			params: Option<Value>,
		) -> Result<Value, TransportError>;
	}
}

pub fn rpc_result(result: Value) -> Value {
	json!({"jsonrpc": "2.0", "id": 1, "result": result})
}

pub fn rpc_error(code: i64, message: &str) -> Value {
	json!({"jsonrpc": "2.0", "id": 1, "error": {"code": code, "message": message}})
}

/// ERC-20 Transfer of `block` tokens from 0x..01 to 0x..02
pub fn transfer_log(block: u64) -> Value {
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
		"transactionHash": format!("0x{:064x}", block + 1_000),
		"transactionIndex": "0x0",
		"logIndex": "0x0",
		"removed": false
	})
}

/// In-memory EVM node with a movable head and Transfer logs at chosen blocks
pub struct SimulatedNode {
	filters: bool,
	head: AtomicU64,
	log_blocks: Mutex<Vec<u64>>,
	filter_changes: Mutex<VecDeque<Value>>,
	calls: Mutex<Vec<(String, Value)>>,
}

impl SimulatedNode {
	pub fn new(filters: bool, head: u64) -> Self {
		Self {
			filters,
			head: AtomicU64::new(head),
			log_blocks: Mutex::new(Vec::new()),
			filter_changes: Mutex::new(VecDeque::new()),
			calls: Mutex::new(Vec::new()),
		}
	}

	pub fn set_head(&self, head: u64) {
		self.head.store(head, Ordering::SeqCst);
	}

	pub fn add_logs(&self, blocks: &[u64]) {
		self.log_blocks.lock().unwrap().extend_from_slice(blocks);
	}

	/// Queues the result of the next `eth_getFilterChanges`
	pub fn push_filter_changes(&self, logs: Value) {
		self.filter_changes.lock().unwrap().push_back(logs);
	}

	pub fn count(&self, method: &str) -> usize {
		self.calls
			.lock()
			.unwrap()
			.iter()
			.filter(|(called, _)| called == method)
			.count()
	}
}

#[async_trait]
impl NodeTransport for SimulatedNode {
	async fn send_raw_request(
		&self,
		_url: &str,
		method: &str,
		params: Option<Value>,
	) -> Result<Value, TransportError> {
		let params = params.unwrap_or_else(|| json!([]));
		self.calls
			.lock()
			.unwrap()
			.push((method.to_string(), params.clone()));

		let result = match method {
			"eth_blockNumber" => json!(format!("{:#x}", self.head.load(Ordering::SeqCst))),
			"eth_newFilter" if self.filters => json!("0xf1"),
			"eth_newFilter" => return Ok(rpc_error(-32601, "method not found")),
			"eth_uninstallFilter" => json!(true),
			"eth_getFilterChanges" => self
				.filter_changes
				.lock()
				.unwrap()
				.pop_front()
				.unwrap_or_else(|| json!([])),
			"eth_getLogs" => {
				let from = parse_quantity(&params[0]["fromBlock"])?;
				let to = parse_quantity(&params[0]["toBlock"])?;
				let logs: Vec<Value> = self
					.log_blocks
					.lock()
					.unwrap()
					.iter()
					.filter(|block| (from..=to).contains(*block))
					.map(|block| transfer_log(*block))
					.collect();
				json!(logs)
			}
			other => return Ok(rpc_error(-32601, &format!("{} not found", other))),
		};
		Ok(rpc_result(result))
	}
}
