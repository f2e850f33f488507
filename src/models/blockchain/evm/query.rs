use alloy::primitives::{Address, B256};
use serde_json::{json, Value};

/// Log query for a single contract event
///
/// Used for `eth_getLogs` ranges and for `eth_newFilter`. A missing bound is sent
/// as `latest`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
	pub address: Address,
	pub topic0: B256,
	pub from_block: Option<u64>,
	pub to_block: Option<u64>,
}

impl LogQuery {
	pub fn new(address: Address, topic0: B256) -> Self {
		Self {
			address,
			topic0,
			from_block: None,
			to_block: None,
		}
	}

	/// Restricts the query to an inclusive block range
	pub fn with_range(mut self, from_block: u64, to_block: u64) -> Self {
		self.from_block = Some(from_block);
		self.to_block = Some(to_block);
		self
	}

	/// JSON-RPC params array for `eth_getLogs` / `eth_newFilter`
	pub fn to_params(&self) -> Value {
		json!([{
			"address": format!("0x{}", hex::encode(self.address.as_slice())),
			"topics": [format!("0x{}", hex::encode(self.topic0.as_slice()))],
			"fromBlock": block_tag(self.from_block),
			"toBlock": block_tag(self.to_block),
		}])
	}
}

fn block_tag(block: Option<u64>) -> String {
	block
		.map(|number| format!("{:#x}", number))
		.unwrap_or_else(|| "latest".to_string())
}
