#![no_main]

use alloy::primitives::B256;
use libfuzzer_sys::fuzz_target;
use rpc_sentinel::models::{DecodedEvent, EventSignature};

const SIGNATURES: [&str; 3] = [
	"Transfer(address,address,uint256)",
	"Approval(address,address,uint256)",
	"event Swap(address indexed sender, uint256 amount0In, uint256 amount1In)",
];

fuzz_target!(|data: &[u8]| {
	let Some((&selector, rest)) = data.split_first() else {
		return;
	};
	let signature = match EventSignature::parse(SIGNATURES[selector as usize % SIGNATURES.len()]) {
		Ok(signature) => signature,
		Err(_) => return,
	};

	let topic_count = rest.first().map(|b| (*b % 5) as usize).unwrap_or(0);
	let rest = rest.get(1..).unwrap_or_default();
	let topics: Vec<_> = rest
		.chunks_exact(32)
		.take(topic_count)
		.map(B256::from_slice)
		.collect();
	let data = rest.get(topics.len() * 32..).unwrap_or_default();

	// Decoding arbitrary input must never panic
	let _ = DecodedEvent::decode(&signature, &topics, data);
});

