#![no_main]

use libfuzzer_sys::fuzz_target;
use rpc_sentinel::models::EventSignature;

fuzz_target!(|data: &[u8]| {
	let Ok(input) = std::str::from_utf8(data) else {
		return;
	};

	if let Ok(signature) = EventSignature::parse(input) {
		// The canonical form must parse back to the same signature
		let reparsed = EventSignature::parse(signature.canonical())
			.expect("canonical signature should parse");
		assert_eq!(reparsed.canonical(), signature.canonical());
		assert_eq!(reparsed.topic0(), signature.topic0());
	}
});
