//! Event signatures and decoded event payloads.
//!
//! Signatures are accepted in the human readable form used by contract ABIs
//! (`event Transfer(address indexed from, address indexed to, uint256 value)`)
//! or in canonical form (`Transfer(address,address,uint256)`). Logs are decoded
//! once, at the boundary, into [`DecodedEvent`].

use alloy::{
	primitives::{keccak256, Address, Bytes, B256, U256},
	rpc::types::Log,
};
use itertools::Itertools;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::models::SubscriptionId;

lazy_static! {
	static ref SIGNATURE_PATTERN: Regex =
		Regex::new(r"^\s*(?:event\s+)?([A-Za-z_$][A-Za-z0-9_$]*)\s*\((.*)\)\s*;?\s*$").unwrap();
	static ref TYPE_PATTERN: Regex =
		Regex::new(r"^(address|bool|string|bytes[0-9]{0,2}|u?int[0-9]{0,3})((?:\[[0-9]*\])*)$")
			.unwrap();
}

const TRANSFER: &str = "Transfer(address,address,uint256)";
const APPROVAL: &str = "Approval(address,address,uint256)";

/// Errors raised while parsing an event signature
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventParseError {
	#[error("Malformed event signature: {0}")]
	Malformed(String),

	#[error("Unsupported parameter type: {0}")]
	UnsupportedType(String),

	#[error("Tuple parameters are not supported: {0}")]
	Tuple(String),
}

/// A single event parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventParam {
	/// Canonical Solidity type (`uint` is expanded to `uint256`)
	pub kind: String,
	pub name: Option<String>,
	pub indexed: bool,
}

/// Parsed event signature with its canonical form and topic hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSignature {
	name: String,
	params: Vec<EventParam>,
	canonical: String,
	topic0: B256,
}

impl EventSignature {
	/// Parses a human readable or canonical event signature
	///
	/// # Arguments
	/// * `input` - Signature such as `Transfer(address indexed from, address indexed to, uint256 value)`
	///
	/// # Returns
	/// * `Result<Self, EventParseError>` - The parsed signature or the reason it was rejected
	pub fn parse(input: &str) -> Result<Self, EventParseError> {
		let captures = SIGNATURE_PATTERN
			.captures(input)
			.ok_or_else(|| EventParseError::Malformed(input.to_string()))?;

		let name = captures[1].to_string();
		let body = captures[2].trim();
		if body.contains('(') || body.contains(')') {
			return Err(EventParseError::Tuple(input.to_string()));
		}

		let params = if body.is_empty() {
			Vec::new()
		} else {
			body.split(',')
				.map(parse_param)
				.collect::<Result<Vec<_>, _>>()?
		};

		let canonical = format!(
			"{}({})",
			name,
			params.iter().map(|param| param.kind.as_str()).join(",")
		);
		let topic0 = keccak256(canonical.as_bytes());

		Ok(Self {
			name,
			params,
			canonical,
			topic0,
		})
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn params(&self) -> &[EventParam] {
		&self.params
	}

	/// Canonical signature, e.g. `Transfer(address,address,uint256)`
	pub fn canonical(&self) -> &str {
		&self.canonical
	}

	/// Keccak-256 hash of the canonical signature
	pub fn topic0(&self) -> B256 {
		self.topic0
	}
}

impl fmt::Display for EventSignature {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.canonical)
	}
}

fn parse_param(raw: &str) -> Result<EventParam, EventParseError> {
	let mut tokens = raw.split_whitespace();
	let kind = tokens
		.next()
		.ok_or_else(|| EventParseError::Malformed(format!("empty parameter in '{}'", raw)))?;
	let kind = normalize_type(kind)?;

	let mut indexed = false;
	let mut name = None;
	for token in tokens {
		match token {
			"indexed" if !indexed && name.is_none() => indexed = true,
			_ if name.is_none() && is_identifier(token) => name = Some(token.to_string()),
			_ => return Err(EventParseError::Malformed(raw.trim().to_string())),
		}
	}

	Ok(EventParam {
		kind,
		name,
		indexed,
	})
}

fn normalize_type(kind: &str) -> Result<String, EventParseError> {
	let captures = TYPE_PATTERN
		.captures(kind)
		.ok_or_else(|| EventParseError::UnsupportedType(kind.to_string()))?;
	let base = match &captures[1] {
		"uint" => "uint256",
		"int" => "int256",
		other => other,
	};
	Ok(format!("{}{}", base, &captures[2]))
}

fn is_identifier(token: &str) -> bool {
	let mut chars = token.chars();
	matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$')
		&& chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Log payload that matched no known event shape
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawEvent {
	/// Canonical signature when topic0 matched the subscribed event
	pub signature: Option<String>,
	pub topics: Vec<B256>,
	pub data: Bytes,
}

/// Decoded event payload
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DecodedEvent {
	Transfer {
		from: Address,
		to: Address,
		value: U256,
	},
	Approval {
		owner: Address,
		spender: Address,
		value: U256,
	},
	Raw(RawEvent),
}

impl DecodedEvent {
	/// Decodes log topics and data against the subscribed signature
	///
	/// ERC-20 `Transfer` and `Approval` logs are decoded into typed variants. Everything
	/// else, including ERC-721 transfers whose value is indexed, falls back to `Raw`.
	pub fn decode(signature: &EventSignature, topics: &[B256], data: &[u8]) -> Self {
		let matches_topic = topics.first() == Some(&signature.topic0());

		match (signature.canonical(), topics.len(), data.len()) {
			(TRANSFER, 3, 32) if matches_topic => Self::Transfer {
				from: Address::from_word(topics[1]),
				to: Address::from_word(topics[2]),
				value: U256::from_be_slice(data),
			},
			(APPROVAL, 3, 32) if matches_topic => Self::Approval {
				owner: Address::from_word(topics[1]),
				spender: Address::from_word(topics[2]),
				value: U256::from_be_slice(data),
			},
			_ => Self::Raw(RawEvent {
				signature: matches_topic.then(|| signature.canonical().to_string()),
				topics: topics.to_vec(),
				data: Bytes::copy_from_slice(data),
			}),
		}
	}
}

/// A node log decoded for delivery to subscribers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventLog {
	pub address: Address,
	pub block_number: Option<u64>,
	pub transaction_hash: Option<B256>,
	pub log_index: Option<u64>,
	/// Set when the log was removed by a reorg
	pub removed: bool,
	pub event: DecodedEvent,
}

impl EventLog {
	pub fn from_rpc_log(signature: &EventSignature, log: &Log) -> Self {
		Self {
			address: log.inner.address,
			block_number: log.block_number,
			transaction_hash: log.transaction_hash,
			log_index: log.log_index,
			removed: log.removed,
			event: DecodedEvent::decode(signature, log.inner.data.topics(), &log.inner.data.data),
		}
	}
}

/// Batch of logs delivered to one subscriber
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventBatch {
	pub subscription_id: SubscriptionId,
	pub address: Address,
	/// Canonical event signature
	pub event: String,
	pub logs: Vec<EventLog>,
}
