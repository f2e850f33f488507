//! Node client interfaces and implementations.
//!
//! Provides abstractions for talking to EVM JSON-RPC nodes. Includes:
//!
//! - The `NodeTransport` trait and its HTTP implementation
//! - Transport error classification
//! - A typed EVM client for block, log and filter calls

mod client;
mod transports;

pub use client::{parse_quantity, EvmClient, EvmClientTrait};
pub use transports::{
	extract_result, HttpTransportClient, NodeTransport, TransientErrorRetryStrategy,
	TransportError,
};
