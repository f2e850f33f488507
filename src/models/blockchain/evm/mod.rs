//! Ethereum Virtual Machine (EVM) specific models.
//!
//! This module contains event signatures, log queries and the decoded event
//! representation delivered to subscribers.

mod event;
mod query;

pub use event::{
	DecodedEvent, EventBatch, EventLog, EventParam, EventParseError, EventSignature, RawEvent,
};
pub use query::LogQuery;
