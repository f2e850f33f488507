//! Request deduplication.
//!
//! Collapses concurrent identical calls into a single in-flight operation whose
//! outcome is shared by every caller.

mod deduplicator;

pub use deduplicator::{call_key, DedupStats, KeyStats, RequestDeduplicator};
