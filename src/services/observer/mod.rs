//! Adaptive event observation.
//!
//! Delivers contract events to subscribers using server-side filters when the
//! node supports them and block-range log polling otherwise. The mode is probed
//! once and may only downgrade from filters to polling.

mod error;
mod service;

pub use error::ObserverError;
pub use service::{EventCallback, EventObserver};
