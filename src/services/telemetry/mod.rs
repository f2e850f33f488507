//! Call telemetry.
//!
//! Records the lifecycle of every outbound call, keeps rolling aggregates and a
//! bounded history, and derives advisory insights from them.

mod engine;
mod stats;

pub use engine::{TelemetryEngine, TelemetryExport};
pub use stats::{
	CallStats, DistributionBucket, Grade, MethodSummary, PerformanceReport, Tally,
};
