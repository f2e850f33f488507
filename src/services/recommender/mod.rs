//! Optimization recommendations.
//!
//! Periodically inspects telemetry history and suggests cache, retry, batching
//! and timeout changes. Suggestions are advisory; nothing here alters live
//! behavior.

mod service;

pub use service::OptimizationRecommender;
