//! Core domain models for node access.
//!
//! - `endpoint`: read-only endpoint health view
//! - `call`: instrumented call records and error taxonomy
//! - `insight`: telemetry insights
//! - `recommendation`: advisory tuning suggestions
//! - `subscription`: event subscription identifiers and observer status

mod call;
mod endpoint;
mod insight;
mod recommendation;
mod subscription;

pub use call::{CallId, CallRecord, CallStatus, CallTags, ErrorKind};
pub use endpoint::EndpointSnapshot;
pub use insight::{Insight, InsightKind, Severity};
pub use recommendation::{Priority, Recommendation, RecommendationKind};
pub use subscription::{GroupStatus, ObserverMode, ObserverStatus, SubscriptionId};
