//! Endpoint health tracking.
//!
//! The registry is the single owner of endpoint precedence: it knows every
//! configured endpoint, how it performed in probes and live traffic, and which
//! one callers should use next.

mod registry;

pub use registry::EndpointHealthRegistry;
