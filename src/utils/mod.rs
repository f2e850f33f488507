//! Utility modules for common functionality.
//!
//! This module provides various utility functions and types that are used across
//! the application. Currently includes:
//!
//! - constants: Constants for the application
//! - http: Retryable HTTP client construction
//! - logging: Logging utilities
//! - metrics: Metrics utilities
//! - supervisor: Named background task supervision
//! - sync: Poison-tolerant lock helpers

pub mod constants;
pub mod http;
pub mod logging;
pub mod metrics;
pub mod supervisor;
pub mod sync;

pub use constants::*;
