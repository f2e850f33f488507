//! Configuration loading and validation.
//!
//! The access layer reads a single JSON document (see [`AccessConfig`]) and
//! applies environment overrides on top of it.

use std::path::Path;

mod access_config;
mod error;

pub use access_config::{
	AccessConfig, CallConfig, DedupConfig, EndpointConfig, HealthConfig, HttpRetrySettings,
	ObserverConfig, RecommenderConfig, TelemetryConfig,
};
pub use error::ConfigError;

/// Common interface for loading configuration files
pub trait ConfigLoader: Sized {
	fn load_from_path(path: &Path) -> Result<Self, ConfigError>;

	fn validate(&self) -> Result<(), String>;

	fn is_json_file(path: &Path) -> bool {
		path.extension()
			.map(|ext| ext.to_string_lossy().to_lowercase() == "json")
			.unwrap_or(false)
	}
}
