//! Bootstrap module for loading configuration and initializing the access service.
//!
//! Configuration is layered, lowest precedence first:
//! 1. Built-in defaults
//! 2. A JSON file (`--config`, `RPC_SENTINEL_CONFIG`, or `config/access.json` when present)
//! 3. Environment overrides (`RPC_ENDPOINTS`, `RPC_CALL_TIMEOUT_MS`, ...)
//! 4. Command line flags
//!
//! The merged configuration is validated once, after every layer is applied.

use std::{error::Error, path::PathBuf, sync::Arc};
use tracing::{debug, info};

use crate::{
	models::{AccessConfig, ConfigError, ConfigLoader, EndpointConfig},
	services::{access::NodeAccessService, blockchain::HttpTransportClient},
	utils::constants::DEFAULT_CONFIG_PATH,
};

/// Type alias for handling ServiceResult
pub type Result<T> = std::result::Result<T, Box<dyn Error>>;

/// Environment variable naming the configuration file
pub const CONFIG_PATH_ENV: &str = "RPC_SENTINEL_CONFIG";

/// Settings given on the command line, applied last
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
	/// Explicit configuration file; it must exist
	pub config_path: Option<PathBuf>,
	/// Replaces the configured endpoints, prioritized in order
	pub endpoints: Vec<String>,
	pub call_timeout_ms: Option<u64>,
}

/// Loads the configuration from every source using the process environment
pub fn load_config(overrides: &ConfigOverrides) -> std::result::Result<AccessConfig, ConfigError> {
	load_config_with(overrides, |key| std::env::var(key).ok())
}

/// Loads the configuration from every source using `lookup` for the environment
///
/// # Errors
/// * `ConfigError::FileError` - An explicitly named file is missing or not JSON
/// * `ConfigError::ParseError` - The file is not valid configuration
/// * `ConfigError::EnvironmentError` - An environment override is malformed
/// * `ConfigError::ValidationError` - The merged configuration is invalid
pub fn load_config_with<F>(
	overrides: &ConfigOverrides,
	lookup: F,
) -> std::result::Result<AccessConfig, ConfigError>
where
	F: Fn(&str) -> Option<String>,
{
	let explicit = overrides
		.config_path
		.clone()
		.or_else(|| lookup(CONFIG_PATH_ENV).map(PathBuf::from));

	let mut config = match explicit {
		Some(path) => {
			if !path.exists() {
				return Err(ConfigError::file_error(format!(
					"Configuration file {} does not exist",
					path.display()
				)));
			}
			info!(path = %path.display(), "Loading configuration file");
			AccessConfig::read_from_path(&path)?
		}
		None => {
			let default_path = PathBuf::from(DEFAULT_CONFIG_PATH);
			if default_path.exists() {
				info!(path = %default_path.display(), "Loading configuration file");
				AccessConfig::read_from_path(&default_path)?
			} else {
				debug!("No configuration file found, using defaults");
				AccessConfig::default()
			}
		}
	};

	config.apply_overrides_from(&lookup)?;

	if !overrides.endpoints.is_empty() {
		config.endpoints = overrides
			.endpoints
			.iter()
			.enumerate()
			.map(|(index, url)| EndpointConfig::new(url.trim(), index as u32))
			.collect();
	}
	if let Some(timeout_ms) = overrides.call_timeout_ms {
		config.call.timeout_ms = timeout_ms;
	}

	config.validate().map_err(ConfigError::validation_error)?;
	Ok(config)
}

/// Initializes the access service over the HTTP transport
///
/// Background tasks are not started; call [`NodeAccessService::start`].
///
/// # Errors
/// Returns an error if the HTTP client or any service cannot be built
pub fn initialize_services(
	config: AccessConfig,
) -> Result<Arc<NodeAccessService<HttpTransportClient>>> {
	let transport = HttpTransportClient::new(
		&config.http_retry.to_retry_config(),
		config.call.timeout(),
	)?;

	info!(
		endpoints = config.endpoints.len(),
		primary = %config.endpoints.first().map(|e| e.url.as_str()).unwrap_or_default(),
		"Initializing node access service"
	);

	let service = NodeAccessService::new(config, Arc::new(transport))?;
	Ok(Arc::new(service))
}
