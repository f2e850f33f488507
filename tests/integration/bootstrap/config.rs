use std::{collections::HashMap, io::Write, path::PathBuf};
use tempfile::NamedTempFile;

use rpc_sentinel::{
	bootstrap::{initialize_services, load_config_with, ConfigOverrides},
	models::{AccessConfig, ConfigError, ConfigLoader},
};

const EXAMPLE_CONFIG: &str = "config/access.example.json";

fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
	let vars: HashMap<String, String> = vars
		.iter()
		.map(|(k, v)| (k.to_string(), v.to_string()))
		.collect();
	move |key| vars.get(key).cloned()
}

fn json_file(contents: &str) -> NamedTempFile {
	let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
	write!(file, "{}", contents).unwrap();
	file
}

#[test]
fn test_example_config_is_valid() {
	let config = AccessConfig::load_from_path(&PathBuf::from(EXAMPLE_CONFIG)).unwrap();

	assert_eq!(config.endpoints.len(), 3);
	assert_eq!(config.endpoints[0].label.as_deref(), Some("llamarpc"));
	assert_eq!(config.endpoints[2].label, None);
	assert_eq!(config.call.deadline_ms, 30_000);
	assert_eq!(config.observer.batch_size, 5);
	// Omitted fields keep their defaults
	assert_eq!(config.telemetry.export_recent, 100);
	assert_eq!(config.observer.probe_event, "Transfer(address,address,uint256)");
}

#[test]
fn test_environment_overrides_the_example_file() {
	let overrides = ConfigOverrides {
		config_path: Some(PathBuf::from(EXAMPLE_CONFIG)),
		..Default::default()
	};

	let config = load_config_with(
		&overrides,
		env(&[
			("RPC_ENDPOINTS", "https://one.example, https://two.example"),
			("RPC_DEDUP_WINDOW_MS", "250"),
			("RPC_PROBE_INTERVAL_MS", "1000"),
		]),
	)
	.unwrap();

	let urls: Vec<&str> = config.endpoints.iter().map(|e| e.url.as_str()).collect();
	assert_eq!(urls, vec!["https://one.example", "https://two.example"]);
	assert_eq!(config.endpoints[1].priority, 1);
	assert_eq!(config.dedup.window_ms, 250);
	assert_eq!(config.health.probe_interval_ms, 1_000);
	assert_eq!(config.call.max_attempts, 3);
}

#[test]
fn test_malformed_environment_value_is_rejected() {
	let overrides = ConfigOverrides {
		endpoints: vec!["https://a.example".to_string()],
		..Default::default()
	};
	let result = load_config_with(&overrides, env(&[("RPC_CALL_TIMEOUT_MS", "soon")]));
	assert!(matches!(result, Err(ConfigError::EnvironmentError(_))));
}

#[test]
fn test_invalid_files_are_rejected() {
	let file = json_file("{ not json");
	let overrides = ConfigOverrides {
		config_path: Some(file.path().to_path_buf()),
		..Default::default()
	};
	assert!(matches!(
		load_config_with(&overrides, env(&[])),
		Err(ConfigError::ParseError(_))
	));

	let file = json_file(
		r#"{ "endpoints": [{ "url": "https://a.example" }, { "url": "https://a.example" }] }"#,
	);
	let error = AccessConfig::load_from_path(file.path()).unwrap_err();
	assert!(error.to_string().contains("Duplicate endpoint URL"));

	let file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
	assert!(matches!(
		AccessConfig::load_from_path(file.path()),
		Err(ConfigError::FileError(_))
	));
}

#[test]
fn test_no_endpoints_anywhere_fails_validation() {
	let file = json_file(r#"{ "call": { "timeout_ms": 1000 } }"#);
	let overrides = ConfigOverrides {
		config_path: Some(file.path().to_path_buf()),
		..Default::default()
	};
	let error = load_config_with(&overrides, env(&[])).unwrap_err();
	assert!(matches!(error, ConfigError::ValidationError(_)));
	assert!(error.to_string().contains("At least one endpoint"));
}

#[test]
fn test_loaded_config_initializes_services() {
	let overrides = ConfigOverrides {
		config_path: Some(PathBuf::from(EXAMPLE_CONFIG)),
		..Default::default()
	};
	let config = load_config_with(&overrides, env(&[])).unwrap();
	let service = initialize_services(config).unwrap();

	let health = service.get_health_snapshot();
	assert_eq!(health.len(), 3);
	assert!(health.iter().all(|endpoint| endpoint.is_healthy));
	assert!(service.get_recommendations().is_empty());
}
