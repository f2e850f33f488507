//! Node access service entry point.
//!
//! This binary runs the resilient node access layer as a long-lived process. It
//! loads the endpoint configuration, starts health probing, telemetry and the
//! optimization recommender, and handles graceful shutdown on interrupt signals.
//!
//! # Modes
//! - `--call METHOD [--params JSON]`: performs one call and prints its result
//! - `--watch ADDRESS --event SIGNATURE`: logs decoded contract events until Ctrl+C
//! - no mode flag: keeps the service and its background tasks running until Ctrl+C
//!
//! # Flow
//! 1. Loads configuration (file, environment, command line)
//! 2. Initializes the access service
//! 3. Runs the requested mode, optionally with the metrics server
//! 4. Stops the observer and every background task on shutdown

use clap::{Arg, ArgAction, ArgMatches, Command};
use dotenvy::dotenv;
use rpc_sentinel::{
	bootstrap::{initialize_services, load_config, ConfigOverrides, Result},
	models::{CallTags, DecodedEvent, EventBatch},
	services::{access::NodeAccessService, blockchain::NodeTransport},
	utils::{
		constants::DEFAULT_METRICS_ADDRESS, logging::setup_logging,
		metrics::server::create_metrics_server,
	},
};
use serde_json::Value;
use std::{
	env::{set_var, var},
	path::PathBuf,
	sync::Arc,
};
use tracing::{error, info, instrument};

/// Telemetry source tag for calls issued from the command line
const CLI_SOURCE: &str = "cli";

/// Performs a single call and returns its result
///
/// # Arguments
/// * `service` - Access service to call through
/// * `method` - JSON-RPC method
/// * `params` - Params as a JSON document; defaults to `[]`
///
/// # Errors
/// * Returns an error if `params` is not valid JSON or the call fails
#[instrument(skip(service))]
async fn execute_call<T: NodeTransport + 'static>(
	service: &NodeAccessService<T>,
	method: &str,
	params: Option<&str>,
) -> Result<Value> {
	let params: Value = match params {
		Some(raw) => serde_json::from_str(raw)
			.map_err(|e| anyhow::anyhow!("Invalid --params JSON: {}", e))?,
		None => Value::Array(Vec::new()),
	};

	// Rank endpoints before the first call instead of relying on priority alone
	service.probe_health().await;

	let result = service
		.call(method, params, CallTags::source(CLI_SOURCE))
		.await
		.map_err(|e| anyhow::anyhow!("Call {} failed: {}", method, e))?;
	Ok(result)
}

fn log_event_batch(batch: EventBatch) {
	for log in &batch.logs {
		match &log.event {
			DecodedEvent::Transfer { from, to, value } => info!(
				subscription = %batch.subscription_id,
				block = log.block_number,
				from = %from,
				to = %to,
				value = %value,
				"Transfer"
			),
			DecodedEvent::Approval {
				owner,
				spender,
				value,
			} => info!(
				subscription = %batch.subscription_id,
				block = log.block_number,
				owner = %owner,
				spender = %spender,
				value = %value,
				"Approval"
			),
			DecodedEvent::Raw(raw) => info!(
				subscription = %batch.subscription_id,
				block = log.block_number,
				event = %batch.event,
				topics = raw.topics.len(),
				"Event"
			),
		}
	}
}

fn build_cli() -> Command {
	Command::new("rpc-sentinel")
		.version(env!("CARGO_PKG_VERSION"))
		.about(
			"A resilient access layer for EVM JSON-RPC endpoints with health-aware failover, \
			 request deduplication, call telemetry and adaptive event observation.",
		)
		.arg(
			Arg::new("config")
				.long("config")
				.help("Path to the JSON configuration file")
				.value_name("PATH"),
		)
		.arg(
			Arg::new("endpoint")
				.long("endpoint")
				.help("Endpoint URL; repeat to configure several, in priority order")
				.value_name("URL")
				.action(ArgAction::Append),
		)
		.arg(
			Arg::new("timeout-ms")
				.long("timeout-ms")
				.help("Per-attempt call timeout in milliseconds")
				.value_name("MS")
				.value_parser(clap::value_parser!(u64)),
		)
		.arg(
			Arg::new("log-file")
				.long("log-file")
				.help("Write logs to file instead of stdout")
				.action(ArgAction::SetTrue),
		)
		.arg(
			Arg::new("log-level")
				.long("log-level")
				.help("Set log level (trace, debug, info, warn, error)")
				.value_name("LEVEL"),
		)
		.arg(
			Arg::new("log-path")
				.long("log-path")
				.help("Path to store log files (default: logs/)")
				.value_name("PATH"),
		)
		.arg(
			Arg::new("metrics-address")
				.long("metrics-address")
				.help("Address to start the metrics server on (default: 127.0.0.1:8081)")
				.value_name("HOST:PORT"),
		)
		.arg(
			Arg::new("metrics")
				.long("metrics")
				.help("Enable metrics server")
				.action(ArgAction::SetTrue),
		)
		.arg(
			Arg::new("call")
				.long("call")
				.help("Perform one JSON-RPC call, print the result and exit")
				.value_name("METHOD")
				.conflicts_with("watch"),
		)
		.arg(
			Arg::new("params")
				.long("params")
				.help("JSON params for --call (default: [])")
				.value_name("JSON")
				.requires("call"),
		)
		.arg(
			Arg::new("watch")
				.long("watch")
				.help("Contract address whose events are logged")
				.value_name("ADDRESS")
				.requires("event"),
		)
		.arg(
			Arg::new("event")
				.long("event")
				.help("Event signature to watch, e.g. \"Transfer(address,address,uint256)\"")
				.value_name("SIGNATURE")
				.requires("watch"),
		)
}

fn config_overrides(matches: &ArgMatches) -> ConfigOverrides {
	ConfigOverrides {
		config_path: matches.get_one::<String>("config").map(PathBuf::from),
		endpoints: matches
			.get_many::<String>("endpoint")
			.map(|urls| urls.cloned().collect())
			.unwrap_or_default(),
		call_timeout_ms: matches.get_one::<u64>("timeout-ms").copied(),
	}
}

/// Main entry point for the node access service.
///
/// # Errors
/// Returns an error if configuration or service initialization fails, or if a
/// one-shot call fails.
#[tokio::main]
async fn main() -> Result<()> {
	let matches = build_cli().get_matches();

	// Load environment variables from .env file
	dotenv().ok();

	// Only apply CLI options if the corresponding environment variables are NOT already set
	if matches.get_flag("log-file") && var("LOG_MODE").is_err() {
		set_var("LOG_MODE", "file");
	}

	if let Some(level) = matches.get_one::<String>("log-level") {
		if var("LOG_LEVEL").is_err() {
			set_var("LOG_LEVEL", level);
		}
	}

	if let Some(path) = matches.get_one::<String>("log-path") {
		if var("LOG_DATA_DIR").is_err() {
			set_var("LOG_DATA_DIR", path);
		}
	}

	// Held until exit so buffered file logs are flushed
	let _log_guard = setup_logging().unwrap_or_else(|e| {
		error!("Failed to setup logging: {}", e);
		None
	});

	let config = load_config(&config_overrides(&matches))
		.map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
	let service = initialize_services(config)
		.map_err(|e| anyhow::anyhow!("Failed to initialize services: {}", e))?;

	if let Some(method) = matches.get_one::<String>("call") {
		let params = matches.get_one::<String>("params").map(String::as_str);
		let outcome = execute_call(&service, method, params).await;
		service.shutdown().await;
		let result = outcome?;
		println!("{}", serde_json::to_string_pretty(&result)?);
		return Ok(());
	}

	service.start();

	let _subscription = match (
		matches.get_one::<String>("watch"),
		matches.get_one::<String>("event"),
	) {
		(Some(address), Some(event)) => Some(
			service
				.subscribe(address, event, log_event_batch)
				.await
				.map_err(|e| anyhow::anyhow!("Failed to watch {}: {}", address, e))?,
		),
		_ => None,
	};

	// Check if metrics should be enabled from either CLI flag or env var
	let metrics_enabled =
		matches.get_flag("metrics") || var("METRICS_ENABLED").map(|v| v == "true").unwrap_or(false);

	let metrics_address = if var("IN_DOCKER").unwrap_or_default() == "true" {
		// For Docker, use METRICS_PORT env var if available
		var("METRICS_PORT")
			.map(|port| format!("0.0.0.0:{}", port))
			.unwrap_or_else(|_| "0.0.0.0:8081".to_string())
	} else {
		matches
			.get_one::<String>("metrics-address")
			.map(|s| s.to_string())
			.unwrap_or_else(|| DEFAULT_METRICS_ADDRESS.to_string())
	};

	let metrics_server = if metrics_enabled {
		info!("Metrics server enabled, starting on {}", metrics_address);
		match create_metrics_server(metrics_address, Arc::clone(&service)) {
			Ok(server) => Some(server),
			Err(e) => {
				error!("Failed to create metrics server: {}", e);
				None
			}
		}
	} else {
		info!("Metrics server disabled. Use --metrics flag or METRICS_ENABLED=true to enable");
		None
	};

	info!("Service started. Press Ctrl+C to shutdown");

	let ctrl_c = tokio::signal::ctrl_c();

	if let Some(metrics_future) = metrics_server {
		tokio::select! {
			result = ctrl_c => {
				if let Err(e) = result {
					error!("Error waiting for Ctrl+C: {}", e);
				}
				info!("Shutdown signal received, stopping services...");
			}
			result = metrics_future => {
				if let Err(e) = result {
					error!("Metrics server error: {}", e);
				}
				info!("Metrics server stopped, shutting down services...");
			}
		}
	} else {
		let _ = ctrl_c.await;
		info!("Shutdown signal received, stopping services...");
	}

	service.shutdown().await;

	let report = service.telemetry_report();
	info!(
		grade = ?report.grade,
		calls = report.total_requests,
		success_rate = report.success_rate,
		average_ms = report.average_duration_ms,
		"Shutdown complete"
	);
	Ok(())
}
