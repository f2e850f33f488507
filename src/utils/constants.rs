//! Constants shared across the application.

/// Configuration file used when neither `--config` nor `RPC_SENTINEL_CONFIG` is given
pub const DEFAULT_CONFIG_PATH: &str = "config/access.json";

/// Default directory for rolling log files
pub const DEFAULT_LOG_DIR: &str = "logs/";

/// File name prefix for rolling log files
pub const LOG_FILE_PREFIX: &str = "rpc-sentinel.log";

/// Default bind address of the metrics server
pub const DEFAULT_METRICS_ADDRESS: &str = "127.0.0.1:8081";

/// Method used for liveness probes
pub const PROBE_METHOD: &str = "eth_blockNumber";

/// Telemetry source tag for calls made by the event observer
pub const OBSERVER_SOURCE: &str = "observer";


/// How long per-key deduplication tallies are kept after their last request
pub const DEDUP_STATS_RETENTION: std::time::Duration = std::time::Duration::from_secs(3_600);
