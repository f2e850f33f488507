//! Logging utilities for the application
//!
//! Logging is built on `tracing_subscriber`. The filter comes from `RUST_LOG`,
//! then `LOG_LEVEL`, and defaults to `info`.
//!
//! With `LOG_MODE=file` events are written to a daily rolling file under
//! `LOG_DATA_DIR` (default `logs/`) through a non-blocking writer. The returned
//! guard must be kept alive for buffered lines to be flushed.
use std::env;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use crate::utils::constants::{DEFAULT_LOG_DIR, LOG_FILE_PREFIX};

type LoggingError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Setup logging for the application
///
/// Logs go to stdout unless `LOG_MODE=file` is set.
///
/// # Returns
/// * `Ok(Some(guard))` - File logging is active; drop the guard on shutdown
/// * `Ok(None)` - Logging to stdout
pub fn setup_logging() -> Result<Option<WorkerGuard>, LoggingError> {
	let file_mode = env::var("LOG_MODE")
		.map(|mode| mode.eq_ignore_ascii_case("file"))
		.unwrap_or(false);

	if file_mode {
		let directory = env::var("LOG_DATA_DIR").unwrap_or_else(|_| DEFAULT_LOG_DIR.to_string());
		let appender = tracing_appender::rolling::daily(directory, LOG_FILE_PREFIX);
		let (writer, guard) = tracing_appender::non_blocking(appender);
		init_subscriber(writer, false)?;
		Ok(Some(guard))
	} else {
		setup_logging_with_writer(std::io::stdout)?;
		Ok(None)
	}
}

/// Setup logging for the application with a custom writer
pub fn setup_logging_with_writer<W>(writer: W) -> Result<(), LoggingError>
where
	W: for<'writer> tracing_subscriber::fmt::MakeWriter<'writer> + Send + Sync + 'static,
{
	init_subscriber(writer, true)
}

fn build_filter() -> EnvFilter {
	EnvFilter::try_from_default_env().unwrap_or_else(|_| {
		let level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
		EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
	})
}

fn init_subscriber<W>(writer: W, ansi: bool) -> Result<(), LoggingError>
where
	W: for<'writer> tracing_subscriber::fmt::MakeWriter<'writer> + Send + Sync + 'static,
{
	tracing_subscriber::registry()
		.with(build_filter())
		.with(
			fmt::layer()
				.with_writer(writer)
				.event_format(
					fmt::format()
						.with_level(true)
						.with_target(true)
						.with_thread_ids(false)
						.with_thread_names(false)
						.with_ansi(ansi)
						.compact(),
				)
				.fmt_fields(fmt::format::PrettyFields::new()),
		)
		.try_init()?;
	Ok(())
}
