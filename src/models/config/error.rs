//! Configuration error types.
//!
//! Errors raised while loading, overriding and validating the access configuration.

use log::error;
use std::{error::Error, fmt};

/// Errors that can occur during configuration operations
#[derive(Debug)]
#[allow(clippy::enum_variant_names)]
pub enum ConfigError {
	/// Configuration validation failed
	ValidationError(String),

	/// Failed to parse configuration file
	ParseError(String),

	/// File system error during configuration loading
	FileError(String),

	/// An environment override could not be applied
	EnvironmentError(String),
}

impl ConfigError {
	fn message(&self) -> String {
		match self {
			Self::ValidationError(msg) => format!("Validation error: {}", msg),
			Self::ParseError(msg) => format!("Parse error: {}", msg),
			Self::FileError(msg) => format!("File error: {}", msg),
			Self::EnvironmentError(msg) => format!("Environment error: {}", msg),
		}
	}

	fn logged(self) -> Self {
		error!("{}", self.message());
		self
	}

	/// Rejected configuration value; logged on creation
	pub fn validation_error(msg: impl Into<String>) -> Self {
		Self::ValidationError(msg.into()).logged()
	}

	/// Malformed configuration file; logged on creation
	pub fn parse_error(msg: impl Into<String>) -> Self {
		Self::ParseError(msg.into()).logged()
	}

	/// Unreadable or unsupported configuration file; logged on creation
	pub fn file_error(msg: impl Into<String>) -> Self {
		Self::FileError(msg.into()).logged()
	}

	/// Environment override that could not be applied; logged on creation
	pub fn environment_error(msg: impl Into<String>) -> Self {
		Self::EnvironmentError(msg.into()).logged()
	}
}

impl fmt::Display for ConfigError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.message())
	}
}

impl Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
	fn from(err: std::io::Error) -> Self {
		Self::file_error(err.to_string())
	}
}

impl From<serde_json::Error> for ConfigError {
	fn from(err: serde_json::Error) -> Self {
		Self::parse_error(err.to_string())
	}
}
