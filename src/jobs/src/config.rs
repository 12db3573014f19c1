use std::{num::NonZeroUsize, thread};

use serde::Deserialize;

use crate::error::Error;

/// Settings for a [`WorkerPool`](crate::dispatch::WorkerPool), usually read from the `[pool]` table
/// of a configuration file.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConfig {
	/// Defaults to the available parallelism of the machine.
	pub workers: Option<usize>,
	pub thread_name: String,
	pub stack_size: Option<usize>,
}

impl Default for PoolConfig {
	fn default() -> Self {
		Self {
			workers: None,
			thread_name: "tally-worker".to_string(),
			stack_size: None,
		}
	}
}

impl PoolConfig {
	pub fn with_workers(workers: usize) -> Self {
		Self {
			workers: Some(workers),
			..Self::default()
		}
	}

	pub fn resolved_workers(&self) -> usize {
		self.workers.unwrap_or_else(|| {
			thread::available_parallelism().map_or(1, NonZeroUsize::get)
		})
	}

	pub fn validate(&self) -> Result<(), Error> {
		if self.workers == Some(0) {
			return Err(Error::InvalidConfig("`workers` must be at least 1"));
		}

		if self.thread_name.is_empty() {
			return Err(Error::InvalidConfig("`thread_name` must not be empty"));
		}

		if self.stack_size == Some(0) {
			return Err(Error::InvalidConfig("`stack_size` must be at least 1 byte"));
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_table_uses_defaults() {
		let config = toml::from_str::<PoolConfig>("").unwrap();
		assert_eq!(config, PoolConfig::default());
		assert!(config.resolved_workers() >= 1);
		config.validate().unwrap();
	}

	#[test]
	fn parses_every_field() {
		let config = toml::from_str::<PoolConfig>(
			r#"
			workers = 6
			thread_name = "physics"
			stack_size = 1048576
			"#,
		)
		.unwrap();

		assert_eq!(
			config,
			PoolConfig {
				workers: Some(6),
				thread_name: "physics".to_string(),
				stack_size: Some(1 << 20),
			}
		);
		assert_eq!(config.resolved_workers(), 6);
	}

	#[test]
	fn rejects_unknown_fields() {
		assert!(toml::from_str::<PoolConfig>("priority = 3").is_err());
	}

	#[test]
	fn validation_catches_degenerate_values() {
		assert!(PoolConfig::with_workers(0).validate().is_err());

		let unnamed = PoolConfig {
			thread_name: String::new(),
			..PoolConfig::default()
		};
		assert!(unnamed.validate().is_err());
	}
}
