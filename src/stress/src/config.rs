use std::{fs, io, path::Path};

use anyhow::Context;
use serde::Deserialize;
use tally_jobs::config::PoolConfig;

pub const DEFAULT_CONFIG_PATH: &str = "tally.toml";

#[derive(Debug, Clone, Default, Eq, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfRoot {
	pub pool: PoolConfig,
}

impl ConfRoot {
	pub fn parse(text: &str) -> anyhow::Result<Self> {
		let conf = toml::from_str::<Self>(text)?;
		conf.pool.validate().context("invalid `[pool]` table")?;
		Ok(conf)
	}

	/// Loads the config at `path`, or at [`DEFAULT_CONFIG_PATH`] if no path was given. Only a
	/// missing default file falls back to the defaults; a missing explicit file is an error.
	pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
		let (path, explicit) = match path {
			Some(path) => (path, true),
			None => (Path::new(DEFAULT_CONFIG_PATH), false),
		};

		let text = match fs::read_to_string(path) {
			Ok(text) => text,
			Err(err) if !explicit && err.kind() == io::ErrorKind::NotFound => {
				log::info!("No config file at {}; using defaults", path.display());
				return Ok(Self::default());
			}
			Err(err) => {
				return Err(err)
					.with_context(|| format!("failed to read config file {}", path.display()));
			}
		};

		Self::parse(&text).with_context(|| format!("failed to load config file {}", path.display()))
	}
}
