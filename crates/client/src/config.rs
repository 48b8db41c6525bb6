use std::{fs, path::Path};

use mt_election::ElectionConfig;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ConfigError;

pub const CONFIG_VERSION: u32 = 1;

/// Client configuration, stored as JSON.
///
/// Missing sections fall back to their defaults, so older files keep loading after new
/// knobs are added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
	/// Config schema version
	pub version: u32,

	/// Version of the client that wrote the file
	#[serde(default = "default_app_version")]
	pub app_version: String,

	#[serde(default)]
	pub election: ElectionConfig,

	#[serde(default)]
	pub log: LogConfig,

	/// Capacity of the in-process broadcast bus
	#[serde(default = "default_bus_capacity")]
	pub bus_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
	/// Filter directives used when `RUST_LOG` is not set
	pub level: String,
	pub with_target: bool,
}

impl Default for LogConfig {
	fn default() -> Self {
		Self {
			level: "info".to_string(),
			with_target: true,
		}
	}
}

fn default_app_version() -> String {
	env!("CARGO_PKG_VERSION").to_string()
}

const fn default_bus_capacity() -> usize {
	1024
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			version: CONFIG_VERSION,
			app_version: default_app_version(),
			election: ElectionConfig::default(),
			log: LogConfig::default(),
			bus_capacity: default_bus_capacity(),
		}
	}
}

impl ClientConfig {
	/// Loads the config at `path`, writing the defaults there if it does not exist yet.
	pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();

		if !path.exists() {
			warn!(path = %path.display(), "No config found, creating default");
			let config = Self::default();
			config.save(path)?;
			return Ok(config);
		}

		info!(path = %path.display(), "Loading config");
		let json = fs::read_to_string(path).map_err(|source| ConfigError::Io {
			path: path.to_path_buf(),
			source,
		})?;

		let config = serde_json::from_str::<Self>(&json).map_err(|source| ConfigError::Parse {
			path: path.to_path_buf(),
			source,
		})?;

		if config.version > CONFIG_VERSION {
			return Err(ConfigError::UnsupportedVersion {
				found: config.version,
				supported: CONFIG_VERSION,
			});
		}

		Ok(config)
	}

	pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
		let path = path.as_ref();
		let io_err = |source| ConfigError::Io {
			path: path.to_path_buf(),
			source,
		};

		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent).map_err(io_err)?;
		}

		let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
			path: path.to_path_buf(),
			source,
		})?;
		fs::write(path, json).map_err(io_err)?;

		info!(path = %path.display(), "Saved config");
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use tempfile::tempdir;

	use super::*;

	#[test]
	fn missing_file_is_created_with_defaults() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("nested").join("client.json");

		let config = ClientConfig::load_from(&path).unwrap();

		assert_eq!(config, ClientConfig::default());
		assert!(path.exists());
		assert_eq!(ClientConfig::load_from(&path).unwrap(), config);
	}

	#[test]
	fn partial_file_falls_back_to_defaults() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("client.json");
		fs::write(
			&path,
			r#"{ "version": 1, "election": { "establish_timeout_ms": 250 } }"#,
		)
		.unwrap();

		let config = ClientConfig::load_from(&path).unwrap();

		assert_eq!(config.election.establish_timeout_ms, 250);
		assert_eq!(config.election.handoff_timeout_ms, 2_000);
		assert_eq!(config.log, LogConfig::default());
		assert_eq!(config.bus_capacity, 1024);
	}

	#[test]
	fn newer_versions_are_rejected() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("client.json");
		fs::write(&path, r#"{ "version": 99 }"#).unwrap();

		assert!(matches!(
			ClientConfig::load_from(&path),
			Err(ConfigError::UnsupportedVersion {
				found: 99,
				supported: CONFIG_VERSION,
			})
		));
	}

	#[test]
	fn garbage_is_a_parse_error() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("client.json");
		fs::write(&path, "not json").unwrap();

		assert!(matches!(
			ClientConfig::load_from(&path),
			Err(ConfigError::Parse { .. })
		));
	}
}
