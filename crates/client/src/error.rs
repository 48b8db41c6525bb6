use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("failed to access config file <path='{}'>: {source}", .path.display())]
	Io {
		path: PathBuf,
		#[source]
		source: io::Error,
	},
	#[error("failed to parse config file <path='{}'>: {source}", .path.display())]
	Parse {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},
	#[error("config version {found} is newer than the supported {supported}")]
	UnsupportedVersion { found: u32, supported: u32 },
}

#[derive(Debug, Error)]
pub enum Error {
	#[error(transparent)]
	Election(#[from] mt_election::Error),
	#[error(transparent)]
	Store(#[from] mt_store::Error),
	#[error(transparent)]
	Config(#[from] ConfigError),
}
