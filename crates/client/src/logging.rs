use tracing_subscriber::{
	fmt, layer::SubscriberExt, util::SubscriberInitExt, util::TryInitError, EnvFilter,
};

use crate::config::LogConfig;

/// Installs the global subscriber. `RUST_LOG` wins over the configured level.
///
/// Fails if a subscriber is already installed, for example by a test harness.
pub fn init_logging(config: &LogConfig) -> Result<(), TryInitError> {
	tracing_subscriber::registry()
		.with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level)))
		.with(fmt::layer().with_target(config.with_target))
		.try_init()
}
