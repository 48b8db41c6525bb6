use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables of the election protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElectionConfig {
	/// How long a peer waits for gossip before electing with what it knows.
	pub establish_timeout_ms: u64,
	/// How long `request_handoff_to_self` waits for the current leader to cede.
	pub handoff_timeout_ms: u64,
	/// Capacity of the election event broadcast channel.
	pub event_capacity: usize,
}

impl Default for ElectionConfig {
	fn default() -> Self {
		Self {
			establish_timeout_ms: 100,
			handoff_timeout_ms: 2_000,
			event_capacity: 64,
		}
	}
}

impl ElectionConfig {
	#[must_use]
	pub const fn establish_timeout(&self) -> Duration {
		Duration::from_millis(self.establish_timeout_ms)
	}

	#[must_use]
	pub const fn handoff_timeout(&self) -> Duration {
		Duration::from_millis(self.handoff_timeout_ms)
	}
}
