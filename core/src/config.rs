use std::time::Duration;

/// Knobs an embedder supplies when starting the core, rather than hardcoding.
#[derive(Debug, Clone, Copy)]
pub struct Config {
	/// Capacity of each `RemoteNode`'s client and server pipe pools.
	pub pool_capacity: usize,
	/// Resend interval assumed for a channel until the channel itself reports one.
	pub default_resend_interval: Duration,
	/// How long a channel may sit mid-handshake before it is dropped.
	pub handshake_timeout: Duration,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			pool_capacity: 10,
			default_resend_interval: Duration::from_millis(100),
			handshake_timeout: Duration::from_secs(5),
		}
	}
}
