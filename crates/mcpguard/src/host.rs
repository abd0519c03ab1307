// Host capability
//
// Guards are deterministic given a fixed host: every side-effect (logging,
// clock reads, config fetches) goes through this narrow interface, so the
// same guard code runs compiled into the gateway or inside a sandboxed
// guest where the host is provided by the embedder.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

/// Log severity, matching the wire contract's numeric levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
	Debug = 1,
	Info = 2,
	Warn = 3,
	Error = 4,
}

impl LogLevel {
	/// Map a wire-level numeric value to a level. Unknown values clamp to
	/// `Error` so a misbehaving guest never loses a message.
	pub fn from_wire(level: u8) -> Self {
		match level {
			1 => LogLevel::Debug,
			2 => LogLevel::Info,
			3 => LogLevel::Warn,
			_ => LogLevel::Error,
		}
	}
}

/// The capability set a host provides to guards.
pub trait Host: Send + Sync {
	/// Emit a log message at the given severity.
	fn log(&self, level: LogLevel, message: &str);

	/// Seconds since the Unix epoch.
	fn get_time(&self) -> u64;

	/// Fetch a configuration value by key. Returns the empty string when
	/// the key is unset; callers fall back to cached values or defaults.
	fn get_config(&self, key: &str) -> String;
}

/// Default host backed by `tracing` and the system clock, with an in-memory
/// config map the embedding gateway populates at startup.
#[derive(Default)]
pub struct TracingHost {
	config: RwLock<HashMap<String, String>>,
}

impl TracingHost {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_config(entries: impl IntoIterator<Item = (String, String)>) -> Self {
		Self {
			config: RwLock::new(entries.into_iter().collect()),
		}
	}

	pub fn set_config(&self, key: impl Into<String>, value: impl Into<String>) {
		let mut config = self.config.write().expect("config lock poisoned");
		config.insert(key.into(), value.into());
	}
}

impl Host for TracingHost {
	fn log(&self, level: LogLevel, message: &str) {
		match level {
			LogLevel::Debug => tracing::debug!("{message}"),
			LogLevel::Info => tracing::info!("{message}"),
			LogLevel::Warn => tracing::warn!("{message}"),
			LogLevel::Error => tracing::error!("{message}"),
		}
	}

	fn get_time(&self) -> u64 {
		SystemTime::now()
			.duration_since(UNIX_EPOCH)
			.map(|d| d.as_secs())
			.unwrap_or(0)
	}

	fn get_config(&self, key: &str) -> String {
		let config = self.config.read().expect("config lock poisoned");
		config.get(key).cloned().unwrap_or_default()
	}
}
