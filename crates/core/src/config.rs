//! Runtime configuration for stores and session controllers.
//!
//! Configuration lives in a single JSON file (default
//! `~/.config/pairkeep/config.json`). Every field is optional; a missing file
//! yields the defaults. `PAIRKEEP_STORE_DIR` overrides the store location.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::policy::Backoff;

/// Environment variable overriding [`SessionConfig::store_dir`].
pub const STORE_DIR_ENV: &str = "PAIRKEEP_STORE_DIR";

/// Reconnect backoff settings as they appear in the config file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct BackoffConfig {
	pub initial_delay_ms: u64,
	pub max_delay_ms: u64,
	pub multiplier: f64,
	pub max_attempts: u32,
}

impl Default for BackoffConfig {
	fn default() -> Self {
		Self {
			initial_delay_ms: 500,
			max_delay_ms: 30_000,
			multiplier: 2.0,
			max_attempts: 10,
		}
	}
}

impl BackoffConfig {
	pub fn to_backoff(&self) -> Backoff {
		Backoff {
			initial: Duration::from_millis(self.initial_delay_ms),
			max: Duration::from_millis(self.max_delay_ms),
			multiplier: self.multiplier,
			max_attempts: self.max_attempts,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionConfig {
	/// Root directory of the file-backed credential store.
	pub store_dir: PathBuf,
	pub reconnect: BackoffConfig,
	/// Start a fresh pairing flow after the remote logs the session out.
	pub restart_after_logout: bool,
	/// Capacity of the notification and fault broadcast channels.
	pub event_buffer: usize,
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			store_dir: default_store_dir(),
			reconnect: BackoffConfig::default(),
			restart_after_logout: true,
			event_buffer: 64,
		}
	}
}

impl SessionConfig {
	/// Loads config from `path`, falling back to defaults when the file is absent.
	pub fn load(path: &Path) -> Result<Self> {
		let mut config = match fs::read_to_string(path) {
			Ok(content) => serde_json::from_str::<Self>(&content).map_err(|err| Error::Config {
				path: path.to_path_buf(),
				reason: err.to_string(),
			})?,
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::default(),
			Err(err) => return Err(err.into()),
		};
		config.apply_env(std::env::var_os(STORE_DIR_ENV).map(PathBuf::from));
		config.validate(path)?;
		Ok(config)
	}

	/// Loads config from the default location.
	pub fn load_default() -> Result<Self> {
		Self::load(&default_config_path())
	}

	fn apply_env(&mut self, store_dir: Option<PathBuf>) {
		if let Some(dir) = store_dir.filter(|dir| !dir.as_os_str().is_empty()) {
			self.store_dir = dir;
		}
	}

	fn validate(&self, path: &Path) -> Result<()> {
		let reason = if self.reconnect.multiplier < 1.0 {
			"reconnect.multiplier must be >= 1.0"
		} else if self.reconnect.initial_delay_ms > self.reconnect.max_delay_ms {
			"reconnect.initialDelayMs must not exceed reconnect.maxDelayMs"
		} else if self.event_buffer == 0 {
			"eventBuffer must be positive"
		} else {
			return Ok(());
		};
		Err(Error::Config {
			path: path.to_path_buf(),
			reason: reason.to_string(),
		})
	}
}

pub fn default_config_path() -> PathBuf {
	dirs::config_dir().unwrap_or_else(|| PathBuf::from(".")).join("pairkeep/config.json")
}

fn default_store_dir() -> PathBuf {
	dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join("pairkeep/auth")
}

#[cfg(test)]
mod tests {
	use tempfile::TempDir;

	use super::*;

	#[test]
	fn missing_file_yields_defaults() {
		let tmp = TempDir::new().unwrap();
		let config = SessionConfig::load(&tmp.path().join("absent.json")).unwrap();
		assert_eq!(config.reconnect, BackoffConfig::default());
		assert!(config.restart_after_logout);
	}

	#[test]
	fn partial_file_keeps_remaining_defaults() {
		let tmp = TempDir::new().unwrap();
		let path = tmp.path().join("config.json");
		fs::write(&path, r#"{"reconnect": {"maxAttempts": 3}, "restartAfterLogout": false}"#).unwrap();
		let config = SessionConfig::load(&path).unwrap();
		assert_eq!(config.reconnect.max_attempts, 3);
		assert_eq!(config.reconnect.initial_delay_ms, 500);
		assert!(!config.restart_after_logout);
	}

	#[test]
	fn shrinking_multiplier_is_rejected() {
		let tmp = TempDir::new().unwrap();
		let path = tmp.path().join("config.json");
		fs::write(&path, r#"{"reconnect": {"multiplier": 0.5}}"#).unwrap();
		let err = SessionConfig::load(&path).unwrap_err();
		assert!(matches!(err, Error::Config { .. }));
	}

	#[test]
	fn env_override_replaces_store_dir() {
		let mut config = SessionConfig::default();
		config.apply_env(Some(PathBuf::from("/var/lib/pairkeep")));
		assert_eq!(config.store_dir, PathBuf::from("/var/lib/pairkeep"));
		config.apply_env(Some(PathBuf::new()));
		assert_eq!(config.store_dir, PathBuf::from("/var/lib/pairkeep"));
	}
}
