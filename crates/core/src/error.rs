//! Error types for credential storage and session control.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout `pairkeep`.
pub type Result<T> = std::result::Result<T, Error>;

/// One key that failed inside a batch write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedKey {
	pub key: String,
	pub reason: String,
}

impl std::fmt::Display for FailedKey {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{} ({})", self.key, self.reason)
	}
}

#[derive(Debug, Error)]
pub enum Error {
	/// The backing store could not be reached. Callers may retry.
	#[error("storage unavailable for {key}: {source}")]
	StorageUnavailable {
		key: String,
		#[source]
		source: std::io::Error,
	},

	/// A stored payload could not be decoded.
	#[error("stored record {key} is corrupt: {reason}")]
	StorageCorrupt { key: String, reason: String },

	/// Some writes of a batch failed. Writes that succeeded are kept.
	#[error("{} of the batch writes failed: {}", .failed.len(), join_failed(.failed))]
	BatchFailed { failed: Vec<FailedKey> },

	#[error("session {session} is not connected")]
	NotConnected { session: String },

	/// A caller request was rejected before reaching the transport.
	#[error("invalid request: {0}")]
	InvalidRequest(String),

	#[error("unknown session: {0}")]
	UnknownSession(String),

	#[error("transport fault: {0}")]
	TransportFault(String),

	#[error("invalid config at {path}: {reason}")]
	Config { path: PathBuf, reason: String },

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),
}

impl Error {
	pub(crate) fn unavailable(key: impl ToString, source: std::io::Error) -> Self {
		Self::StorageUnavailable { key: key.to_string(), source }
	}

	pub(crate) fn corrupt(key: impl ToString, reason: impl ToString) -> Self {
		Self::StorageCorrupt {
			key: key.to_string(),
			reason: reason.to_string(),
		}
	}

	/// Returns `true` for transient failures worth another attempt.
	pub fn is_retryable(&self) -> bool {
		match self {
			Self::StorageUnavailable { .. } | Self::TransportFault(_) | Self::Io(_) => true,
			Self::BatchFailed { .. } => true,
			_ => false,
		}
	}

	pub fn is_corrupt(&self) -> bool {
		matches!(self, Self::StorageCorrupt { .. })
	}
}

fn join_failed(failed: &[FailedKey]) -> String {
	failed.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn batch_error_names_every_failed_key() {
		let err = Error::BatchFailed {
			failed: vec![
				FailedKey {
					key: "s1-pre-key-1".into(),
					reason: "disk full".into(),
				},
				FailedKey {
					key: "s1-session-abc".into(),
					reason: "disk full".into(),
				},
			],
		};
		let msg = err.to_string();
		assert!(msg.starts_with("2 of the batch writes failed"));
		assert!(msg.contains("s1-pre-key-1"));
		assert!(msg.contains("s1-session-abc"));
		assert!(err.is_retryable());
	}

	#[test]
	fn corrupt_is_not_retryable() {
		let err = Error::corrupt("s1-creds", "expected value");
		assert!(err.is_corrupt());
		assert!(!err.is_retryable());
	}
}
