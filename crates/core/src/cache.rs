//! Last-known pairing artifact and status per session.
//!
//! Held in memory only. A restarted process starts empty and waits for the
//! transport to emit a new artifact; the artifact is never persisted because
//! it is worthless once pairing completes.

use std::collections::HashMap;

use pairkeep_protocol::{Notification, SessionStatus};
use parking_lot::RwLock;

use crate::key::SessionId;

/// Cached state of one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachedState {
	pub artifact: Option<String>,
	pub status: SessionStatus,
	pub user: Option<String>,
}

impl CachedState {
	/// Renders the state as the notifications a new observer should receive.
	pub fn to_notifications(&self) -> Vec<Notification> {
		let mut notifications = vec![Notification::status(self.status, self.user.clone())];
		if let Some(artifact) = &self.artifact {
			notifications.push(Notification::pairing(artifact.clone()));
		}
		notifications
	}
}

#[derive(Debug, Default)]
pub struct PairingCache {
	entries: RwLock<HashMap<SessionId, CachedState>>,
}

impl PairingCache {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn get(&self, session: &SessionId) -> CachedState {
		self.entries.read().get(session).cloned().unwrap_or_default()
	}

	/// Stores a new artifact, superseding any previous one.
	pub fn set_artifact(&self, session: &SessionId, artifact: String) {
		let mut entries = self.entries.write();
		let entry = entries.entry(session.clone()).or_default();
		entry.artifact = Some(artifact);
		entry.status = SessionStatus::PairingRequired;
		entry.user = None;
	}

	/// Records a status change. Any status other than `PairingRequired` clears
	/// the artifact in the same write.
	pub fn set_status(&self, session: &SessionId, status: SessionStatus, user: Option<String>) {
		let mut entries = self.entries.write();
		let entry = entries.entry(session.clone()).or_default();
		if status != SessionStatus::PairingRequired {
			entry.artifact = None;
		}
		entry.status = status;
		entry.user = user;
	}

	pub fn remove(&self, session: &SessionId) {
		self.entries.write().remove(session);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn unknown_session_reads_disconnected() {
		let cache = PairingCache::new();
		assert_eq!(cache.get(&"s1".into()), CachedState::default());
	}

	#[test]
	fn connected_clears_artifact() {
		let cache = PairingCache::new();
		let s1 = SessionId::new("s1");
		cache.set_artifact(&s1, "QR123".into());
		assert_eq!(cache.get(&s1).artifact.as_deref(), Some("QR123"));

		cache.set_status(&s1, SessionStatus::Connected, Some("628111".into()));
		let state = cache.get(&s1);
		assert_eq!(state.artifact, None);
		assert_eq!(state.user.as_deref(), Some("628111"));
	}

	#[test]
	fn newer_artifact_supersedes_older() {
		let cache = PairingCache::new();
		let s1 = SessionId::new("s1");
		cache.set_artifact(&s1, "QR1".into());
		cache.set_artifact(&s1, "QR2".into());
		assert_eq!(cache.get(&s1).to_notifications(), vec![
			Notification::status(SessionStatus::PairingRequired, None),
			Notification::pairing("QR2"),
		]);
	}
}
