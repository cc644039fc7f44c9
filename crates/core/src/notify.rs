//! Notification port and error channel.
//!
//! [`NotificationHub`] is the one place status and pairing changes flow
//! through: it updates the [`PairingCache`] and broadcasts to observers under
//! the same lock, so a late subscriber's snapshot and its live stream never
//! overlap or leave a gap.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use pairkeep_protocol::{Notification, SessionStatus};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::cache::{CachedState, PairingCache};
use crate::key::SessionId;

/// Failure category reported on the error channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
	/// A credential batch or a session clear failed to persist.
	Persistence,
	/// The transport logout primitive failed.
	Logout,
	/// Connecting failed or the transport reported an error.
	Transport,
	/// Reconnect attempts exhausted; the session terminated.
	CircuitOpen,
	/// Stored root credentials could not be read; the session terminated.
	Corrupt,
}

impl fmt::Display for FaultKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Self::Persistence => "persistence",
			Self::Logout => "logout",
			Self::Transport => "transport",
			Self::CircuitOpen => "circuit-open",
			Self::Corrupt => "corrupt",
		};
		f.write_str(name)
	}
}

/// One failure surfaced by a session controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFault {
	pub session: SessionId,
	pub kind: FaultKind,
	pub message: String,
}

/// Observer handle: the cached state at attach time, then live notifications.
pub struct Subscription {
	snapshot: VecDeque<Notification>,
	receiver: broadcast::Receiver<Notification>,
}

impl Subscription {
	/// Notifications describing the state at the moment of attaching.
	pub fn snapshot(&self) -> impl Iterator<Item = &Notification> {
		self.snapshot.iter()
	}

	/// Next notification: snapshot first, then live events. `None` once the hub is gone.
	pub async fn recv(&mut self) -> Option<Notification> {
		if let Some(next) = self.snapshot.pop_front() {
			return Some(next);
		}
		loop {
			match self.receiver.recv().await {
				Ok(notification) => return Some(notification),
				Err(broadcast::error::RecvError::Lagged(skipped)) => {
					warn!(target = "pairkeep.session", skipped, "observer lagged behind notifications");
				}
				Err(broadcast::error::RecvError::Closed) => return None,
			}
		}
	}
}

pub struct NotificationHub {
	cache: PairingCache,
	channels: Mutex<HashMap<SessionId, broadcast::Sender<Notification>>>,
	faults: broadcast::Sender<SessionFault>,
	capacity: usize,
}

impl NotificationHub {
	pub fn new(capacity: usize) -> Self {
		let capacity = capacity.max(1);
		let (faults, _) = broadcast::channel(capacity);
		Self {
			cache: PairingCache::new(),
			channels: Mutex::new(HashMap::new()),
			faults,
			capacity,
		}
	}

	/// Attaches an observer to `session`. Channels nobody listens to any more
	/// are dropped on the way.
	pub fn subscribe(&self, session: &SessionId) -> Subscription {
		let mut channels = self.channels.lock();
		channels.retain(|_, sender| sender.receiver_count() > 0);
		let sender = channels.entry(session.clone()).or_insert_with(|| broadcast::channel(self.capacity).0);
		Subscription {
			snapshot: self.cache.get(session).to_notifications().into(),
			receiver: sender.subscribe(),
		}
	}

	pub fn state(&self, session: &SessionId) -> CachedState {
		self.cache.get(session)
	}

	pub fn publish_pairing(&self, session: &SessionId, artifact: String) {
		let channels = self.channels.lock();
		let previous = self.cache.get(session).status;
		self.cache.set_artifact(session, artifact.clone());
		if previous != SessionStatus::PairingRequired {
			send(&channels, session, Notification::status(SessionStatus::PairingRequired, None));
		}
		send(&channels, session, Notification::pairing(artifact));
	}

	pub fn publish_status(&self, session: &SessionId, status: SessionStatus, user: Option<String>) {
		let channels = self.channels.lock();
		self.cache.set_status(session, status, user.clone());
		send(&channels, session, Notification::status(status, user));
	}

	/// Relays an incoming message. Messages bypass the cache; only attached
	/// observers see them.
	pub fn publish_message(&self, session: &SessionId, from: &str, message: &str) {
		let channels = self.channels.lock();
		send(&channels, session, Notification::message(from, message));
	}

	/// Drops cached state and closes observer streams for `session`.
	pub fn forget(&self, session: &SessionId) {
		let mut channels = self.channels.lock();
		self.cache.remove(session);
		channels.remove(session);
	}

	pub fn report_fault(&self, fault: SessionFault) {
		warn!(
			target = "pairkeep.session",
			session = %fault.session,
			kind = %fault.kind,
			message = %fault.message,
			"session fault"
		);
		let _ = self.faults.send(fault);
	}

	pub fn faults(&self) -> broadcast::Receiver<SessionFault> {
		self.faults.subscribe()
	}
}

fn send(channels: &HashMap<SessionId, broadcast::Sender<Notification>>, session: &SessionId, notification: Notification) {
	match channels.get(session) {
		Some(sender) => {
			let _ = sender.send(notification);
		}
		None => debug!(target = "pairkeep.session", %session, "no observers attached"),
	}
}
