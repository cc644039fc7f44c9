//! Registry of live session controllers.
//!
//! The registry is the public face of the lifecycle: it starts controllers,
//! routes logout and send requests to them and hands out observer
//! subscriptions. All controllers share one credential store, one transport
//! and one notification hub.

use std::collections::HashMap;
use std::sync::Arc;

use pairkeep_protocol::SessionStatus;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info};

use crate::cache::CachedState;
use crate::config::SessionConfig;
use crate::controller::{ControllerHandle, ControllerOptions, ControllerState, LogoutOutcome, SessionController, outbound_address};
use crate::error::{Error, Result};
use crate::key::SessionId;
use crate::notify::{NotificationHub, SessionFault, Subscription};
use crate::store::CredentialStore;
use crate::transport::Transport;

pub struct SessionRegistry {
	store: CredentialStore,
	transport: Arc<dyn Transport>,
	hub: Arc<NotificationHub>,
	options: ControllerOptions,
	sessions: Mutex<HashMap<SessionId, SessionController>>,
}

impl SessionRegistry {
	/// Creates a registry configured from `config`.
	pub fn new(store: CredentialStore, transport: impl Transport, config: &SessionConfig) -> Self {
		let options = ControllerOptions {
			backoff: config.reconnect.to_backoff(),
			restart_after_logout: config.restart_after_logout,
		};
		Self::with_options(store, transport, options, config.event_buffer)
	}

	pub fn with_options(store: CredentialStore, transport: impl Transport, options: ControllerOptions, event_buffer: usize) -> Self {
		Self {
			store,
			transport: Arc::new(transport),
			hub: Arc::new(NotificationHub::new(event_buffer)),
			options,
			sessions: Mutex::new(HashMap::new()),
		}
	}

	pub fn store(&self) -> &CredentialStore {
		&self.store
	}

	/// Starts a controller for `session`. Returns `false` when one is already
	/// running; a terminated controller is replaced.
	pub fn start(&self, session: impl Into<SessionId>) -> bool {
		let session = session.into();
		let mut sessions = self.sessions.lock();
		if sessions.get(&session).is_some_and(|controller| !controller.is_finished()) {
			debug!(target = "pairkeep.registry", %session, "session already running");
			return false;
		}

		let controller = SessionController::spawn(
			session.clone(),
			self.store.clone(),
			Arc::clone(&self.transport),
			Arc::clone(&self.hub),
			self.options.clone(),
		);
		sessions.insert(session.clone(), controller);
		info!(target = "pairkeep.registry", %session, "session started");
		true
	}

	/// Requests logout of `session`. The credential wipe follows once the
	/// transport reports the logged-out disconnect.
	pub async fn logout(&self, session: &SessionId) -> LogoutOutcome {
		match self.handle(session) {
			Some(handle) => handle.logout().await,
			None => {
				info!(target = "pairkeep.registry", %session, "logout requested for a session that is not running");
				LogoutOutcome::NoActiveSession
			}
		}
	}

	/// Sends a message through `session`. Fails with [`Error::InvalidRequest`]
	/// for an empty body or a destination without a number, and with
	/// [`Error::NotConnected`] unless the session is connected. Neither
	/// failure touches the transport.
	pub async fn send_message(&self, session: &SessionId, destination: &str, content: &str) -> Result<()> {
		outbound_address(destination, content)?;
		let not_connected = || Error::NotConnected {
			session: session.to_string(),
		};
		if self.hub.state(session).status != SessionStatus::Connected {
			return Err(not_connected());
		}
		let handle = self.handle(session).ok_or_else(not_connected)?;
		handle.send_message(destination, content).await
	}

	pub fn subscribe(&self, session: &SessionId) -> Subscription {
		self.hub.subscribe(session)
	}

	/// Last known status, user and pairing artifact of `session`.
	pub fn status(&self, session: &SessionId) -> CachedState {
		self.hub.state(session)
	}

	pub fn state(&self, session: &SessionId) -> Option<ControllerState> {
		self.handle(session).map(|handle| handle.state())
	}

	pub fn watch_state(&self, session: &SessionId) -> Option<watch::Receiver<ControllerState>> {
		self.handle(session).map(|handle| handle.watch_state())
	}

	/// Subscribes to faults reported by every controller.
	pub fn faults(&self) -> broadcast::Receiver<SessionFault> {
		self.hub.faults()
	}

	/// Sessions with a registered controller, sorted.
	pub fn sessions(&self) -> Vec<SessionId> {
		let mut ids: Vec<_> = self.sessions.lock().keys().cloned().collect();
		ids.sort();
		ids
	}

	/// Stops `session` without logging out. Stored credentials stay intact.
	///
	/// Observers receive the final `Disconnected` status, then their stream
	/// ends and the hub forgets the session.
	pub async fn stop(&self, session: &SessionId) -> bool {
		let controller = self.sessions.lock().remove(session);
		match controller {
			Some(controller) => {
				controller.stop().await;
				self.hub.forget(session);
				info!(target = "pairkeep.registry", %session, "session stopped");
				true
			}
			None => false,
		}
	}

	/// Stops every controller.
	pub async fn shutdown(&self) {
		let (ids, controllers): (Vec<_>, Vec<_>) = self.sessions.lock().drain().unzip();
		let count = controllers.len();
		futures::future::join_all(controllers.into_iter().map(SessionController::stop)).await;
		for session in &ids {
			self.hub.forget(session);
		}
		info!(target = "pairkeep.registry", count, "registry shut down");
	}

	fn handle(&self, session: &SessionId) -> Option<ControllerHandle> {
		self.sessions.lock().get(session).map(|controller| controller.handle().clone())
	}
}
