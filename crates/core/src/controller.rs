//! Session lifecycle controller.
//!
//! One controller task owns one session: it loads credentials, opens a
//! transport connection, routes transport events and decides what happens
//! after every disconnect. Callers talk to it through [`SessionController`],
//! which forwards commands over a channel and exposes the lifecycle state as
//! a watch channel.
//!
//! Events of one connection are handled strictly in arrival order. A
//! credential batch is fully persisted before the next event is looked at,
//! so a later batch always lands after an earlier one.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use pairkeep_protocol::{DisconnectReason, SessionStatus, TransportEvent, account_number, to_address};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::key::SessionId;
use crate::notify::{FaultKind, NotificationHub, SessionFault};
use crate::policy::{Backoff, ReconnectAction, ReconnectPolicy};
use crate::store::CredentialStore;
use crate::transport::{Transport, TransportHandle, TransportParts};

/// Lifecycle state of a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControllerState {
	#[default]
	Idle,
	Connecting,
	PairingRequired,
	Connected,
	Closing,
	Terminated,
}

impl fmt::Display for ControllerState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Self::Idle => "idle",
			Self::Connecting => "connecting",
			Self::PairingRequired => "pairing-required",
			Self::Connected => "connected",
			Self::Closing => "closing",
			Self::Terminated => "terminated",
		};
		f.write_str(name)
	}
}

/// Result of a logout request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutOutcome {
	/// The transport logout primitive was invoked.
	Requested,
	/// No live connection existed; nothing was sent.
	NoActiveSession,
}

/// Behaviour knobs shared by every controller of a registry.
#[derive(Debug, Clone)]
pub struct ControllerOptions {
	pub backoff: Backoff,
	pub restart_after_logout: bool,
}

impl Default for ControllerOptions {
	fn default() -> Self {
		Self {
			backoff: Backoff::default(),
			restart_after_logout: true,
		}
	}
}

enum Command {
	Logout {
		reply: oneshot::Sender<LogoutOutcome>,
	},
	Send {
		address: String,
		content: String,
		reply: oneshot::Sender<Result<()>>,
	},
	Stop,
}

/// Cloneable handle for commanding a running controller.
#[derive(Clone)]
pub struct ControllerHandle {
	session: SessionId,
	commands: mpsc::UnboundedSender<Command>,
	state: watch::Receiver<ControllerState>,
}

impl ControllerHandle {
	pub fn session(&self) -> &SessionId {
		&self.session
	}

	pub fn state(&self) -> ControllerState {
		*self.state.borrow()
	}

	pub fn watch_state(&self) -> watch::Receiver<ControllerState> {
		self.state.clone()
	}

	/// Requests a logout of the live connection.
	pub async fn logout(&self) -> LogoutOutcome {
		let (reply, rx) = oneshot::channel();
		if self.commands.send(Command::Logout { reply }).is_err() {
			return LogoutOutcome::NoActiveSession;
		}
		rx.await.unwrap_or(LogoutOutcome::NoActiveSession)
	}

	/// Sends `content` to `destination` (phone number or full address).
	pub async fn send_message(&self, destination: &str, content: &str) -> Result<()> {
		let address = outbound_address(destination, content)?;
		let not_connected = || Error::NotConnected {
			session: self.session.to_string(),
		};
		let (reply, rx) = oneshot::channel();
		let command = Command::Send {
			address,
			content: content.to_string(),
			reply,
		};
		if self.commands.send(command).is_err() {
			return Err(not_connected());
		}
		rx.await.unwrap_or_else(|_| Err(not_connected()))
	}

	fn request_stop(&self) {
		let _ = self.commands.send(Command::Stop);
	}
}

/// Validates an outbound message and returns the transport address to send to.
///
/// Both a destination with a number (or a full address) and a non-empty body
/// are required.
pub fn outbound_address(destination: &str, content: &str) -> Result<String> {
	if content.is_empty() {
		return Err(Error::InvalidRequest("message content is empty".to_string()));
	}
	to_address(destination).ok_or_else(|| Error::InvalidRequest(format!("destination {destination:?} has no number")))
}

/// A running controller task plus its handle.
pub struct SessionController {
	handle: ControllerHandle,
	task: JoinHandle<()>,
}

impl SessionController {
	/// Spawns the controller task for `session` on the current runtime.
	pub fn spawn(
		session: SessionId,
		store: CredentialStore,
		transport: Arc<dyn Transport>,
		hub: Arc<NotificationHub>,
		options: ControllerOptions,
	) -> Self {
		let (commands_tx, commands_rx) = mpsc::unbounded_channel();
		let (state_tx, state_rx) = watch::channel(ControllerState::Idle);

		let worker = Worker {
			session: session.clone(),
			store,
			transport,
			hub,
			policy: ReconnectPolicy::new(options.backoff),
			restart_after_logout: options.restart_after_logout,
			state: state_tx,
			commands: commands_rx,
		};
		let task = tokio::spawn(worker.run());

		Self {
			handle: ControllerHandle {
				session,
				commands: commands_tx,
				state: state_rx,
			},
			task,
		}
	}

	pub fn handle(&self) -> &ControllerHandle {
		&self.handle
	}

	pub fn session(&self) -> &SessionId {
		self.handle.session()
	}

	pub fn state(&self) -> ControllerState {
		self.handle.state()
	}

	pub fn is_finished(&self) -> bool {
		self.task.is_finished()
	}

	/// Shuts the controller down without logging out and waits for the task.
	pub async fn stop(self) {
		self.handle.request_stop();
		if let Err(err) = self.task.await {
			warn!(target = "pairkeep.session", session = %self.handle.session, error = %err, "controller task failed");
		}
	}
}

/// What the run loop does after one connection ends.
enum Next {
	Restart(Option<Duration>),
	Terminate,
	Stopped,
}

struct Worker {
	session: SessionId,
	store: CredentialStore,
	transport: Arc<dyn Transport>,
	hub: Arc<NotificationHub>,
	policy: ReconnectPolicy,
	restart_after_logout: bool,
	state: watch::Sender<ControllerState>,
	commands: mpsc::UnboundedReceiver<Command>,
}

impl Worker {
	async fn run(mut self) {
		info!(target = "pairkeep.session", session = %self.session, "session controller started");
		loop {
			match self.connect_once().await {
				Next::Restart(delay) => {
					self.set_state(ControllerState::Idle);
					if let Some(delay) = delay {
						debug!(target = "pairkeep.session", session = %self.session, attempt = self.policy.attempts(), ?delay, "waiting before reconnect");
						if !self.idle_for(delay).await {
							break;
						}
					}
				}
				Next::Terminate => {
					self.set_state(ControllerState::Terminated);
					info!(target = "pairkeep.session", session = %self.session, "session terminated");
					break;
				}
				Next::Stopped => {
					self.set_state(ControllerState::Idle);
					info!(target = "pairkeep.session", session = %self.session, "session controller stopped");
					break;
				}
			}
		}
		self.commands.close();
		while let Ok(command) = self.commands.try_recv() {
			self.reject(command);
		}
	}

	/// One connection attempt from credential load to disconnect.
	async fn connect_once(&mut self) -> Next {
		self.set_state(ControllerState::Connecting);

		let credentials = match self.store.load_credentials(&self.session).await {
			Ok(credentials) => credentials,
			Err(err) if err.is_corrupt() => {
				self.fault(FaultKind::Corrupt, err.to_string());
				return self.on_disconnect(DisconnectReason::LocalFault(err.to_string())).await;
			}
			Err(err) => {
				self.fault(FaultKind::Persistence, err.to_string());
				return self.on_disconnect(DisconnectReason::ConnectionClosed).await;
			}
		};
		debug!(target = "pairkeep.session", session = %self.session, paired = credentials.is_paired(), "credentials loaded");

		let TransportParts { handle, mut events } = match self.transport.connect(&self.session, credentials).await {
			Ok(parts) => parts,
			Err(err) => {
				self.fault(FaultKind::Transport, err.to_string());
				return self.on_disconnect(DisconnectReason::ConnectionClosed).await;
			}
		};

		loop {
			// Commands first: a busy event stream must not hold off logout or stop.
			tokio::select! {
				biased;
				command = self.commands.recv() => match command {
					Some(Command::Stop) | None => {
						self.hub.publish_status(&self.session, SessionStatus::Disconnected, None);
						return Next::Stopped;
					}
					Some(command) => self.handle_command(handle.as_ref(), command).await,
				},
				event = events.recv() => {
					let Some(event) = event else {
						debug!(target = "pairkeep.session", session = %self.session, "transport event stream ended");
						return self.on_disconnect(DisconnectReason::ConnectionLost).await;
					};
					if let TransportEvent::Closed { reason } = event {
						return self.on_disconnect(reason).await;
					}
					self.handle_event(event).await;
				}
			}
		}
	}

	async fn handle_event(&mut self, event: TransportEvent) {
		match event {
			TransportEvent::PairingArtifact { value } => {
				info!(target = "pairkeep.session", session = %self.session, "pairing artifact received");
				self.set_state(ControllerState::PairingRequired);
				self.hub.publish_pairing(&self.session, value);
			}
			TransportEvent::Opened { user_id } => {
				let user = account_number(&user_id).to_string();
				info!(target = "pairkeep.session", session = %self.session, %user, "session connected");
				self.policy.reset();
				self.set_state(ControllerState::Connected);
				self.hub.publish_status(&self.session, SessionStatus::Connected, Some(user));
			}
			TransportEvent::CredentialUpdate { batch } => {
				debug!(target = "pairkeep.session", session = %self.session, writes = batch.len(), "persisting credential batch");
				if let Err(err) = self.store.apply_batch(&self.session, &batch).await {
					self.fault(FaultKind::Persistence, err.to_string());
				}
			}
			message @ TransportEvent::MessageReceived { .. } => match message.relayable_text() {
				Some((from, text)) => {
					debug!(target = "pairkeep.session", session = %self.session, %from, "relaying incoming message");
					self.hub.publish_message(&self.session, from, text);
				}
				None => debug!(target = "pairkeep.session", session = %self.session, "skipping own, synced or non-text message"),
			},
			TransportEvent::Closed { .. } => {}
		}
	}

	async fn handle_command(&mut self, handle: &dyn TransportHandle, command: Command) {
		match command {
			Command::Logout { reply } => {
				info!(target = "pairkeep.session", session = %self.session, "logout requested");
				if let Err(err) = handle.logout().await {
					self.fault(FaultKind::Logout, err.to_string());
				}
				let _ = reply.send(LogoutOutcome::Requested);
			}
			Command::Send { address, content, reply } => {
				let connected = *self.state.borrow() == ControllerState::Connected;
				let result = if connected {
					handle.send_message(&address, &content).await
				} else {
					Err(self.not_connected())
				};
				let _ = reply.send(result);
			}
			Command::Stop => {}
		}
	}

	async fn on_disconnect(&mut self, reason: DisconnectReason) -> Next {
		self.set_state(ControllerState::Closing);
		self.hub.publish_status(&self.session, SessionStatus::Disconnected, None);

		let action = self.policy.decide(&reason);
		info!(target = "pairkeep.session", session = %self.session, %reason, ?action, "connection closed");

		match action {
			ReconnectAction::Reconnect => match self.policy.next_delay() {
				Some(delay) => Next::Restart(Some(delay)),
				None => {
					self.fault(FaultKind::CircuitOpen, format!("gave up after {} reconnect attempts", self.policy.attempts() - 1));
					Next::Terminate
				}
			},
			ReconnectAction::TerminateAndClear => {
				if let Err(err) = self.store.clear_session(&self.session).await {
					self.fault(FaultKind::Persistence, err.to_string());
					return Next::Terminate;
				}
				info!(target = "pairkeep.session", session = %self.session, "session credentials cleared");
				if self.restart_after_logout {
					self.policy.reset();
					Next::Restart(None)
				} else {
					Next::Terminate
				}
			}
			ReconnectAction::Terminate => Next::Terminate,
		}
	}

	/// Sleeps through a backoff delay while still answering commands.
	/// Returns `false` if the controller was stopped meanwhile.
	async fn idle_for(&mut self, delay: Duration) -> bool {
		let sleep = tokio::time::sleep(delay);
		tokio::pin!(sleep);
		loop {
			tokio::select! {
				_ = &mut sleep => return true,
				command = self.commands.recv() => match command {
					Some(Command::Stop) | None => return false,
					Some(command) => self.reject(command),
				},
			}
		}
	}

	/// Answers a command that arrives while no connection is live.
	fn reject(&self, command: Command) {
		match command {
			Command::Logout { reply } => {
				info!(target = "pairkeep.session", session = %self.session, "logout requested without an active connection");
				let _ = reply.send(LogoutOutcome::NoActiveSession);
			}
			Command::Send { reply, .. } => {
				let _ = reply.send(Err(self.not_connected()));
			}
			Command::Stop => {}
		}
	}

	fn set_state(&self, state: ControllerState) {
		self.state.send_replace(state);
	}

	fn fault(&self, kind: FaultKind, message: String) {
		self.hub.report_fault(SessionFault {
			session: self.session.clone(),
			kind,
			message,
		});
	}

	fn not_connected(&self) -> Error {
		Error::NotConnected {
			session: self.session.to_string(),
		}
	}
}
