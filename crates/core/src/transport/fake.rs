//! Fake transport for driving session controllers without a network.
//!
//! # Example
//!
//! ```ignore
//! let (transport, controller) = FakeTransportBuilder::new().build();
//! let registry = SessionRegistry::with_options(store, transport, options, 16);
//! registry.start("s1");
//!
//! controller.wait_for_connects(1).await;
//! controller.emit_pairing("QR123");
//! controller.emit_opened("628111:1@s.whatsapp.net");
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use pairkeep_protocol::{CoreCredentials, CredentialBatch, DisconnectReason, TransportEvent, UpsertKind};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use super::{Transport, TransportHandle, TransportParts};
use crate::error::{Error, Result};
use crate::key::SessionId;

/// Message captured by the fake handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
	pub session: SessionId,
	pub address: String,
	pub content: String,
}

#[derive(Default)]
struct FakeState {
	connects: Vec<(SessionId, CoreCredentials)>,
	current: Option<mpsc::UnboundedSender<TransportEvent>>,
	sent: Vec<SentMessage>,
	logouts: usize,
	failing_connects: usize,
}

/// Builder for creating fake transport instances.
pub struct FakeTransportBuilder {
	logout_closes: bool,
	failing_connects: usize,
}

impl FakeTransportBuilder {
	pub fn new() -> Self {
		Self {
			logout_closes: true,
			failing_connects: 0,
		}
	}

	/// Whether `logout` emits `Closed { LoggedOut }` like a real transport. Defaults to `true`.
	pub fn logout_closes(mut self, closes: bool) -> Self {
		self.logout_closes = closes;
		self
	}

	/// Makes the first `count` connect attempts fail.
	pub fn failing_connects(mut self, count: usize) -> Self {
		self.failing_connects = count;
		self
	}

	pub fn build(self) -> (FakeTransport, FakeTransportController) {
		let state = Arc::new(Mutex::new(FakeState {
			failing_connects: self.failing_connects,
			..FakeState::default()
		}));
		let (connects_tx, connects_rx) = watch::channel(0);

		let transport = FakeTransport {
			state: Arc::clone(&state),
			connects: connects_tx,
			logout_closes: self.logout_closes,
		};
		let controller = FakeTransportController { state, connects: connects_rx };
		(transport, controller)
	}
}

impl Default for FakeTransportBuilder {
	fn default() -> Self {
		Self::new()
	}
}

pub struct FakeTransport {
	state: Arc<Mutex<FakeState>>,
	connects: watch::Sender<usize>,
	logout_closes: bool,
}

#[async_trait]
impl Transport for FakeTransport {
	async fn connect(&self, session: &SessionId, credentials: CoreCredentials) -> Result<TransportParts> {
		let (events_tx, events_rx) = mpsc::unbounded_channel();
		let result = {
			let mut state = self.state.lock();
			state.connects.push((session.clone(), credentials));
			if state.failing_connects > 0 {
				state.failing_connects -= 1;
				state.current = None;
				Err(Error::TransportFault("connection refused".to_string()))
			} else {
				state.current = Some(events_tx.clone());
				Ok(())
			}
		};
		self.connects.send_modify(|count| *count += 1);
		result?;

		Ok(TransportParts {
			handle: Box::new(FakeHandle {
				session: session.clone(),
				state: Arc::clone(&self.state),
				events: events_tx,
				logout_closes: self.logout_closes,
			}),
			events: events_rx,
		})
	}
}

struct FakeHandle {
	session: SessionId,
	state: Arc<Mutex<FakeState>>,
	events: mpsc::UnboundedSender<TransportEvent>,
	logout_closes: bool,
}

#[async_trait]
impl TransportHandle for FakeHandle {
	async fn send_message(&self, address: &str, content: &str) -> Result<()> {
		self.state.lock().sent.push(SentMessage {
			session: self.session.clone(),
			address: address.to_string(),
			content: content.to_string(),
		});
		Ok(())
	}

	async fn logout(&self) -> Result<()> {
		self.state.lock().logouts += 1;
		if self.logout_closes {
			let _ = self.events.send(TransportEvent::Closed {
				reason: DisconnectReason::LoggedOut,
			});
		}
		Ok(())
	}
}

/// Test-side handle for injecting events and inspecting calls.
#[derive(Clone)]
pub struct FakeTransportController {
	state: Arc<Mutex<FakeState>>,
	connects: watch::Receiver<usize>,
}

impl FakeTransportController {
	/// Injects an event into the most recent connection. Returns `false` when
	/// no connection is live.
	pub fn emit(&self, event: TransportEvent) -> bool {
		let state = self.state.lock();
		state.current.as_ref().is_some_and(|tx| tx.send(event).is_ok())
	}

	pub fn emit_pairing(&self, value: &str) -> bool {
		self.emit(TransportEvent::PairingArtifact { value: value.to_string() })
	}

	pub fn emit_opened(&self, user_id: &str) -> bool {
		self.emit(TransportEvent::Opened { user_id: user_id.to_string() })
	}

	pub fn emit_closed(&self, reason: DisconnectReason) -> bool {
		self.emit(TransportEvent::Closed { reason })
	}

	pub fn emit_credentials(&self, batch: CredentialBatch) -> bool {
		self.emit(TransportEvent::CredentialUpdate { batch })
	}

	/// Emits a live text message from someone else.
	pub fn emit_message(&self, from: &str, text: &str) -> bool {
		self.emit(TransportEvent::MessageReceived {
			from: from.to_string(),
			text: text.to_string(),
			from_me: false,
			kind: UpsertKind::Notify,
		})
	}

	/// Waits until at least `count` connect attempts were made.
	pub async fn wait_for_connects(&self, count: usize) {
		let mut connects = self.connects.clone();
		let _ = connects.wait_for(|seen| *seen >= count).await;
	}

	pub fn connect_count(&self) -> usize {
		self.state.lock().connects.len()
	}

	/// Credentials passed to the most recent connect attempt.
	pub fn last_credentials(&self) -> Option<CoreCredentials> {
		self.state.lock().connects.last().map(|(_, creds)| creds.clone())
	}

	pub fn logout_count(&self) -> usize {
		self.state.lock().logouts
	}

	/// Takes all sent messages, clearing the buffer.
	pub fn take_sent(&self) -> Vec<SentMessage> {
		std::mem::take(&mut self.state.lock().sent)
	}
}
