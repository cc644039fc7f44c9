//! Transport seam.
//!
//! The protocol socket itself lives outside this crate. A [`Transport`] opens
//! one connection per attempt and hands back [`TransportParts`]: a handle for
//! outbound calls and the stream of lifecycle events for that connection.

use async_trait::async_trait;
use pairkeep_protocol::{CoreCredentials, TransportEvent};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::key::SessionId;

pub mod fake;

pub use fake::{FakeTransport, FakeTransportBuilder, FakeTransportController, SentMessage};

/// Opens protocol connections.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
	/// Starts connecting with `credentials`. Pairing and authentication are
	/// reported later through the returned event stream.
	async fn connect(&self, session: &SessionId, credentials: CoreCredentials) -> Result<TransportParts>;
}

/// Outbound primitives of one live connection.
#[async_trait]
pub trait TransportHandle: Send + Sync {
	/// Sends `content` to a transport address such as `628123@s.whatsapp.net`.
	async fn send_message(&self, address: &str, content: &str) -> Result<()>;

	/// Logs the account out. The transport is expected to follow up with a
	/// `Closed` event.
	async fn logout(&self) -> Result<()>;
}

/// One connection: outbound handle plus inbound events.
pub struct TransportParts {
	pub handle: Box<dyn TransportHandle>,
	pub events: mpsc::UnboundedReceiver<TransportEvent>,
}
