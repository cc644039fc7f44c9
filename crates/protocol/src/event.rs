//! Events emitted by the transport collaborator.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Opaque record payload. Only the transport interprets it.
pub type Payload = Vec<u8>;

/// Batch of credential writes keyed by category, then entry id.
///
/// `None` deletes the entry, `Some` upserts it. The root credential record is
/// addressed with the `creds` category and an empty entry id.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct CredentialBatch {
	pub categories: BTreeMap<String, BTreeMap<String, Option<Payload>>>,
}

impl CredentialBatch {
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds an upsert for `category`/`entry`.
	pub fn set(mut self, category: impl Into<String>, entry: impl Into<String>, payload: impl Into<Payload>) -> Self {
		self.categories.entry(category.into()).or_default().insert(entry.into(), Some(payload.into()));
		self
	}

	/// Adds a deletion for `category`/`entry`.
	pub fn delete(mut self, category: impl Into<String>, entry: impl Into<String>) -> Self {
		self.categories.entry(category.into()).or_default().insert(entry.into(), None);
		self
	}

	pub fn len(&self) -> usize {
		self.categories.values().map(BTreeMap::len).sum()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

/// Why the transport connection went away.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum DisconnectReason {
	/// The account was logged out, locally or from another device.
	LoggedOut,
	/// The remote party rejected the stored credentials.
	BadSession,
	ConnectionClosed,
	ConnectionLost,
	/// Another client took over the session.
	ConnectionReplaced,
	TimedOut,
	/// The remote asked for a fresh connection, usually right after pairing.
	RestartRequired,
	MultideviceMismatch,
	/// Unrecoverable fault on our side, e.g. unreadable stored credentials.
	LocalFault(String),
	Unknown(u16),
}

impl DisconnectReason {
	/// Maps a transport status code onto a reason.
	pub fn from_status_code(code: u16) -> Self {
		match code {
			401 => Self::LoggedOut,
			500 => Self::BadSession,
			428 => Self::ConnectionClosed,
			408 => Self::ConnectionLost,
			440 => Self::ConnectionReplaced,
			411 => Self::MultideviceMismatch,
			515 => Self::RestartRequired,
			other => Self::Unknown(other),
		}
	}
}

impl std::fmt::Display for DisconnectReason {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::LoggedOut => f.write_str("logged out"),
			Self::BadSession => f.write_str("bad session"),
			Self::ConnectionClosed => f.write_str("connection closed"),
			Self::ConnectionLost => f.write_str("connection lost"),
			Self::ConnectionReplaced => f.write_str("connection replaced"),
			Self::TimedOut => f.write_str("timed out"),
			Self::RestartRequired => f.write_str("restart required"),
			Self::MultideviceMismatch => f.write_str("multi-device mismatch"),
			Self::LocalFault(detail) => write!(f, "local fault: {detail}"),
			Self::Unknown(code) => write!(f, "unknown ({code})"),
		}
	}
}

/// Lifecycle and credential events produced by one transport connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportEvent {
	/// A new pairing code must be shown to the user.
	PairingArtifact { value: String },
	/// Authentication succeeded.
	Opened { user_id: String },
	Closed { reason: DisconnectReason },
	/// Credential or key material changed and must be persisted.
	CredentialUpdate { batch: CredentialBatch },
	/// A message was added to a chat.
	MessageReceived {
		/// Chat the message belongs to.
		from: String,
		/// Plain or extended text body; empty for media and other non-text messages.
		#[serde(default)]
		text: String,
		/// Sent by this account, possibly from another device.
		#[serde(default)]
		from_me: bool,
		kind: UpsertKind,
	},
}

/// How a message reached the chat.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UpsertKind {
	/// Newly delivered in real time.
	Notify,
	/// Appended from history sync or another device.
	Append,
}

impl TransportEvent {
	/// Text of a message that should be relayed to observers: delivered live,
	/// not sent by this account and carrying text.
	pub fn relayable_text(&self) -> Option<(&str, &str)> {
		match self {
			Self::MessageReceived {
				from,
				text,
				from_me: false,
				kind: UpsertKind::Notify,
			} if !text.is_empty() => Some((from.as_str(), text.as_str())),
			_ => None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn status_codes_map_to_reasons() {
		assert_eq!(DisconnectReason::from_status_code(401), DisconnectReason::LoggedOut);
		assert_eq!(DisconnectReason::from_status_code(515), DisconnectReason::RestartRequired);
		assert_eq!(DisconnectReason::from_status_code(499), DisconnectReason::Unknown(499));
	}

	#[test]
	fn only_live_foreign_text_is_relayable() {
		let message = |text: &str, from_me, kind| TransportEvent::MessageReceived {
			from: "628123@s.whatsapp.net".into(),
			text: text.into(),
			from_me,
			kind,
		};
		assert_eq!(message("hi", false, UpsertKind::Notify).relayable_text(), Some(("628123@s.whatsapp.net", "hi")));
		assert_eq!(message("hi", true, UpsertKind::Notify).relayable_text(), None);
		assert_eq!(message("hi", false, UpsertKind::Append).relayable_text(), None);
		assert_eq!(message("", false, UpsertKind::Notify).relayable_text(), None);
	}

	#[test]
	fn batch_counts_every_entry() {
		let batch = CredentialBatch::new().set("pre-key", "1", b"a".to_vec()).set("pre-key", "2", b"b".to_vec()).delete("session", "x");
		assert_eq!(batch.len(), 3);
		assert_eq!(batch.categories["session"]["x"], None);
	}

	#[test]
	fn closed_event_serializes_reason_tag() {
		let event = TransportEvent::Closed {
			reason: DisconnectReason::LoggedOut,
		};
		let json = serde_json::to_value(&event).unwrap();
		assert_eq!(json["type"], "closed");
		assert_eq!(json["reason"]["reason"], "logged_out");
	}
}
