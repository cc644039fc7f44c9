//! Session status and observer notifications.

use serde::{Deserialize, Serialize};

/// Externally visible state of one session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SessionStatus {
	#[default]
	Disconnected,
	PairingRequired,
	Connected,
}

impl std::fmt::Display for SessionStatus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let name = match self {
			Self::Disconnected => "disconnected",
			Self::PairingRequired => "pairing-required",
			Self::Connected => "connected",
		};
		f.write_str(name)
	}
}

/// Event delivered to observers through the notification port.
///
/// Serialized with an `event` tag so a front end can forward it verbatim:
///
/// ```json
/// { "event": "status-changed", "status": "Connected", "user": "628111" }
/// { "event": "pairing-artifact", "value": "2@AbC..." }
/// { "event": "new-message", "from": "628123@s.whatsapp.net", "message": "hi" }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum Notification {
	StatusChanged {
		status: SessionStatus,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		user: Option<String>,
	},
	PairingArtifact {
		value: String,
	},
	/// Incoming text message relayed to observers. Never cached.
	NewMessage {
		from: String,
		message: String,
	},
}

impl Notification {
	pub fn status(status: SessionStatus, user: Option<String>) -> Self {
		Self::StatusChanged { status, user }
	}

	pub fn pairing(value: impl Into<String>) -> Self {
		Self::PairingArtifact { value: value.into() }
	}

	pub fn message(from: impl Into<String>, message: impl Into<String>) -> Self {
		Self::NewMessage {
			from: from.into(),
			message: message.into(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn status_notification_omits_missing_user() {
		let json = serde_json::to_value(Notification::status(SessionStatus::Disconnected, None)).unwrap();
		assert_eq!(json["event"], "status-changed");
		assert_eq!(json["status"], "Disconnected");
		assert!(json.get("user").is_none());
	}

	#[test]
	fn pairing_notification_carries_value() {
		let json = serde_json::to_value(Notification::pairing("QR123")).unwrap();
		assert_eq!(json["event"], "pairing-artifact");
		assert_eq!(json["value"], "QR123");
	}

	#[test]
	fn message_notification_names_sender() {
		let json = serde_json::to_value(Notification::message("628123@s.whatsapp.net", "hi")).unwrap();
		assert_eq!(json["event"], "new-message");
		assert_eq!(json["from"], "628123@s.whatsapp.net");
		assert_eq!(json["message"], "hi");
	}
}
