//! Root credential record.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Root credential set loaded before every connection attempt.
///
/// Only the fields the session core reasons about are typed; everything else
/// the transport keeps here (key pairs, registration ids, sync state) is carried
/// through `extra` unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CoreCredentials {
	/// Whether pairing has completed for this credential set.
	#[serde(default)]
	pub registered: bool,
	/// Full user id of the paired account.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub me: Option<String>,
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

impl CoreCredentials {
	/// Fresh, unpaired credential set. The transport provisions key material on
	/// first connect and reports it back as a credential update.
	pub fn initial() -> Self {
		Self::default()
	}

	pub fn is_paired(&self) -> bool {
		self.registered && self.me.is_some()
	}

	pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
		serde_json::to_vec(self)
	}

	pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
		serde_json::from_slice(bytes)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn unknown_fields_survive_round_trip() {
		let raw = br#"{"registered":true,"me":"628111:3@s.whatsapp.net","noiseKey":{"public":"AAE="}}"#;
		let creds = CoreCredentials::from_bytes(raw).unwrap();
		assert!(creds.is_paired());
		let again = CoreCredentials::from_bytes(&creds.to_bytes().unwrap()).unwrap();
		assert_eq!(again.extra["noiseKey"]["public"], "AAE=");
	}

	#[test]
	fn initial_credentials_are_unpaired() {
		let creds = CoreCredentials::initial();
		assert!(!creds.is_paired());
		assert_eq!(creds, CoreCredentials::default());
	}
}
