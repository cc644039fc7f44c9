//! Typed record keys for the credential store.
//!
//! Every persisted record is addressed by `(session, category, entry)`. The
//! composite string form (`s1-creds`, `s1-pre-key-5`) is only a rendering used
//! for logs and error messages; backends work on the typed key so that ids
//! containing separators can never collide.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifier of one logical session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for SessionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for SessionId {
	fn from(id: &str) -> Self {
		Self::new(id)
	}
}

impl From<String> for SessionId {
	fn from(id: String) -> Self {
		Self(id)
	}
}

/// Record category. Opaque to the store beyond namespacing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
	/// Root credential record; has no entry id.
	Creds,
	PreKey,
	Session,
	SenderKey,
	SenderKeyMemory,
	AppStateSyncKey,
	AppStateSyncVersion,
	SignedPreKey,
	Other(String),
}

impl Category {
	pub fn as_str(&self) -> &str {
		match self {
			Self::Creds => "creds",
			Self::PreKey => "pre-key",
			Self::Session => "session",
			Self::SenderKey => "sender-key",
			Self::SenderKeyMemory => "sender-key-memory",
			Self::AppStateSyncKey => "app-state-sync-key",
			Self::AppStateSyncVersion => "app-state-sync-version",
			Self::SignedPreKey => "signed-pre-key",
			Self::Other(name) => name,
		}
	}
}

impl From<&str> for Category {
	fn from(s: &str) -> Self {
		match s {
			"creds" => Self::Creds,
			"pre-key" => Self::PreKey,
			"session" => Self::Session,
			"sender-key" => Self::SenderKey,
			"sender-key-memory" => Self::SenderKeyMemory,
			"app-state-sync-key" => Self::AppStateSyncKey,
			"app-state-sync-version" => Self::AppStateSyncVersion,
			"signed-pre-key" => Self::SignedPreKey,
			other => Self::Other(other.to_string()),
		}
	}
}

impl FromStr for Category {
	type Err = std::convert::Infallible;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(Self::from(s))
	}
}

impl fmt::Display for Category {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl Serialize for Category {
	fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(self.as_str())
	}
}

impl<'de> Deserialize<'de> for Category {
	fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let raw = String::deserialize(deserializer)?;
		Ok(Category::from(raw.as_str()))
	}
}

/// Fully qualified address of one stored record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
	pub session: SessionId,
	pub category: Category,
	/// Entry id within the category. Always `None` for [`Category::Creds`].
	pub entry: Option<String>,
}

impl RecordKey {
	pub fn new(session: SessionId, category: Category, entry: impl Into<String>) -> Self {
		if category == Category::Creds {
			return Self::creds(session);
		}
		let entry = entry.into();
		Self {
			session,
			category,
			entry: (!entry.is_empty()).then_some(entry),
		}
	}

	pub fn creds(session: SessionId) -> Self {
		Self {
			session,
			category: Category::Creds,
			entry: None,
		}
	}

	/// Record name within its session: `creds`, `pre-key-5`.
	pub fn local_name(&self) -> String {
		match &self.entry {
			Some(entry) => format!("{}-{}", self.category, entry),
			None => self.category.to_string(),
		}
	}
}

impl fmt::Display for RecordKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}-{}", self.session, self.local_name())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn creds_key_has_no_entry() {
		let key = RecordKey::new("s1".into(), Category::Creds, "ignored");
		assert_eq!(key.entry, None);
		assert_eq!(key.to_string(), "s1-creds");
	}

	#[test]
	fn composite_key_joins_with_dashes() {
		let key = RecordKey::new("s1".into(), Category::SignedPreKey, "5");
		assert_eq!(key.to_string(), "s1-signed-pre-key-5");
	}

	#[test]
	fn category_names_round_trip() {
		for name in ["creds", "pre-key", "session", "sender-key", "app-state-sync-key", "signed-pre-key", "custom-bucket"] {
			let category = Category::from(name);
			assert_eq!(category.as_str(), name);
		}
		assert_eq!(Category::from("custom-bucket"), Category::Other("custom-bucket".into()));
	}

	#[test]
	fn keys_with_separators_stay_distinct() {
		let a = RecordKey::new("s1".into(), Category::Session, "x-1");
		let b = RecordKey::new("s1-session-x".into(), Category::Other("1".into()), "");
		assert_ne!(a, b);
	}
}
