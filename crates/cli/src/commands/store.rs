//! Read-only inspection and maintenance of a credential store.

use anyhow::{Result, bail};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use pairkeep::{Category, CredentialStore, Error, SessionId};
use serde_json::{Value, json};
use tracing::info;

use crate::output::print_json;

pub async fn sessions(store: &CredentialStore) -> Result<()> {
	let sessions = store.list_sessions().await?;
	print_json(&sessions)
}

pub async fn keys(store: &CredentialStore, session: &str) -> Result<()> {
	let session = SessionId::new(session);
	let keys = store.list_keys(&session).await?;
	if keys.is_empty() {
		return Err(Error::UnknownSession(session.to_string()).into());
	}
	let keys: Vec<Value> = keys
		.into_iter()
		.map(|key| {
			json!({
				"key": key.to_string(),
				"category": key.category.as_str(),
				"entry": key.entry,
			})
		})
		.collect();
	print_json(&json!({ "session": session, "keys": keys }))
}

pub async fn show(store: &CredentialStore, session: &str, category: &str, entry: Option<&str>) -> Result<()> {
	let session = SessionId::new(session);
	let category = Category::from(category);
	let Some(payload) = store.load(&session, &category, entry.unwrap_or_default()).await? else {
		bail!("no record {category}/{} in session {session}", entry.unwrap_or("-"));
	};

	print_json(&json!({
		"session": session,
		"category": category.as_str(),
		"entry": entry,
		"size": payload.len(),
		"payload": STANDARD.encode(&payload),
	}))
}

pub async fn creds(store: &CredentialStore, session: &str) -> Result<()> {
	let session = SessionId::new(session);
	let credentials = store.load_credentials(&session).await?;
	print_json(&json!({
		"session": session,
		"paired": credentials.is_paired(),
		"credentials": credentials,
	}))
}

pub async fn clear(store: &CredentialStore, session: &str, confirmed: bool) -> Result<()> {
	if !confirmed {
		bail!("refusing to clear session {session} without --yes");
	}
	let session = SessionId::new(session);
	store.clear_session(&session).await?;
	info!(target = "pairkeep.cli", %session, "session cleared");
	print_json(&json!({ "cleared": session }))
}
