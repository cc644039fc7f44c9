//! Durable, namespaced credential storage.
//!
//! [`CredentialStore`] is the only component touching durable storage. It sits
//! on top of a [`StoreBackend`] and adds the batch, namespacing and decoding
//! rules the session controller relies on:
//!
//! - absence is never an error; loads return `None`
//! - batch writes run concurrently and report every failed key at once
//! - a corrupt root credential record is fatal, any other corrupt record is
//!   treated as absent

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{join_all, try_join_all};
use pairkeep_protocol::{CoreCredentials, CredentialBatch, Payload};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::error::{Error, FailedKey, Result};
use crate::key::{Category, RecordKey, SessionId};

mod file;
mod memory;

pub use file::FileBackend;
pub use memory::MemoryBackend;

/// Raw persistence primitive. Implementations must make `put` and `delete`
/// atomic per key; no cross-key transaction is expected.
#[async_trait]
pub trait StoreBackend: Send + Sync + 'static {
	async fn get(&self, key: &RecordKey) -> Result<Option<Payload>>;

	/// Upserts `payload` under `key`.
	async fn put(&self, key: &RecordKey, payload: &[u8]) -> Result<()>;

	/// Deletes `key`. Deleting an absent key succeeds.
	async fn delete(&self, key: &RecordKey) -> Result<()>;

	/// Deletes every record of `session` and nothing else.
	async fn delete_session(&self, session: &SessionId) -> Result<()>;

	async fn list_keys(&self, session: &SessionId) -> Result<Vec<RecordKey>>;

	async fn list_sessions(&self) -> Result<Vec<SessionId>>;
}

/// Credential store shared by every session controller.
#[derive(Clone)]
pub struct CredentialStore {
	backend: Arc<dyn StoreBackend>,
}

impl std::fmt::Debug for CredentialStore {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CredentialStore").finish_non_exhaustive()
	}
}

impl CredentialStore {
	pub fn new(backend: impl StoreBackend) -> Self {
		Self { backend: Arc::new(backend) }
	}

	pub fn from_arc(backend: Arc<dyn StoreBackend>) -> Self {
		Self { backend }
	}

	/// Loads one record. Corrupt records outside the `creds` category read as absent.
	pub async fn load(&self, session: &SessionId, category: &Category, entry: &str) -> Result<Option<Payload>> {
		let key = RecordKey::new(session.clone(), category.clone(), entry);
		self.load_key(&key).await
	}

	async fn load_key(&self, key: &RecordKey) -> Result<Option<Payload>> {
		match self.backend.get(key).await {
			Err(err) if err.is_corrupt() && key.category != Category::Creds => {
				warn!(target = "pairkeep.store", %key, error = %err, "ignoring corrupt record");
				Ok(None)
			}
			other => other,
		}
	}

	/// Loads several entries of one category concurrently.
	///
	/// Every requested id appears in the result; absent ids map to `None`.
	pub async fn load_many<I, S>(&self, session: &SessionId, category: &Category, ids: I) -> Result<BTreeMap<String, Option<Payload>>>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let reads = ids.into_iter().map(Into::into).map(|id: String| async move {
			let key = RecordKey::new(session.clone(), category.clone(), id.as_str());
			let payload = self.load_key(&key).await?;
			Ok::<_, Error>((id, payload))
		});
		Ok(try_join_all(reads).await?.into_iter().collect())
	}

	pub async fn save(&self, session: &SessionId, category: &Category, entry: &str, payload: &[u8]) -> Result<()> {
		let key = RecordKey::new(session.clone(), category.clone(), entry);
		self.backend.put(&key, payload).await
	}

	pub async fn remove(&self, session: &SessionId, category: &Category, entry: &str) -> Result<()> {
		let key = RecordKey::new(session.clone(), category.clone(), entry);
		self.backend.delete(&key).await
	}

	/// Applies a credential batch: `Some` upserts, `None` deletes.
	///
	/// All writes are issued concurrently and awaited together. Failures are
	/// collected into [`Error::BatchFailed`]; successful writes are not rolled back.
	pub async fn apply_batch(&self, session: &SessionId, batch: &CredentialBatch) -> Result<()> {
		let writes = batch.categories.iter().flat_map(move |(category, entries)| {
			let category = Category::from(category.as_str());
			entries.iter().map(move |(entry, payload)| {
				let key = RecordKey::new(session.clone(), category.clone(), entry.as_str());
				async move {
					let result = match payload {
						Some(payload) => self.backend.put(&key, payload).await,
						None => self.backend.delete(&key).await,
					};
					result.map_err(|err| FailedKey {
						key: key.to_string(),
						reason: err.to_string(),
					})
				}
			})
		});

		let failed: Vec<FailedKey> = join_all(writes).await.into_iter().filter_map(|result| result.err()).collect();
		if failed.is_empty() {
			debug!(target = "pairkeep.store", %session, writes = batch.len(), "applied credential batch");
			Ok(())
		} else {
			warn!(target = "pairkeep.store", %session, failed = failed.len(), writes = batch.len(), "credential batch partially failed");
			Err(Error::BatchFailed { failed })
		}
	}

	/// Deletes every record of `session`. Used once, at permanent logout.
	pub async fn clear_session(&self, session: &SessionId) -> Result<()> {
		self.backend.delete_session(session).await?;
		info!(target = "pairkeep.store", %session, "cleared session credentials");
		Ok(())
	}

	/// Loads the root credential record, synthesizing a fresh set when absent.
	///
	/// A root record that fails to decode is fatal: the session cannot proceed
	/// with credentials it cannot read.
	pub async fn load_credentials(&self, session: &SessionId) -> Result<CoreCredentials> {
		let key = RecordKey::creds(session.clone());
		match self.backend.get(&key).await? {
			Some(bytes) => CoreCredentials::from_bytes(&bytes).map_err(|err| Error::corrupt(&key, err)),
			None => {
				debug!(target = "pairkeep.store", %session, "no stored credentials; starting fresh");
				Ok(CoreCredentials::initial())
			}
		}
	}

	pub async fn save_credentials(&self, session: &SessionId, creds: &CoreCredentials) -> Result<()> {
		let key = RecordKey::creds(session.clone());
		self.backend.put(&key, &creds.to_bytes()?).await
	}

	/// Loads and decodes a JSON record, treating undecodable payloads as absent.
	pub async fn load_decoded<T: DeserializeOwned>(&self, session: &SessionId, category: &Category, entry: &str) -> Result<Option<T>> {
		let key = RecordKey::new(session.clone(), category.clone(), entry);
		let Some(bytes) = self.load_key(&key).await? else {
			return Ok(None);
		};
		match serde_json::from_slice(&bytes) {
			Ok(value) => Ok(Some(value)),
			Err(err) => {
				warn!(target = "pairkeep.store", %key, error = %err, "record does not decode; treating as absent");
				Ok(None)
			}
		}
	}

	pub async fn list_keys(&self, session: &SessionId) -> Result<Vec<RecordKey>> {
		let mut keys = self.backend.list_keys(session).await?;
		keys.sort();
		Ok(keys)
	}

	pub async fn list_sessions(&self) -> Result<Vec<SessionId>> {
		let mut sessions = self.backend.list_sessions().await?;
		sessions.sort();
		Ok(sessions)
	}
}

#[cfg(test)]
mod tests {
	use serde::Deserialize;

	use super::*;

	fn store() -> (CredentialStore, Arc<MemoryBackend>) {
		let backend = Arc::new(MemoryBackend::new());
		(CredentialStore::from_arc(backend.clone()), backend)
	}

	fn s1() -> SessionId {
		SessionId::new("s1")
	}

	#[tokio::test]
	async fn last_write_wins() {
		let (store, _) = store();
		store.save(&s1(), &Category::PreKey, "1", b"first").await.unwrap();
		store.save(&s1(), &Category::PreKey, "1", b"second").await.unwrap();
		assert_eq!(store.load(&s1(), &Category::PreKey, "1").await.unwrap().as_deref(), Some(&b"second"[..]));

		store.remove(&s1(), &Category::PreKey, "1").await.unwrap();
		assert_eq!(store.load(&s1(), &Category::PreKey, "1").await.unwrap(), None);
		store.remove(&s1(), &Category::PreKey, "1").await.unwrap();
	}

	#[tokio::test]
	async fn batch_payloads_round_trip_byte_exact() {
		let (store, _) = store();
		let payload: Vec<u8> = (0..=255).collect();
		let batch = CredentialBatch::new().set("session", "x", payload.clone());
		store.apply_batch(&s1(), &batch).await.unwrap();
		assert_eq!(store.load(&s1(), &Category::Session, "x").await.unwrap(), Some(payload));
	}

	#[tokio::test]
	async fn batch_null_deletes_entry() {
		let (store, _) = store();
		store.save(&s1(), &Category::SenderKey, "g1", b"k").await.unwrap();
		store.apply_batch(&s1(), &CredentialBatch::new().delete("sender-key", "g1")).await.unwrap();
		assert_eq!(store.load(&s1(), &Category::SenderKey, "g1").await.unwrap(), None);
	}

	#[tokio::test]
	async fn batch_failure_names_keys_and_keeps_successes() {
		let (store, backend) = store();
		backend.fail_writes_for(RecordKey::new(s1(), Category::PreKey, "2"));
		let batch = CredentialBatch::new().set("pre-key", "1", b"a".to_vec()).set("pre-key", "2", b"b".to_vec());

		let err = store.apply_batch(&s1(), &batch).await.unwrap_err();
		match err {
			Error::BatchFailed { failed } => {
				assert_eq!(failed.len(), 1);
				assert_eq!(failed[0].key, "s1-pre-key-2");
			}
			other => panic!("expected BatchFailed, got {other:?}"),
		}
		assert_eq!(store.load(&s1(), &Category::PreKey, "1").await.unwrap().as_deref(), Some(&b"a"[..]));
	}

	#[tokio::test]
	async fn load_many_reports_absent_ids() {
		let (store, _) = store();
		store.save(&s1(), &Category::PreKey, "1", b"one").await.unwrap();
		let loaded = store.load_many(&s1(), &Category::PreKey, ["1", "2"]).await.unwrap();
		assert_eq!(loaded.len(), 2);
		assert_eq!(loaded["1"].as_deref(), Some(&b"one"[..]));
		assert_eq!(loaded["2"], None);
	}

	#[tokio::test]
	async fn unavailable_backend_surfaces_error() {
		let (store, backend) = store();
		backend.set_unavailable(true);
		let err = store.load(&s1(), &Category::PreKey, "1").await.unwrap_err();
		assert!(matches!(err, Error::StorageUnavailable { .. }));
		assert!(err.is_retryable());
	}

	#[tokio::test]
	async fn clear_session_leaves_other_sessions() {
		let (store, _) = store();
		let other = SessionId::new("s1-x");
		store.save(&s1(), &Category::PreKey, "1", b"a").await.unwrap();
		store.save_credentials(&s1(), &CoreCredentials::initial()).await.unwrap();
		store.save(&other, &Category::PreKey, "1", b"b").await.unwrap();

		store.clear_session(&s1()).await.unwrap();

		assert_eq!(store.load(&s1(), &Category::PreKey, "1").await.unwrap(), None);
		assert_eq!(store.load(&s1(), &Category::Creds, "").await.unwrap(), None);
		assert!(store.load(&other, &Category::PreKey, "1").await.unwrap().is_some());
	}

	#[tokio::test]
	async fn missing_credentials_are_synthesized() {
		let (store, _) = store();
		let creds = store.load_credentials(&s1()).await.unwrap();
		assert_eq!(creds, CoreCredentials::initial());
	}

	#[tokio::test]
	async fn corrupt_root_credentials_are_fatal() {
		let (store, _) = store();
		store.save(&s1(), &Category::Creds, "", b"{not json").await.unwrap();
		let err = store.load_credentials(&s1()).await.unwrap_err();
		assert!(err.is_corrupt());
	}

	#[tokio::test]
	async fn undecodable_records_read_as_absent() {
		#[derive(Debug, Deserialize)]
		struct Version {
			#[allow(dead_code)]
			version: u32,
		}

		let (store, _) = store();
		store.save(&s1(), &Category::AppStateSyncVersion, "regular", b"garbage").await.unwrap();
		let decoded: Option<Version> = store.load_decoded(&s1(), &Category::AppStateSyncVersion, "regular").await.unwrap();
		assert!(decoded.is_none());
	}
}
