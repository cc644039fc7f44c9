//! Directory-backed store: one JSON envelope file per record.
//!
//! Layout under the root directory:
//!
//! ```text
//! <session>/creds.json
//! <session>/<category>/<entry>.json
//! ```
//!
//! Path components are percent-encoded, so ids containing `/`, `:` or `-`
//! never collide or escape the root. Each file holds the exact category and
//! entry next to the base64 payload, which keeps listing lossless.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use pairkeep_protocol::Payload;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

use super::StoreBackend;
use crate::error::{Error, Result};
use crate::key::{Category, RecordKey, SessionId};

const RECORD_EXT: &str = "json";

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// On-disk record format.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
	category: Category,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	entry: Option<String>,
	payload: String,
}

/// File-system implementation of [`StoreBackend`].
#[derive(Debug, Clone)]
pub struct FileBackend {
	root: PathBuf,
}

impl FileBackend {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	fn session_dir(&self, session: &SessionId) -> PathBuf {
		self.root.join(encode_component(session.as_str()))
	}

	fn record_path(&self, key: &RecordKey) -> PathBuf {
		let dir = self.session_dir(&key.session);
		match &key.entry {
			Some(entry) => dir
				.join(encode_component(key.category.as_str()))
				.join(format!("{}.{RECORD_EXT}", encode_component(entry))),
			None => dir.join(format!("{}.{RECORD_EXT}", encode_component(key.category.as_str()))),
		}
	}

	async fn read_envelope(&self, path: &Path, key: &str) -> Result<Option<Envelope>> {
		let bytes = match fs::read(path).await {
			Ok(bytes) => bytes,
			Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
			Err(err) => return Err(Error::unavailable(key, err)),
		};
		serde_json::from_slice(&bytes).map(Some).map_err(|err| Error::corrupt(key, err))
	}

	async fn collect_envelopes(&self, session: &SessionId) -> Result<Vec<RecordKey>> {
		let mut keys = Vec::new();
		let mut pending = vec![self.session_dir(session)];

		while let Some(dir) = pending.pop() {
			let mut entries = match fs::read_dir(&dir).await {
				Ok(entries) => entries,
				Err(err) if err.kind() == ErrorKind::NotFound => continue,
				Err(err) => return Err(Error::unavailable(dir.display(), err)),
			};

			while let Some(entry) = entries.next_entry().await.map_err(|err| Error::unavailable(dir.display(), err))? {
				let path = entry.path();
				let file_type = entry.file_type().await.map_err(|err| Error::unavailable(path.display(), err))?;
				if file_type.is_dir() {
					pending.push(path);
					continue;
				}
				if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXT) {
					continue;
				}
				match self.read_envelope(&path, &path.display().to_string()).await {
					Ok(Some(envelope)) => keys.push(RecordKey {
						session: session.clone(),
						category: envelope.category,
						entry: envelope.entry,
					}),
					Ok(None) => {}
					Err(err) if err.is_corrupt() => {
						debug!(target = "pairkeep.store", path = %path.display(), error = %err, "skipping unreadable record");
					}
					Err(err) => return Err(err),
				}
			}
		}
		Ok(keys)
	}

	/// Whether any record file remains under `dir`. Deleting a record leaves
	/// its directories behind.
	async fn has_records(&self, dir: &Path) -> Result<bool> {
		let mut pending = vec![dir.to_path_buf()];
		while let Some(dir) = pending.pop() {
			let mut entries = match fs::read_dir(&dir).await {
				Ok(entries) => entries,
				Err(err) if err.kind() == ErrorKind::NotFound => continue,
				Err(err) => return Err(Error::unavailable(dir.display(), err)),
			};
			while let Some(entry) = entries.next_entry().await.map_err(|err| Error::unavailable(dir.display(), err))? {
				let path = entry.path();
				if entry.file_type().await.is_ok_and(|ty| ty.is_dir()) {
					pending.push(path);
				} else if path.extension().and_then(|ext| ext.to_str()) == Some(RECORD_EXT) {
					return Ok(true);
				}
			}
		}
		Ok(false)
	}
}

#[async_trait]
impl StoreBackend for FileBackend {
	async fn get(&self, key: &RecordKey) -> Result<Option<Payload>> {
		let Some(envelope) = self.read_envelope(&self.record_path(key), &key.to_string()).await? else {
			return Ok(None);
		};
		STANDARD.decode(envelope.payload).map(Some).map_err(|err| Error::corrupt(key, err))
	}

	async fn put(&self, key: &RecordKey, payload: &[u8]) -> Result<()> {
		let path = self.record_path(key);
		let envelope = Envelope {
			category: key.category.clone(),
			entry: key.entry.clone(),
			payload: STANDARD.encode(payload),
		};
		let bytes = serde_json::to_vec(&envelope)?;

		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent).await.map_err(|err| Error::unavailable(key, err))?;
		}

		// Write-then-rename keeps readers from ever seeing a torn record.
		let tmp = path.with_extension(format!("{RECORD_EXT}.{}.{}.tmp", std::process::id(), TMP_COUNTER.fetch_add(1, Ordering::Relaxed)));
		if let Err(err) = fs::write(&tmp, &bytes).await {
			let _ = fs::remove_file(&tmp).await;
			return Err(Error::unavailable(key, err));
		}
		if let Err(err) = fs::rename(&tmp, &path).await {
			let _ = fs::remove_file(&tmp).await;
			return Err(Error::unavailable(key, err));
		}
		Ok(())
	}

	async fn delete(&self, key: &RecordKey) -> Result<()> {
		match fs::remove_file(self.record_path(key)).await {
			Ok(()) => Ok(()),
			Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
			Err(err) => Err(Error::unavailable(key, err)),
		}
	}

	async fn delete_session(&self, session: &SessionId) -> Result<()> {
		match fs::remove_dir_all(self.session_dir(session)).await {
			Ok(()) => Ok(()),
			Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
			Err(err) => Err(Error::unavailable(session, err)),
		}
	}

	async fn list_keys(&self, session: &SessionId) -> Result<Vec<RecordKey>> {
		self.collect_envelopes(session).await
	}

	async fn list_sessions(&self) -> Result<Vec<SessionId>> {
		let mut entries = match fs::read_dir(&self.root).await {
			Ok(entries) => entries,
			Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
			Err(err) => return Err(Error::unavailable(self.root.display(), err)),
		};

		let mut sessions = Vec::new();
		while let Some(entry) = entries.next_entry().await.map_err(|err| Error::unavailable(self.root.display(), err))? {
			let is_dir = entry.file_type().await.map(|ty| ty.is_dir()).unwrap_or(false);
			if !is_dir || !self.has_records(&entry.path()).await? {
				continue;
			}
			if let Some(name) = entry.file_name().to_str().and_then(decode_component) {
				sessions.push(SessionId::new(name));
			}
		}
		Ok(sessions)
	}
}

/// Percent-encodes one path component. Leading dots are escaped too so that
/// `.` and `..` cannot address anything outside the store.
fn encode_component(raw: &str) -> String {
	let encoded = urlencoding::encode(raw).into_owned();
	match encoded.strip_prefix('.') {
		Some(rest) => format!("%2E{rest}"),
		None if encoded.is_empty() => "%00".to_string(),
		None => encoded,
	}
}

fn decode_component(encoded: &str) -> Option<String> {
	if encoded == "%00" {
		return Some(String::new());
	}
	urlencoding::decode(encoded).ok().map(|decoded| decoded.into_owned())
}

#[cfg(test)]
mod tests {
	use tempfile::TempDir;

	use super::*;

	fn key(session: &str, category: Category, entry: &str) -> RecordKey {
		RecordKey::new(SessionId::new(session), category, entry)
	}

	#[test]
	fn components_are_escaped() {
		assert_eq!(encode_component("a/b:c"), "a%2Fb%3Ac");
		assert_eq!(encode_component(".."), "%2E.");
		assert_eq!(decode_component("%2E."), Some("..".to_string()));
		assert_eq!(decode_component(&encode_component("")), Some(String::new()));
	}

	#[tokio::test]
	async fn records_survive_a_new_backend_instance() {
		let tmp = TempDir::new().unwrap();
		let payload = vec![0u8, 159, 146, 150, 255];
		let k = key("s1", Category::AppStateSyncKey, "AAAAAF+x");

		FileBackend::new(tmp.path()).put(&k, &payload).await.unwrap();
		let reopened = FileBackend::new(tmp.path());
		assert_eq!(reopened.get(&k).await.unwrap(), Some(payload));
	}

	#[tokio::test]
	async fn ids_with_separators_do_not_collide() {
		let tmp = TempDir::new().unwrap();
		let backend = FileBackend::new(tmp.path());
		let a = key("s1", Category::Other("a-b".into()), "c");
		let b = key("s1", Category::Other("a".into()), "b-c");
		backend.put(&a, b"first").await.unwrap();
		backend.put(&b, b"second").await.unwrap();

		assert_eq!(backend.get(&a).await.unwrap().as_deref(), Some(&b"first"[..]));
		assert_eq!(backend.get(&b).await.unwrap().as_deref(), Some(&b"second"[..]));
	}

	#[tokio::test]
	async fn list_keys_recovers_exact_keys() {
		let tmp = TempDir::new().unwrap();
		let backend = FileBackend::new(tmp.path());
		let creds = RecordKey::creds(SessionId::new("s1"));
		let session = key("s1", Category::Session, "628111.0:1");
		backend.put(&creds, b"{}").await.unwrap();
		backend.put(&session, b"x").await.unwrap();

		let mut keys = backend.list_keys(&SessionId::new("s1")).await.unwrap();
		keys.sort();
		assert_eq!(keys, vec![creds, session]);
		assert_eq!(backend.list_sessions().await.unwrap(), vec![SessionId::new("s1")]);
	}

	#[tokio::test]
	async fn delete_session_is_scoped_to_its_namespace() {
		let tmp = TempDir::new().unwrap();
		let backend = FileBackend::new(tmp.path());
		let mine = key("s1", Category::PreKey, "1");
		let neighbour = key("s1-x", Category::PreKey, "1");
		backend.put(&mine, b"a").await.unwrap();
		backend.put(&neighbour, b"b").await.unwrap();

		backend.delete_session(&SessionId::new("s1")).await.unwrap();
		backend.delete_session(&SessionId::new("missing")).await.unwrap();

		assert_eq!(backend.get(&mine).await.unwrap(), None);
		assert!(backend.get(&neighbour).await.unwrap().is_some());
	}

	#[tokio::test]
	async fn sessions_without_records_are_not_listed() {
		let tmp = TempDir::new().unwrap();
		let backend = FileBackend::new(tmp.path());
		let pre_key = key("s1", Category::PreKey, "1");
		let kept = key("s2", Category::Session, "628111.0");
		backend.put(&pre_key, b"a").await.unwrap();
		backend.put(&kept, b"b").await.unwrap();

		backend.delete(&pre_key).await.unwrap();
		assert!(backend.session_dir(&SessionId::new("s1")).exists());
		assert_eq!(backend.list_sessions().await.unwrap(), vec![SessionId::new("s2")]);
		assert!(backend.list_keys(&SessionId::new("s1")).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn garbage_file_is_reported_corrupt() {
		let tmp = TempDir::new().unwrap();
		let backend = FileBackend::new(tmp.path());
		let k = key("s1", Category::PreKey, "1");
		let path = backend.record_path(&k);
		std::fs::create_dir_all(path.parent().unwrap()).unwrap();
		std::fs::write(&path, b"not an envelope").unwrap();

		assert!(backend.get(&k).await.unwrap_err().is_corrupt());
		assert!(backend.list_keys(&SessionId::new("s1")).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn deleting_absent_record_is_ok() {
		let tmp = TempDir::new().unwrap();
		let backend = FileBackend::new(tmp.path());
		backend.delete(&key("s1", Category::PreKey, "404")).await.unwrap();
	}
}
