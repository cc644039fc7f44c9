//! In-memory store with fault injection, used by tests and ephemeral sessions.

use std::collections::{BTreeMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use pairkeep_protocol::Payload;
use parking_lot::Mutex;

use super::StoreBackend;
use crate::error::{Error, Result};
use crate::key::{RecordKey, SessionId};

#[derive(Debug, Default)]
pub struct MemoryBackend {
	records: Mutex<BTreeMap<RecordKey, Payload>>,
	failing_writes: Mutex<HashSet<RecordKey>>,
	unavailable: AtomicBool,
	writes: AtomicUsize,
}

impl MemoryBackend {
	pub fn new() -> Self {
		Self::default()
	}

	/// Makes every subsequent `put`/`delete` of `key` fail as unavailable.
	pub fn fail_writes_for(&self, key: RecordKey) {
		self.failing_writes.lock().insert(key);
	}

	/// Makes every operation fail as unavailable while set.
	pub fn set_unavailable(&self, unavailable: bool) {
		self.unavailable.store(unavailable, Ordering::SeqCst);
	}

	/// Number of successful `put`/`delete` calls so far.
	pub fn write_count(&self) -> usize {
		self.writes.load(Ordering::SeqCst)
	}

	pub fn len(&self) -> usize {
		self.records.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.records.lock().is_empty()
	}

	fn check_available(&self, key: impl ToString) -> Result<()> {
		if self.unavailable.load(Ordering::SeqCst) {
			return Err(Error::unavailable(key, io::Error::new(io::ErrorKind::ConnectionRefused, "backend offline")));
		}
		Ok(())
	}

	fn check_writable(&self, key: &RecordKey) -> Result<()> {
		self.check_available(key)?;
		if self.failing_writes.lock().contains(key) {
			return Err(Error::unavailable(key, io::Error::other("injected write failure")));
		}
		Ok(())
	}
}

#[async_trait]
impl StoreBackend for MemoryBackend {
	async fn get(&self, key: &RecordKey) -> Result<Option<Payload>> {
		self.check_available(key)?;
		Ok(self.records.lock().get(key).cloned())
	}

	async fn put(&self, key: &RecordKey, payload: &[u8]) -> Result<()> {
		self.check_writable(key)?;
		self.records.lock().insert(key.clone(), payload.to_vec());
		self.writes.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}

	async fn delete(&self, key: &RecordKey) -> Result<()> {
		self.check_writable(key)?;
		self.records.lock().remove(key);
		self.writes.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}

	async fn delete_session(&self, session: &SessionId) -> Result<()> {
		self.check_available(session)?;
		self.records.lock().retain(|key, _| &key.session != session);
		Ok(())
	}

	async fn list_keys(&self, session: &SessionId) -> Result<Vec<RecordKey>> {
		self.check_available(session)?;
		Ok(self.records.lock().keys().filter(|key| &key.session == session).cloned().collect())
	}

	async fn list_sessions(&self) -> Result<Vec<SessionId>> {
		self.check_available("sessions")?;
		let mut sessions: Vec<SessionId> = self.records.lock().keys().map(|key| key.session.clone()).collect();
		sessions.dedup();
		Ok(sessions)
	}
}
