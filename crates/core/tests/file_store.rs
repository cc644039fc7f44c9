use pairkeep::{Category, CredentialStore, FileBackend, SessionId};
use pairkeep_protocol::{CoreCredentials, CredentialBatch};
use tempfile::TempDir;

fn open(dir: &TempDir) -> CredentialStore {
	CredentialStore::new(FileBackend::new(dir.path()))
}

#[tokio::test]
async fn records_survive_reopening_the_store() {
	let dir = TempDir::new().unwrap();
	let s1 = SessionId::new("s1");
	let creds = CoreCredentials {
		registered: true,
		me: Some("628111@s.whatsapp.net".into()),
		..CoreCredentials::default()
	};

	{
		let store = open(&dir);
		store.save_credentials(&s1, &creds).await.unwrap();
		let batch = CredentialBatch::new()
			.set("pre-key", "1", vec![1u8, 2, 3])
			.set("app-state-sync-key", "AAAAAEx3", b"{\"keyData\":\"x\"}".to_vec());
		store.apply_batch(&s1, &batch).await.unwrap();
	}

	let store = open(&dir);
	assert_eq!(store.load_credentials(&s1).await.unwrap(), creds);
	assert_eq!(store.load(&s1, &Category::PreKey, "1").await.unwrap(), Some(vec![1, 2, 3]));
	let loaded = store
		.load_many(&s1, &Category::AppStateSyncKey, ["AAAAAEx3", "missing"])
		.await
		.unwrap();
	assert!(loaded["AAAAAEx3"].is_some());
	assert_eq!(loaded["missing"], None);
}

#[tokio::test]
async fn awkward_identifiers_stay_inside_their_namespace() {
	let dir = TempDir::new().unwrap();
	let store = open(&dir);
	let sneaky = SessionId::new("../s1");
	let plain = SessionId::new("s1");

	store.save(&sneaky, &Category::Session, "a/b:c", b"x").await.unwrap();
	store.save(&plain, &Category::Session, "a/b:c", b"y").await.unwrap();

	assert_eq!(store.load(&sneaky, &Category::Session, "a/b:c").await.unwrap(), Some(b"x".to_vec()));
	assert_eq!(store.list_sessions().await.unwrap(), vec![sneaky.clone(), plain.clone()]);

	store.clear_session(&sneaky).await.unwrap();
	assert_eq!(store.load(&plain, &Category::Session, "a/b:c").await.unwrap(), Some(b"y".to_vec()));
	assert!(std::fs::read_dir(dir.path()).unwrap().count() == 1);
}

#[tokio::test]
async fn null_entries_in_a_batch_delete_records() {
	let dir = TempDir::new().unwrap();
	let store = open(&dir);
	let s1 = SessionId::new("s1");

	store.apply_batch(&s1, &CredentialBatch::new().set("sender-key", "g1", vec![9u8])).await.unwrap();
	store.apply_batch(&s1, &CredentialBatch::new().delete("sender-key", "g1")).await.unwrap();
	store.apply_batch(&s1, &CredentialBatch::new().delete("sender-key", "never-written")).await.unwrap();

	assert_eq!(store.load(&s1, &Category::SenderKey, "g1").await.unwrap(), None);
	assert!(store.list_keys(&s1).await.unwrap().is_empty());
}
