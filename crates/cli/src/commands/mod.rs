mod store;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use pairkeep::{CredentialStore, FileBackend, SessionConfig};
use tracing::debug;

use crate::cli::{Cli, Commands};
use crate::output;

pub async fn dispatch(cli: Cli) -> Result<()> {
	let config = load_config(cli.config.as_deref(), cli.store)?;
	let store = || {
		debug!(target = "pairkeep.cli", root = %config.store_dir.display(), "opening credential store");
		CredentialStore::new(FileBackend::new(&config.store_dir))
	};

	match cli.command {
		Commands::Sessions => store::sessions(&store()).await,
		Commands::Keys { session } => store::keys(&store(), &session).await,
		Commands::Show { session, category, entry } => store::show(&store(), &session, &category, entry.as_deref()).await,
		Commands::Creds { session } => store::creds(&store(), &session).await,
		Commands::Clear { session, yes } => store::clear(&store(), &session, yes).await,
		Commands::Config => output::print_json(&config),
	}
}

/// Resolves config: file (or defaults), then `PAIRKEEP_STORE_DIR`, then `--store`.
fn load_config(path: Option<&Path>, store_dir: Option<PathBuf>) -> Result<SessionConfig> {
	let mut config = match path {
		Some(path) => SessionConfig::load(path).with_context(|| format!("failed to load config from {}", path.display()))?,
		None => SessionConfig::load_default().context("failed to load default config")?,
	};
	if let Some(dir) = store_dir {
		config.store_dir = dir;
	}
	Ok(config)
}
