use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "pairkeep")]
#[command(about = "Inspect and maintain pairkeep credential stores")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Config file (defaults to ~/.config/pairkeep/config.json)
	#[arg(long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	/// Store directory, overriding config and PAIRKEEP_STORE_DIR
	#[arg(long, global = true, value_name = "DIR")]
	pub store: Option<PathBuf>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// List sessions with stored credentials
	#[command(alias = "ls")]
	Sessions,

	/// List record keys of a session
	Keys { session: String },

	/// Show one stored record
	Show {
		session: String,
		/// Record category, e.g. pre-key or app-state-sync-key
		category: String,
		/// Entry id; omitted for the creds record
		entry: Option<String>,
	},

	/// Show the root credential record of a session
	Creds { session: String },

	/// Delete every record of a session
	Clear {
		session: String,
		/// Required confirmation
		#[arg(long)]
		yes: bool,
	},

	/// Print the effective configuration
	Config,
}
