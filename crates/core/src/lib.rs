//! Durable pairing credentials and a reconnecting session lifecycle.
//!
//! The crate has two halves:
//!
//! * [`CredentialStore`] persists the long-lived key material of paired
//!   sessions behind a pluggable [`StoreBackend`] (on-disk JSON files or
//!   memory).
//! * [`SessionRegistry`] runs one [`SessionController`] per session. Each
//!   controller drives a [`Transport`] connection, persists credential
//!   updates, publishes pairing artifacts and status through the
//!   [`NotificationHub`] and applies the [`ReconnectPolicy`] after every
//!   disconnect.

pub mod cache;
pub mod config;
pub mod controller;
pub mod error;
pub mod key;
pub mod notify;
pub mod policy;
pub mod registry;
pub mod store;
pub mod transport;

pub use cache::{CachedState, PairingCache};
pub use config::{BackoffConfig, SessionConfig};
pub use controller::{ControllerHandle, ControllerOptions, ControllerState, LogoutOutcome, SessionController};
pub use error::{Error, Result};
pub use key::{Category, RecordKey, SessionId};
pub use notify::{FaultKind, NotificationHub, SessionFault, Subscription};
pub use policy::{Backoff, ReconnectAction, ReconnectPolicy};
pub use registry::SessionRegistry;
pub use store::{CredentialStore, FileBackend, MemoryBackend, StoreBackend};
pub use transport::{Transport, TransportHandle, TransportParts};
