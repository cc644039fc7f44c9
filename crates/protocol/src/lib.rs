//! Data types exchanged between the session core and its collaborators.
//!
//! This crate contains the serde-serializable shapes that cross the boundary
//! between `pairkeep` and the outside world: events emitted by the transport,
//! notifications emitted towards observers, and the root credential record.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! * Pure data: No behavior beyond serialization and small pure helpers
//! * Transport-agnostic: The wire protocol itself lives in the transport
//! * Stable: Changes only when the collaborator contracts change

pub mod account;
pub mod creds;
pub mod event;
pub mod status;

pub use account::*;
pub use creds::*;
pub use event::*;
pub use status::*;
