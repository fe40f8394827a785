//! # DevKV Sync Engine
//!
//! Reconciles a store replica with named peer devices.
//!
//! - [`SyncEngine`] runs one cycle at a time through the
//!   `Idle → Syncing → Completed | Failed` state machine, bounding every
//!   peer exchange by a timeout and reporting a [`SyncStatus`] per device.
//! - [`ReplicaStore`] is implemented by the store: it hands out the records a
//!   device authored and merges incoming records last-writer-wins.
//! - [`SyncTransport`] moves encoded frames between devices. The crate ships
//!   [`LoopbackNetwork`] for devices living in one process and
//!   [`MockTransport`] for scripted tests.
//! - [`respond`] answers an incoming frame on behalf of a replica.
//!
//! [`SyncStatus`]: devkv_sync_protocol::SyncStatus

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod loopback;
mod replica;
mod responder;
mod state;
mod transport;

pub use config::SyncConfig;
pub use error::{SyncError, SyncResult};
pub use loopback::{LoopbackNetwork, LoopbackTransport};
pub use replica::ReplicaStore;
pub use responder::respond;
pub use state::{SyncEngine, SyncReport, SyncState, SyncStats};
pub use transport::{MockReply, MockTransport, SyncTransport};
