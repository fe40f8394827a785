//! # DevKV Sync Protocol
//!
//! Types shared by every device taking part in synchronization:
//!
//! - [`DeviceId`] and the [`LamportClock`] that orders writes across devices
//! - [`SyncRecord`], one versioned key (value or tombstone) on the wire
//! - [`SyncMode`] and the per-device [`SyncStatus`] codes
//! - Protocol messages ([`PushRequest`], [`PullRequest`] and their responses)
//! - Last-writer-wins resolution ([`resolve`])
//! - Sync ranges ([`SyncRange`]) and key partition labels
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod conflict;
mod device;
mod error;
mod fields;
mod messages;
mod mode;
mod range;
mod record;

pub use conflict::{resolve, Resolution, Version};
pub use device::{DeviceId, LamportClock, LogicalTimestamp, MAX_DEVICE_ID_LENGTH};
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{ErrorResponse, PullRequest, PullResponse, PushRequest, PushResponse, SyncMessage};
pub use mode::{SyncMode, SyncStatus};
pub use range::{partition_label, SyncRange, LABEL_SEPARATOR};
pub use record::SyncRecord;
