//! # DevKV Core
//!
//! Device-scoped key-value stores.
//!
//! This crate provides:
//! - A durable store engine: an append-only, checksummed (optionally
//!   encrypted) commit log replayed into an ordered index
//! - Explicit transactions applied atomically on commit
//! - Queries with key prefix, device scope and value predicates, and
//!   closable result set cursors
//! - Change and sync-completion notification with ordered, serialized
//!   delivery per store
//! - Peer synchronization with last-writer-wins merging, sync ranges and
//!   local purge of a device's data
//!
//! ## Usage
//!
//! ```no_run
//! # async fn demo() -> devkv_core::KvResult<()> {
//! use devkv_core::{KvManager, KvManagerConfig, Options, SubscribeType};
//!
//! let manager = KvManager::new(KvManagerConfig::new("com.example.app").data_dir("/tmp/devkv"))?;
//! let store = manager.get_kv_store("settings", Options::default()).await?;
//!
//! store.on_data_change(SubscribeType::Local, |change| {
//!     println!("{} keys changed", change.len());
//! })?;
//!
//! store.start_transaction().await?;
//! store.put_batch([("theme", "dark"), ("lang", "en")]).await?;
//! store.delete("legacy").await?;
//! store.commit().await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod crypto;
mod dir;
mod engine;
mod error;
mod manager;
mod notifier;
mod query;
mod store;
mod transaction;
mod types;
mod validate;

pub use config::{
    KvManagerConfig, KvStoreType, Options, SecurityLevel, MAX_BATCH_SIZE, MAX_KEY_LENGTH,
    MAX_KEY_LENGTH_DEVICE, MAX_STORE_ID_LENGTH, MAX_VALUE_LENGTH,
};
pub use crypto::{CryptoManager, EncryptionKey};
pub use dir::{log_path, is_store_dir, StoreMeta, FORMAT_VERSION};
pub use engine::{scan, ChangeSet, LogBatch, Scan, TailDamage, WriteOp};
pub use error::{KvError, KvResult};
pub use manager::KvManager;
pub use notifier::{
    ChangeNotification, ChangeSource, DataChangeCallback, SubscribeType, SyncCompleteCallback,
    WatcherId,
};
pub use query::{EntryFilter, Predicate, Query, ResultSet};
pub use store::KvStore;
pub use transaction::{PendingOp, TransactionState};
pub use types::{DeviceId, Entry, Key, LogicalTimestamp};

pub use devkv_codec::{TypedValue, ValueType};
pub use devkv_sync_engine::{LoopbackNetwork, SyncState, SyncStats};
pub use devkv_sync_protocol::{SyncMode, SyncRecord, SyncStatus};
