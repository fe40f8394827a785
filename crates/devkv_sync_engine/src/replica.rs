//! The store side of synchronization.

use crate::error::SyncResult;
use devkv_sync_protocol::{DeviceId, PushResponse, SyncRange, SyncRecord};

/// A store replica that can take part in sync.
///
/// Methods may block on storage I/O; the engine and responders call them
/// from blocking-friendly contexts.
pub trait ReplicaStore: Send + Sync {
    /// Identifier shared by every replica of this store.
    fn store_id(&self) -> &str;

    /// Device this replica lives on.
    fn local_device(&self) -> &DeviceId;

    /// Labels this replica exchanges, or `None` to exchange everything.
    fn sync_range(&self) -> Option<SyncRange>;

    /// Latest versions (values and tombstones) authored by `author`,
    /// restricted to `labels` when given.
    ///
    /// # Errors
    ///
    /// Fails if the replica is closed.
    fn authored_records(
        &self,
        author: &DeviceId,
        labels: Option<&[String]>,
    ) -> SyncResult<Vec<SyncRecord>>;

    /// Merges records received from `from`, keeping the newest version of
    /// every key.
    ///
    /// # Errors
    ///
    /// Fails if the replica is closed or the merge cannot be persisted; in
    /// that case nothing is merged.
    fn merge_records(&self, from: &DeviceId, records: Vec<SyncRecord>) -> SyncResult<PushResponse>;

    /// Called after a successful exchange with `peer`.
    fn peer_seen(&self, _peer: &DeviceId) {}
}
