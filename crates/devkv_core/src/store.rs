//! The async store handle.

use crate::config::{KvStoreType, Options, SecurityLevel};
use crate::crypto::CryptoManager;
use crate::dir::StoreDir;
use crate::engine::{ChangeSet, CommitLog, StoreEngine, WriteOp};
use crate::error::{KvError, KvResult};
use crate::notifier::{
    ChangeNotification, ChangeNotifier, ChangeSource, SubscribeType, WatcherId,
};
use crate::query::{Query, ResultSet};
use crate::transaction::{PendingOp, TransactionSlot, TransactionState};
use crate::types::{DeviceId, Entry, Key};
use crate::validate;
use devkv_codec::TypedValue;
use devkv_storage::StorageBackend;
use devkv_sync_engine::{
    LoopbackNetwork, ReplicaStore, SyncConfig, SyncEngine, SyncError, SyncResult, SyncState,
    SyncStats, SyncTransport,
};
use devkv_sync_protocol::{PushResponse, SyncMode, SyncRange, SyncRecord, SyncStatus};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// Everything needed to open a store, prepared by the manager.
pub(crate) struct StoreContext {
    pub store_id: String,
    pub options: Options,
    pub local: DeviceId,
    pub backend: Box<dyn StorageBackend>,
    pub cipher: Option<CryptoManager>,
    pub dir: Option<StoreDir>,
    pub network: LoopbackNetwork,
    pub sync_config: SyncConfig,
    pub notify_capacity: usize,
}

struct StoreInner {
    instance: u64,
    store_id: String,
    options: Options,
    engine: StoreEngine,
    transactions: TransactionSlot,
    notifier: ChangeNotifier,
    sync: SyncEngine,
    sync_range: RwLock<Option<SyncRange>>,
    auto_sync: AtomicBool,
    known_peers: RwLock<BTreeSet<DeviceId>>,
    result_sets: Mutex<HashSet<u64>>,
    network: LoopbackNetwork,
    dir: Mutex<Option<StoreDir>>,
    closed: AtomicBool,
}

/// Handle to an open store.
///
/// Handles are cheap to clone; clones share the store, its transaction slot
/// and its watchers. Every operation is `async`: arguments are checked
/// before the first await, and storage work runs on the blocking pool.
///
/// ```no_run
/// # async fn demo() -> devkv_core::KvResult<()> {
/// use devkv_core::{KvManager, KvManagerConfig, Options};
///
/// let manager = KvManager::new(KvManagerConfig::new("com.example.notes"))?;
/// let store = manager.get_kv_store("notes", Options::default()).await?;
/// store.put("k1", "v1").await?;
/// let value = store.get(manager.local_device(), "k1").await?;
/// assert_eq!(value.as_str(), Some("v1"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct KvStore {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for KvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvStore")
            .field("store_id", &self.inner.store_id)
            .field("device", self.inner.engine.local_device())
            .field("kind", &self.inner.options.kv_store_type)
            .field("closed", &self.inner.closed.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

pub(crate) async fn blocking<T, F>(f: F) -> KvResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> KvResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| KvError::Io(std::io::Error::other(e)))?
}

fn notification(changes: &ChangeSet, device: DeviceId) -> ChangeNotification {
    ChangeNotification {
        insert_entries: changes.inserted.clone(),
        update_entries: changes.updated.clone(),
        delete_entries: changes.deleted.clone(),
        device_id: Some(device),
    }
}

impl KvStore {
    /// Replays the log and starts the notifier. Blocks on I/O.
    pub(crate) fn open(ctx: StoreContext) -> KvResult<Self> {
        let StoreContext {
            store_id,
            options,
            local,
            backend,
            cipher,
            dir,
            network,
            sync_config,
            notify_capacity,
        } = ctx;

        let encrypted = cipher.is_some();
        let (log, batches) = CommitLog::open(backend, cipher, store_id.as_bytes().to_vec())?;
        let engine = StoreEngine::open(options.kv_store_type, local.clone(), log, batches);
        let notifier = ChangeNotifier::new(&store_id, notify_capacity)?;
        let transport: Arc<dyn SyncTransport> =
            Arc::new(network.transport(store_id.clone(), local.clone()));

        let inner = Arc::new_cyclic(|weak: &Weak<StoreInner>| {
            let replica: Weak<dyn ReplicaStore> = weak.clone();
            StoreInner {
                instance: NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed),
                store_id,
                options,
                engine,
                transactions: TransactionSlot::new(),
                notifier,
                sync: SyncEngine::new(sync_config, transport, replica),
                sync_range: RwLock::new(None),
                auto_sync: AtomicBool::new(options.auto_sync),
                known_peers: RwLock::new(BTreeSet::new()),
                result_sets: Mutex::new(HashSet::new()),
                network: network.clone(),
                dir: Mutex::new(dir),
                closed: AtomicBool::new(false),
            }
        });
        let replica: Weak<StoreInner> = Arc::downgrade(&inner);
        network.register(replica);

        tracing::info!(
            store = %inner.store_id,
            device = %local,
            kind = %options.kv_store_type,
            entries = inner.engine.len(),
            encrypted,
            "store opened"
        );
        Ok(Self { inner })
    }

    /// Store id.
    #[must_use]
    pub fn store_id(&self) -> &str {
        &self.inner.store_id
    }

    /// The device local writes are attributed to.
    #[must_use]
    pub fn local_device(&self) -> &DeviceId {
        self.inner.engine.local_device()
    }

    /// Options the store was opened with.
    #[must_use]
    pub fn options(&self) -> Options {
        self.inner.options
    }

    /// Security level the store was created with.
    ///
    /// # Errors
    ///
    /// `StoreClosed` after close.
    pub async fn get_security_level(&self) -> KvResult<SecurityLevel> {
        self.inner.ensure_open()?;
        Ok(self.inner.options.security_level)
    }

    /// Returns true once the store was closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Live entry count per origin device.
    #[must_use]
    pub fn device_entry_counts(&self) -> BTreeMap<DeviceId, usize> {
        self.inner.engine.device_counts()
    }

    /// Inserts or overwrites `key`.
    ///
    /// # Errors
    ///
    /// `KeyInvalid`, `ValueTooLarge`, `StoreClosed`, or a storage error.
    pub async fn put(&self, key: impl Into<Key>, value: impl Into<TypedValue>) -> KvResult<()> {
        let (key, value) = (key.into(), value.into());
        self.inner.ensure_open()?;
        validate::key(self.kind(), &key)?;
        validate::value(&value)?;
        self.submit(PendingOp::Put(key, value)).await
    }

    /// Removes `key`. Removing a missing key succeeds.
    ///
    /// # Errors
    ///
    /// `KeyInvalid`, `StoreClosed`, or a storage error.
    pub async fn delete(&self, key: impl Into<Key>) -> KvResult<()> {
        let key = key.into();
        self.inner.ensure_open()?;
        validate::key(self.kind(), &key)?;
        self.submit(PendingOp::Delete(key)).await
    }

    /// Writes every entry or none of them.
    ///
    /// # Errors
    ///
    /// `ArgumentInvalid` for more than the batch limit, `KeyInvalid` or
    /// `ValueTooLarge` for any malformed entry, `StoreClosed`, or a storage
    /// error. Nothing is written on error.
    pub async fn put_batch<K, V>(&self, entries: impl IntoIterator<Item = (K, V)>) -> KvResult<()>
    where
        K: Into<Key>,
        V: Into<TypedValue>,
    {
        let entries: Vec<(Key, TypedValue)> = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.inner.ensure_open()?;
        validate::entries(self.kind(), &entries)?;
        self.submit(PendingOp::PutBatch(entries)).await
    }

    /// Removes every key; missing keys are skipped.
    ///
    /// # Errors
    ///
    /// `ArgumentInvalid` for more than the batch limit, `KeyInvalid`,
    /// `StoreClosed`, or a storage error.
    pub async fn delete_batch<K: Into<Key>>(&self, keys: impl IntoIterator<Item = K>) -> KvResult<()> {
        let keys: Vec<Key> = keys.into_iter().map(Into::into).collect();
        self.inner.ensure_open()?;
        validate::keys(self.kind(), &keys)?;
        self.submit(PendingOp::DeleteBatch(keys)).await
    }

    /// Live value of `key` as written by `device`.
    ///
    /// # Errors
    ///
    /// `KeyNotFound` if there is none, `KeyInvalid`, or `StoreClosed`.
    pub async fn get(&self, device: &DeviceId, key: impl Into<Key>) -> KvResult<TypedValue> {
        let key = key.into();
        self.inner.ensure_open()?;
        validate::key(self.kind(), &key)?;
        self.inner
            .engine
            .get(device, key.as_bytes())
            .ok_or(KvError::KeyNotFound)
    }

    fn kind(&self) -> KvStoreType {
        self.inner.options.kv_store_type
    }

    /// Buffers `op` in the active transaction, or applies it right away.
    async fn submit(&self, op: PendingOp) -> KvResult<()> {
        let Some(op) = self.inner.transactions.stage(op) else {
            return Ok(());
        };
        let inner = Arc::clone(&self.inner);
        let changed = blocking(move || inner.apply_local(op.into_writes())).await?;
        if changed {
            self.schedule_auto_sync();
        }
        Ok(())
    }

    /// Opens a transaction on this handle.
    ///
    /// # Errors
    ///
    /// `TransactionAlreadyActive` if one is open, or `StoreClosed`.
    pub async fn start_transaction(&self) -> KvResult<()> {
        self.inner.ensure_open()?;
        self.inner.transactions.begin().map(|_| ())
    }

    /// Applies the buffered operations atomically and fires one change
    /// notification.
    ///
    /// # Errors
    ///
    /// `NoActiveTransaction`, `StoreClosed`, or `CommitFailed` with the store
    /// unchanged. The transaction ends either way.
    pub async fn commit(&self) -> KvResult<()> {
        self.inner.ensure_open()?;
        let txn = self.inner.transactions.take()?;
        let id = txn.id();
        let inner = Arc::clone(&self.inner);
        match blocking(move || inner.apply_local(txn.into_writes())).await {
            Ok(changed) => {
                self.inner.transactions.finish(TransactionState::Committed);
                tracing::debug!(store = %self.inner.store_id, txn = id, "transaction committed");
                if changed {
                    self.schedule_auto_sync();
                }
                Ok(())
            }
            Err(e) => {
                self.inner.transactions.finish(TransactionState::RolledBack);
                tracing::warn!(store = %self.inner.store_id, txn = id, error = %e, "commit failed");
                Err(KvError::commit_failed(e))
            }
        }
    }

    /// Discards the buffered operations. No notification fires.
    ///
    /// # Errors
    ///
    /// `NoActiveTransaction` or `StoreClosed`.
    pub async fn rollback(&self) -> KvResult<()> {
        self.inner.ensure_open()?;
        self.inner.transactions.rollback().map(|_| ())
    }

    /// `Active` while a transaction is open on this handle.
    #[must_use]
    pub fn transaction_state(&self) -> TransactionState {
        self.inner.transactions.state()
    }

    /// Outcome of the most recent transaction.
    #[must_use]
    pub fn last_transaction_outcome(&self) -> Option<TransactionState> {
        self.inner.transactions.last_outcome()
    }

    /// Entries matching `query`, ordered by key then origin.
    ///
    /// A prefix (`&str` or [`Key`]) converts into a query; use
    /// [`Query::scoped`] to restrict to one device.
    ///
    /// # Errors
    ///
    /// `StoreClosed`.
    pub async fn get_entries(&self, query: impl Into<Query>) -> KvResult<Vec<Entry>> {
        let query = query.into();
        self.inner.ensure_open()?;
        Ok(self.inner.select(&query))
    }

    /// A cursor over the entries matching `query` now. Close it with
    /// [`close_result_set`](Self::close_result_set).
    ///
    /// # Errors
    ///
    /// `StoreClosed`.
    pub async fn get_result_set(&self, query: impl Into<Query>) -> KvResult<ResultSet> {
        let query = query.into();
        self.inner.ensure_open()?;
        let result = ResultSet::new(self.inner.instance, self.inner.select(&query));
        self.inner.result_sets.lock().insert(result.id());
        tracing::debug!(store = %self.inner.store_id, id = result.id(), "result set opened");
        Ok(result)
    }

    /// Number of entries matching `query`.
    ///
    /// # Errors
    ///
    /// `StoreClosed`.
    pub async fn get_result_size(&self, query: impl Into<Query>) -> KvResult<u64> {
        let query = query.into();
        self.inner.ensure_open()?;
        Ok(u64::try_from(self.inner.select(&query).len()).unwrap_or(u64::MAX))
    }

    /// Releases a result set opened on this store.
    ///
    /// # Errors
    ///
    /// `ResultSetClosed` if it is already closed, `ArgumentInvalid` if it
    /// belongs to another store.
    pub async fn close_result_set(&self, result: &ResultSet) -> KvResult<()> {
        if result.owner() != self.inner.instance {
            return Err(KvError::argument_invalid(
                "result set was opened on another store",
            ));
        }
        result.close()?;
        self.inner.result_sets.lock().remove(&result.id());
        Ok(())
    }

    /// Number of result sets opened and not yet closed.
    #[must_use]
    pub fn open_result_sets(&self) -> usize {
        self.inner.result_sets.lock().len()
    }

    /// Starts a sync cycle with `devices` and returns once it is submitted.
    /// The outcome arrives through [`on_sync_complete`](Self::on_sync_complete).
    ///
    /// # Errors
    ///
    /// `ArgumentInvalid` for an empty device list or the local device, or
    /// `StoreClosed`.
    pub async fn sync(&self, devices: Vec<DeviceId>, mode: SyncMode) -> KvResult<()> {
        self.sync_with_delay(devices, mode, None).await
    }

    /// Like [`sync`](Self::sync), waiting up to `delay` before the cycle
    /// starts (the configured default when `None`).
    ///
    /// # Errors
    ///
    /// See [`sync`](Self::sync).
    pub async fn sync_with_delay(
        &self,
        devices: Vec<DeviceId>,
        mode: SyncMode,
        delay: Option<Duration>,
    ) -> KvResult<()> {
        self.inner.ensure_open()?;
        if devices.is_empty() {
            return Err(KvError::argument_invalid("device list is empty"));
        }
        if devices.contains(self.local_device()) {
            return Err(KvError::argument_invalid("cannot sync with the local device"));
        }
        let mut peers = Vec::with_capacity(devices.len());
        for device in devices {
            if !peers.contains(&device) {
                peers.push(device);
            }
        }

        tracing::debug!(store = %self.inner.store_id, peers = peers.len(), %mode, "sync submitted");
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.run_sync(peers, mode, delay).await });
        Ok(())
    }

    /// Sets the delay applied before cycles started without one.
    ///
    /// # Errors
    ///
    /// `StoreClosed`.
    pub async fn set_sync_param(&self, default_delay: Duration) -> KvResult<()> {
        self.inner.ensure_open()?;
        self.inner.sync.set_default_delay(default_delay);
        Ok(())
    }

    /// Turns automatic push of committed changes on or off.
    ///
    /// # Errors
    ///
    /// `StoreClosed`.
    pub async fn enable_sync(&self, enabled: bool) -> KvResult<()> {
        self.inner.ensure_open()?;
        self.inner.auto_sync.store(enabled, Ordering::Release);
        tracing::debug!(store = %self.inner.store_id, enabled, "auto sync toggled");
        Ok(())
    }

    /// Restricts sync to entries whose partition label is in both lists.
    ///
    /// # Errors
    ///
    /// `StoreClosed`.
    pub async fn set_sync_range(&self, local: Vec<String>, remote: Vec<String>) -> KvResult<()> {
        self.inner.ensure_open()?;
        *self.inner.sync_range.write() = Some(SyncRange::new(local, remote));
        Ok(())
    }

    /// Removes the sync range restriction.
    ///
    /// # Errors
    ///
    /// `StoreClosed`.
    pub async fn clear_sync_range(&self) -> KvResult<()> {
        self.inner.ensure_open()?;
        *self.inner.sync_range.write() = None;
        Ok(())
    }

    /// Deletes, on this device only, every entry `device` authored.
    /// Nothing is propagated to peers and no notification fires.
    ///
    /// # Errors
    ///
    /// `DeviceUnknown` unless `device` is a known remote peer,
    /// `StoreClosed`, or a storage error.
    pub async fn remove_device_data(&self, device: &DeviceId) -> KvResult<()> {
        self.inner.ensure_open()?;
        if !self.inner.is_known_peer(device) {
            return Err(KvError::device_unknown(device));
        }
        let inner = Arc::clone(&self.inner);
        let device = device.clone();
        blocking(move || inner.engine.purge(&device).map(|_| ())).await
    }

    /// State of the sync state machine.
    #[must_use]
    pub fn sync_state(&self) -> SyncState {
        self.inner.sync.state()
    }

    /// Cumulative sync statistics.
    #[must_use]
    pub fn sync_stats(&self) -> SyncStats {
        self.inner.sync.stats()
    }

    fn schedule_auto_sync(&self) {
        if !self.inner.auto_sync.load(Ordering::Acquire) {
            return;
        }
        let peers = self.inner.sync.online_peers();
        if peers.is_empty() {
            return;
        }
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner
                .run_sync(peers, SyncMode::PushOnly, Some(Duration::ZERO))
                .await;
        });
    }

    /// Registers a data change watcher for `level`.
    ///
    /// # Errors
    ///
    /// `StoreClosed`.
    pub fn on_data_change<F>(&self, level: SubscribeType, callback: F) -> KvResult<WatcherId>
    where
        F: Fn(&ChangeNotification) + Send + Sync + 'static,
    {
        self.inner.ensure_open()?;
        Ok(self.inner.notifier.on_data_change(level, Arc::new(callback)))
    }

    /// Registers a sync completion watcher.
    ///
    /// # Errors
    ///
    /// `StoreClosed`.
    pub fn on_sync_complete<F>(&self, callback: F) -> KvResult<WatcherId>
    where
        F: Fn(&[(DeviceId, SyncStatus)]) + Send + Sync + 'static,
    {
        self.inner.ensure_open()?;
        Ok(self.inner.notifier.on_sync_complete(Arc::new(callback)))
    }

    /// Unregisters a watcher. Returns false if it was not registered.
    pub fn off(&self, watcher: WatcherId) -> bool {
        self.inner.notifier.off(watcher)
    }

    /// Closes the store: cancels sync, leaves the network, delivers queued
    /// notifications and releases the directory lock. An open transaction
    /// is discarded. Idempotent.
    pub(crate) fn close(&self) {
        self.inner.close();
    }
}

impl StoreInner {
    fn ensure_open(&self) -> KvResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(KvError::StoreClosed)
        } else {
            Ok(())
        }
    }

    fn select(&self, query: &Query) -> Vec<Entry> {
        query.apply(self.engine.entries(query.prefix().as_bytes(), query.device()))
    }

    /// Applies one local batch and notifies. Returns true if any key changed.
    fn apply_local(&self, writes: Vec<WriteOp>) -> KvResult<bool> {
        self.ensure_open()?;
        let local = self.engine.local_device().clone();
        let changes = self.engine.apply_local(writes, |changes| {
            self.notifier
                .publish_change(ChangeSource::Local, notification(changes, local));
        })?;
        Ok(!changes.is_empty())
    }

    async fn run_sync(&self, peers: Vec<DeviceId>, mode: SyncMode, delay: Option<Duration>) {
        let report = self.sync.run_cycle(peers, mode, delay).await;
        self.notifier.publish_sync_complete(report.results);
    }

    fn is_known_peer(&self, device: &DeviceId) -> bool {
        if device == self.engine.local_device() {
            return false;
        }
        self.known_peers.read().contains(device)
            || self.engine.origins().contains(device)
            || self.sync.online_peers().contains(device)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.sync.cancel();
        self.network
            .unregister(&self.store_id, self.engine.local_device());
        if self.transactions.state() == TransactionState::Active {
            let _ = self.transactions.rollback();
        }
        self.notifier.close();
        drop(self.dir.lock().take());
        tracing::info!(store = %self.store_id, "store closed");
    }
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        self.close();
    }
}

impl ReplicaStore for StoreInner {
    fn store_id(&self) -> &str {
        &self.store_id
    }

    fn local_device(&self) -> &DeviceId {
        self.engine.local_device()
    }

    fn sync_range(&self) -> Option<SyncRange> {
        self.sync_range.read().clone()
    }

    fn authored_records(
        &self,
        author: &DeviceId,
        labels: Option<&[String]>,
    ) -> SyncResult<Vec<SyncRecord>> {
        self.ensure_open()
            .map_err(|e| SyncError::replica(e.to_string()))?;
        Ok(self.engine.authored(author, labels))
    }

    fn merge_records(&self, from: &DeviceId, mut records: Vec<SyncRecord>) -> SyncResult<PushResponse> {
        self.ensure_open()
            .map_err(|e| SyncError::replica(e.to_string()))?;
        let offered = records.len();
        if let Some(range) = self.sync_range() {
            records.retain(|record| {
                range.admits(&devkv_sync_protocol::partition_label(&record.key))
            });
        }
        let filtered = u64::try_from(offered - records.len()).unwrap_or(u64::MAX);

        let (mut response, _) = self
            .engine
            .merge_remote(records, |changes| {
                self.notifier
                    .publish_change(ChangeSource::Remote, notification(changes, from.clone()));
            })
            .map_err(|e| SyncError::replica(e.to_string()))?;
        response.superseded += filtered;
        Ok(response)
    }

    fn peer_seen(&self, peer: &DeviceId) {
        if peer != self.engine.local_device() {
            self.known_peers.write().insert(peer.clone());
        }
    }
}
