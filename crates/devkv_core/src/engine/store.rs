//! The in-memory index of a store and the rules for changing it.

use super::frame::LogBatch;
use super::log::CommitLog;
use crate::config::KvStoreType;
use crate::error::{KvError, KvResult};
use crate::types::{Entry, Key};
use crate::validate;
use devkv_codec::TypedValue;
use devkv_sync_protocol::{
    partition_label, resolve, DeviceId, LamportClock, LogicalTimestamp, PushResponse, Resolution,
    SyncRecord,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet};

/// Index position of a version: the owning device (device-collaboration
/// stores only) and the key.
type Slot = (Option<DeviceId>, Vec<u8>);
type Index = BTreeMap<Slot, SyncRecord>;

/// One local mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Insert or overwrite.
    Put(Key, TypedValue),
    /// Remove; a no-op when the key has no live value.
    Delete(Key),
}

/// Entries changed by one applied batch, classified against the state
/// before the batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    /// Keys that had no live value before.
    pub inserted: Vec<Entry>,
    /// Keys whose live value was replaced.
    pub updated: Vec<Entry>,
    /// Keys whose live value was removed, with the removed value.
    pub deleted: Vec<Entry>,
}

impl ChangeSet {
    /// Returns true if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    /// Number of changed keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inserted.len() + self.updated.len() + self.deleted.len()
    }
}

/// Current versions of every key, backed by a [`CommitLog`].
///
/// Writers are serialized by the log lock. A batch is appended to the log
/// first and reaches the index only once the append succeeded, so a failed
/// write leaves both untouched.
#[derive(Debug)]
pub struct StoreEngine {
    kind: KvStoreType,
    local: DeviceId,
    clock: LamportClock,
    index: RwLock<Index>,
    log: Mutex<CommitLog>,
}

fn live_entry(record: &SyncRecord) -> Option<Entry> {
    record.value.as_ref().map(|value| Entry {
        key: Key::new(record.key.clone()),
        value: value.clone(),
        origin: record.origin.clone(),
    })
}

fn classify(index: &Index, overlay: &Index) -> ChangeSet {
    let mut changes = ChangeSet::default();
    for (slot, new) in overlay {
        let old = index.get(slot).and_then(live_entry);
        match (old, live_entry(new)) {
            (None, Some(entry)) => changes.inserted.push(entry),
            (Some(_), Some(entry)) => changes.updated.push(entry),
            (Some(entry), None) => changes.deleted.push(entry),
            (None, None) => {}
        }
    }
    changes
}

impl StoreEngine {
    /// Rebuilds the index from replayed `batches`.
    pub fn open(kind: KvStoreType, local: DeviceId, log: CommitLog, batches: Vec<LogBatch>) -> Self {
        let mut index = Index::new();
        let mut last = LogicalTimestamp::ZERO;
        for batch in batches {
            match batch {
                LogBatch::Apply(records) => {
                    for record in records {
                        last = last.max(record.timestamp);
                        index.insert(Self::slot(kind, &record.origin, &record.key), record);
                    }
                }
                LogBatch::Purge(device) => index.retain(|_, record| record.origin != device),
            }
        }
        tracing::debug!(versions = index.len(), clock = %last, "index rebuilt");

        Self {
            kind,
            local,
            clock: LamportClock::starting_at(last),
            index: RwLock::new(index),
            log: Mutex::new(log),
        }
    }

    fn slot(kind: KvStoreType, origin: &DeviceId, key: &[u8]) -> Slot {
        match kind {
            KvStoreType::DeviceCollaboration => (Some(origin.clone()), key.to_vec()),
            KvStoreType::SingleVersion | KvStoreType::MultiVersion => (None, key.to_vec()),
        }
    }

    /// Store kind.
    #[must_use]
    pub fn kind(&self) -> KvStoreType {
        self.kind
    }

    /// The device local writes are attributed to.
    #[must_use]
    pub fn local_device(&self) -> &DeviceId {
        &self.local
    }

    /// Latest logical time seen.
    #[must_use]
    pub fn clock(&self) -> LogicalTimestamp {
        self.clock.current()
    }

    /// Live value of `key` written by `device`.
    #[must_use]
    pub fn get(&self, device: &DeviceId, key: &[u8]) -> Option<TypedValue> {
        let index = self.index.read();
        index
            .get(&Self::slot(self.kind, device, key))
            .filter(|record| record.origin == *device)
            .and_then(|record| record.value.clone())
    }

    /// Live entries whose key starts with `prefix`, optionally restricted to
    /// one origin device, ordered by key then origin.
    #[must_use]
    pub fn entries(&self, prefix: &[u8], device: Option<&DeviceId>) -> Vec<Entry> {
        let mut entries: Vec<Entry> = self
            .index
            .read()
            .values()
            .filter(|record| record.key.starts_with(prefix))
            .filter(|record| device.map_or(true, |device| record.origin == *device))
            .filter_map(live_entry)
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key).then_with(|| a.origin.cmp(&b.origin)));
        entries
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index
            .read()
            .values()
            .filter(|record| !record.is_tombstone())
            .count()
    }

    /// Returns true if the store has no live entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live entry count per origin device.
    #[must_use]
    pub fn device_counts(&self) -> BTreeMap<DeviceId, usize> {
        let mut counts = BTreeMap::new();
        for record in self.index.read().values().filter(|r| !r.is_tombstone()) {
            *counts.entry(record.origin.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Every device that authored a version still held, tombstones included.
    #[must_use]
    pub fn origins(&self) -> BTreeSet<DeviceId> {
        self.index
            .read()
            .values()
            .map(|record| record.origin.clone())
            .collect()
    }

    /// Versions (values and tombstones) authored by `author`, restricted to
    /// `labels` when given.
    #[must_use]
    pub fn authored(&self, author: &DeviceId, labels: Option<&[String]>) -> Vec<SyncRecord> {
        self.index
            .read()
            .values()
            .filter(|record| record.origin == *author)
            .filter(|record| labels.map_or(true, |labels| labels.contains(&record.label)))
            .cloned()
            .collect()
    }

    /// Number of frames in the log.
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.log.lock().frames()
    }

    /// Applies local mutations in order as one atomic batch.
    ///
    /// `publish` sees the change set before the log lock is released, so
    /// what it queues follows the order batches were logged in. It runs for
    /// empty batches too.
    ///
    /// # Errors
    ///
    /// Fails if the batch cannot be logged; the index is then unchanged and
    /// `publish` is not called.
    pub fn apply_local(
        &self,
        ops: Vec<WriteOp>,
        publish: impl FnOnce(&ChangeSet),
    ) -> KvResult<ChangeSet> {
        let mut log = self.log.lock();
        let index = self.index.read();

        let mut overlay = Index::new();
        for op in ops {
            let (key, value) = match op {
                WriteOp::Put(key, value) => (key, Some(value)),
                WriteOp::Delete(key) => (key, None),
            };
            let slot = Self::slot(self.kind, &self.local, key.as_bytes());
            if value.is_none() {
                let live = overlay
                    .get(&slot)
                    .or_else(|| index.get(&slot))
                    .is_some_and(|record| !record.is_tombstone());
                if !live {
                    continue;
                }
            }
            let record = SyncRecord {
                label: partition_label(key.as_bytes()),
                key: key.into_bytes(),
                value,
                origin: self.local.clone(),
                timestamp: self.clock.tick(),
            };
            overlay.insert(slot, record);
        }

        if overlay.is_empty() {
            let changes = ChangeSet::default();
            publish(&changes);
            return Ok(changes);
        }

        let changes = classify(&index, &overlay);
        drop(index);
        log.append(&LogBatch::Apply(overlay.values().cloned().collect()))?;
        self.index.write().extend(overlay);
        publish(&changes);
        drop(log);
        tracing::debug!(changed = changes.len(), "applied local batch");
        Ok(changes)
    }

    /// Merges versions received from a peer, keeping the newest version of
    /// every key.
    ///
    /// Records with an invalid key, an oversized value or a timestamp past
    /// [`LogicalTimestamp::MAX_ACCEPTED`] are counted as superseded. The clock
    /// only moves past accepted records, and only once they are logged.
    ///
    /// `publish` runs under the log lock when at least one record won.
    ///
    /// # Errors
    ///
    /// Fails if the winners cannot be logged; nothing is merged then.
    pub fn merge_remote(
        &self,
        records: Vec<SyncRecord>,
        publish: impl FnOnce(&ChangeSet),
    ) -> KvResult<(PushResponse, ChangeSet)> {
        let mut log = self.log.lock();
        let index = self.index.read();

        let mut response = PushResponse::default();
        let mut overlay = Index::new();
        let mut newest = LogicalTimestamp::ZERO;
        for mut record in records {
            if let Err(reason) = self.admissible(&record) {
                tracing::warn!(origin = %record.origin, %reason, "dropping remote record");
                response.superseded += 1;
                continue;
            }
            newest = newest.max(record.timestamp);
            record.label = partition_label(&record.key);
            let slot = Self::slot(self.kind, &record.origin, &record.key);
            let current = overlay
                .get(&slot)
                .or_else(|| index.get(&slot))
                .map(SyncRecord::version);
            match resolve(current.as_ref(), &record.version()) {
                Resolution::TakeRemote => {
                    overlay.insert(slot, record);
                    response.applied += 1;
                }
                Resolution::KeepLocal | Resolution::Identical => response.superseded += 1,
            }
        }

        if overlay.is_empty() {
            self.clock.observe(newest);
            return Ok((response, ChangeSet::default()));
        }

        let changes = classify(&index, &overlay);
        drop(index);
        log.append(&LogBatch::Apply(overlay.values().cloned().collect()))?;
        self.clock.observe(newest);
        self.index.write().extend(overlay);
        if !changes.is_empty() {
            publish(&changes);
        }
        drop(log);
        tracing::debug!(
            applied = response.applied,
            superseded = response.superseded,
            "merged remote batch"
        );
        Ok((response, changes))
    }

    fn admissible(&self, record: &SyncRecord) -> KvResult<()> {
        validate::key(self.kind, &Key::new(record.key.clone()))?;
        if let Some(value) = &record.value {
            validate::value(value)?;
        }
        if record.timestamp > LogicalTimestamp::MAX_ACCEPTED {
            return Err(KvError::argument_invalid(format!(
                "timestamp {} is past the accepted range",
                record.timestamp
            )));
        }
        Ok(())
    }

    /// Drops every version authored by `device` without leaving tombstones.
    /// Returns the number of live entries removed.
    ///
    /// # Errors
    ///
    /// Fails if the purge cannot be logged; nothing is removed then.
    pub fn purge(&self, device: &DeviceId) -> KvResult<usize> {
        let mut log = self.log.lock();
        let (versions, live) = {
            let index = self.index.read();
            let owned = index.values().filter(|record| record.origin == *device);
            let (versions, live) = owned.fold((0usize, 0usize), |(all, live), record| {
                (all + 1, live + usize::from(!record.is_tombstone()))
            });
            (versions, live)
        };
        if versions == 0 {
            return Ok(0);
        }
        log.append(&LogBatch::Purge(device.clone()))?;
        self.index.write().retain(|_, record| record.origin != *device);
        tracing::info!(%device, removed = live, "purged device data");
        Ok(live)
    }
}
