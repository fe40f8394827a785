//! Change notification.
//!
//! Each store owns one [`ChangeNotifier`]. Events go into a bounded queue
//! drained by a single dispatcher thread, so callbacks for one store run one
//! at a time and in the order the changes were committed. Delivery is
//! asynchronous: a mutation may return before its watchers have run.

use crate::error::KvResult;
use crate::types::{DeviceId, Entry};
use devkv_sync_protocol::SyncStatus;
use parking_lot::{Mutex, RwLock};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Which data changes a watcher receives.
///
/// The codes are those of the distributed-data subscribe types
/// (`SUBSCRIBE_TYPE_LOCAL`, `SUBSCRIBE_TYPE_REMOTE`, `SUBSCRIBE_TYPE_ALL`).
/// `Local` and `Remote` are disjoint, so a higher code is not a superset of
/// a lower one. Only `All` covers both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscribeType {
    /// Changes made on this device.
    Local = 0,
    /// Changes merged from peers by sync.
    Remote = 1,
    /// Both.
    All = 2,
}

impl SubscribeType {
    /// Numeric level.
    #[must_use]
    pub const fn to_code(self) -> u8 {
        self as u8
    }

    /// Parses a numeric level.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Local),
            1 => Some(Self::Remote),
            2 => Some(Self::All),
            _ => None,
        }
    }

    fn admits(self, source: ChangeSource) -> bool {
        match self {
            Self::All => true,
            Self::Local => source == ChangeSource::Local,
            Self::Remote => source == ChangeSource::Remote,
        }
    }
}

/// Where a change came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeSource {
    /// A local mutation or commit.
    Local,
    /// A batch merged from a peer.
    Remote,
}

/// One committed change, classified per key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeNotification {
    /// Keys that did not have a value before.
    pub insert_entries: Vec<Entry>,
    /// Keys whose value was replaced.
    pub update_entries: Vec<Entry>,
    /// Keys that were removed, with their last value.
    pub delete_entries: Vec<Entry>,
    /// Device the change came from.
    pub device_id: Option<DeviceId>,
}

impl ChangeNotification {
    /// Total number of changed keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.insert_entries.len() + self.update_entries.len() + self.delete_entries.len()
    }

    /// Returns true if no key changed (an empty commit).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle returned by watcher registration; pass it to `off`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatcherId(u64);

impl WatcherId {
    /// Raw id.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

/// Data change callback.
pub type DataChangeCallback = Arc<dyn Fn(&ChangeNotification) + Send + Sync>;
/// Sync completion callback; receives the status of every peer in the cycle.
pub type SyncCompleteCallback = Arc<dyn Fn(&[(DeviceId, SyncStatus)]) + Send + Sync>;

enum Event {
    Data(ChangeSource, ChangeNotification),
    SyncComplete(Vec<(DeviceId, SyncStatus)>),
}

#[derive(Default)]
struct Watchers {
    data: Vec<(WatcherId, SubscribeType, DataChangeCallback)>,
    sync: Vec<(WatcherId, SyncCompleteCallback)>,
}

/// Serialized, ordered delivery of store events to registered watchers.
pub struct ChangeNotifier {
    watchers: Arc<RwLock<Watchers>>,
    sender: Mutex<Option<SyncSender<Event>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("watchers", &self.watcher_count())
            .field("open", &self.sender.lock().is_some())
            .finish()
    }
}

impl ChangeNotifier {
    /// Starts the dispatcher thread for store `name`.
    ///
    /// # Errors
    ///
    /// Fails if the thread cannot be spawned.
    pub fn new(name: &str, capacity: usize) -> KvResult<Self> {
        let watchers = Arc::new(RwLock::new(Watchers::default()));
        let (sender, receiver) = mpsc::sync_channel(capacity.max(1));
        let shared = Arc::clone(&watchers);
        let dispatcher = std::thread::Builder::new()
            .name(format!("devkv-notify-{name}"))
            .spawn(move || dispatch(&shared, &receiver))?;

        Ok(Self {
            watchers,
            sender: Mutex::new(Some(sender)),
            dispatcher: Mutex::new(Some(dispatcher)),
            next_id: AtomicU64::new(1),
        })
    }

    fn next_id(&self) -> WatcherId {
        WatcherId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Registers a data change watcher.
    pub fn on_data_change(&self, level: SubscribeType, callback: DataChangeCallback) -> WatcherId {
        let id = self.next_id();
        self.watchers.write().data.push((id, level, callback));
        id
    }

    /// Registers a sync completion watcher.
    pub fn on_sync_complete(&self, callback: SyncCompleteCallback) -> WatcherId {
        let id = self.next_id();
        self.watchers.write().sync.push((id, callback));
        id
    }

    /// Removes a watcher. Returns false if it was not registered.
    pub fn off(&self, id: WatcherId) -> bool {
        let mut watchers = self.watchers.write();
        let before = watchers.data.len() + watchers.sync.len();
        watchers.data.retain(|(w, _, _)| *w != id);
        watchers.sync.retain(|(w, _)| *w != id);
        before != watchers.data.len() + watchers.sync.len()
    }

    /// Number of registered watchers.
    #[must_use]
    pub fn watcher_count(&self) -> usize {
        let watchers = self.watchers.read();
        watchers.data.len() + watchers.sync.len()
    }

    /// Queues a data change for watchers subscribed to `source`.
    pub fn publish_change(&self, source: ChangeSource, notification: ChangeNotification) {
        let interested = self
            .watchers
            .read()
            .data
            .iter()
            .any(|(_, level, _)| level.admits(source));
        if interested {
            self.send(Event::Data(source, notification));
        }
    }

    /// Queues a sync completion report.
    pub fn publish_sync_complete(&self, results: Vec<(DeviceId, SyncStatus)>) {
        if !self.watchers.read().sync.is_empty() {
            self.send(Event::SyncComplete(results));
        }
    }

    fn send(&self, event: Event) {
        // Clone the sender so a full queue does not block other publishers
        // on the mutex.
        let sender = self.sender.lock().clone();
        match sender {
            Some(sender) => {
                if sender.send(event).is_err() {
                    tracing::warn!("notification dispatcher is gone; event dropped");
                }
            }
            None => tracing::debug!("notifier closed; event dropped"),
        }
    }

    /// Stops accepting events, delivers the ones already queued, and stops
    /// the dispatcher. Idempotent.
    pub fn close(&self) {
        drop(self.sender.lock().take());
        let Some(handle) = self.dispatcher.lock().take() else {
            return;
        };
        if handle.thread().id() == std::thread::current().id() {
            // Closed from inside a callback; the loop ends on its own.
            return;
        }
        if handle.join().is_err() {
            tracing::warn!("notification dispatcher panicked");
        }
    }
}

impl Drop for ChangeNotifier {
    fn drop(&mut self) {
        self.close();
    }
}

fn dispatch(watchers: &RwLock<Watchers>, receiver: &Receiver<Event>) {
    for event in receiver {
        match event {
            Event::Data(source, notification) => {
                let callbacks: Vec<DataChangeCallback> = watchers
                    .read()
                    .data
                    .iter()
                    .filter(|(_, level, _)| level.admits(source))
                    .map(|(_, _, callback)| Arc::clone(callback))
                    .collect();
                for callback in callbacks {
                    invoke(|| callback(&notification));
                }
            }
            Event::SyncComplete(results) => {
                let callbacks: Vec<SyncCompleteCallback> = watchers
                    .read()
                    .sync
                    .iter()
                    .map(|(_, callback)| Arc::clone(callback))
                    .collect();
                for callback in callbacks {
                    invoke(|| callback(&results));
                }
            }
        }
    }
    tracing::debug!("notification dispatcher stopped");
}

fn invoke(f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::warn!("watcher callback panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter(level: SubscribeType, notifier: &ChangeNotifier) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        notifier.on_data_change(
            level,
            Arc::new(move |_: &ChangeNotification| {
                seen.fetch_add(1, Ordering::SeqCst);
            }),
        );
        count
    }

    #[test]
    fn levels_filter_by_source() {
        let notifier = ChangeNotifier::new("levels", 8).unwrap();
        let local = counter(SubscribeType::Local, &notifier);
        let remote = counter(SubscribeType::Remote, &notifier);
        let all = counter(SubscribeType::All, &notifier);

        notifier.publish_change(ChangeSource::Local, ChangeNotification::default());
        notifier.publish_change(ChangeSource::Remote, ChangeNotification::default());
        notifier.publish_change(ChangeSource::Local, ChangeNotification::default());
        notifier.close();

        assert_eq!(local.load(Ordering::SeqCst), 2);
        assert_eq!(remote.load(Ordering::SeqCst), 1);
        assert_eq!(all.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn delivery_is_ordered() {
        let notifier = ChangeNotifier::new("order", 2).unwrap();
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        notifier.on_data_change(
            SubscribeType::All,
            Arc::new(move |n: &ChangeNotification| {
                let _ = tx.lock().send(n.insert_entries.len());
            }),
        );
        let origin = DeviceId::new("phone").unwrap();
        for i in 0..20 {
            let entries = (0..i).map(|j| Entry::new(format!("k{j}"), j, origin.clone())).collect();
            notifier.publish_change(
                ChangeSource::Local,
                ChangeNotification {
                    insert_entries: entries,
                    ..ChangeNotification::default()
                },
            );
        }
        notifier.close();
        let seen: Vec<usize> = rx.try_iter().collect();
        assert_eq!(seen, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn off_and_sync_complete() {
        let notifier = ChangeNotifier::new("sync", 4).unwrap();
        let results = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&results);
        let id = notifier.on_sync_complete(Arc::new(move |r: &[(DeviceId, SyncStatus)]| {
            sink.lock().extend_from_slice(r);
        }));
        let data = counter(SubscribeType::All, &notifier);
        assert_eq!(notifier.watcher_count(), 2);

        let peer = DeviceId::new("tablet").unwrap();
        notifier.publish_sync_complete(vec![(peer.clone(), SyncStatus::Success)]);
        assert!(notifier.off(id));
        assert!(!notifier.off(id));
        notifier.publish_sync_complete(vec![(peer.clone(), SyncStatus::Timeout)]);
        notifier.close();

        assert_eq!(*results.lock(), vec![(peer, SyncStatus::Success)]);
        assert_eq!(data.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn panicking_watcher_does_not_stop_delivery() {
        let notifier = ChangeNotifier::new("panic", 4).unwrap();
        notifier.on_data_change(SubscribeType::All, Arc::new(|_: &ChangeNotification| panic!("boom")));
        let count = counter(SubscribeType::All, &notifier);
        notifier.publish_change(ChangeSource::Local, ChangeNotification::default());
        notifier.publish_change(ChangeSource::Local, ChangeNotification::default());
        notifier.close();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn events_after_close_are_dropped() {
        let notifier = ChangeNotifier::new("closed", 4).unwrap();
        let count = counter(SubscribeType::All, &notifier);
        notifier.close();
        notifier.close();
        notifier.publish_change(ChangeSource::Local, ChangeNotification::default());
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(SubscribeType::from_code(2), Some(SubscribeType::All));
        assert_eq!(SubscribeType::Remote.to_code(), 1);
        assert_eq!(SubscribeType::from_code(3), None);
    }
}
