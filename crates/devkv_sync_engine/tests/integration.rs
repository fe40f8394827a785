//! End-to-end sync between in-memory replicas over the loopback network.

use devkv_codec::TypedValue;
use devkv_sync_engine::{
    LoopbackNetwork, MockReply, MockTransport, ReplicaStore, SyncConfig, SyncEngine, SyncError,
    SyncResult, SyncState,
};
use devkv_sync_protocol::{
    partition_label, resolve, DeviceId, LamportClock, PushResponse, Resolution, SyncMessage,
    SyncMode, SyncRange, SyncRecord, SyncStatus,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing_test::traced_test;

const STORE: &str = "photos";

struct MemoryReplica {
    device: DeviceId,
    clock: LamportClock,
    range: Option<SyncRange>,
    records: Mutex<BTreeMap<(DeviceId, Vec<u8>), SyncRecord>>,
}

impl MemoryReplica {
    fn new(device: &str) -> Arc<Self> {
        Self::with_range(device, None)
    }

    fn with_range(device: &str, range: Option<SyncRange>) -> Arc<Self> {
        Arc::new(Self {
            device: DeviceId::new(device).unwrap(),
            clock: LamportClock::default(),
            range,
            records: Mutex::new(BTreeMap::new()),
        })
    }

    fn put(&self, key: &str, value: &str) {
        let record = SyncRecord {
            key: key.as_bytes().to_vec(),
            value: Some(TypedValue::from(value)),
            origin: self.device.clone(),
            timestamp: self.clock.tick(),
            label: partition_label(key.as_bytes()),
        };
        self.records
            .lock()
            .insert((self.device.clone(), record.key.clone()), record);
    }

    fn get(&self, origin: &DeviceId, key: &str) -> Option<TypedValue> {
        self.records
            .lock()
            .get(&(origin.clone(), key.as_bytes().to_vec()))
            .and_then(|record| record.value.clone())
    }

    fn len(&self) -> usize {
        self.records.lock().len()
    }
}

impl ReplicaStore for MemoryReplica {
    fn store_id(&self) -> &str {
        STORE
    }

    fn local_device(&self) -> &DeviceId {
        &self.device
    }

    fn sync_range(&self) -> Option<SyncRange> {
        self.range.clone()
    }

    fn authored_records(
        &self,
        author: &DeviceId,
        labels: Option<&[String]>,
    ) -> SyncResult<Vec<SyncRecord>> {
        Ok(self
            .records
            .lock()
            .values()
            .filter(|record| &record.origin == author)
            .filter(|record| labels.map_or(true, |labels| labels.contains(&record.label)))
            .cloned()
            .collect())
    }

    fn merge_records(&self, _from: &DeviceId, records: Vec<SyncRecord>) -> SyncResult<PushResponse> {
        let mut response = PushResponse::default();
        let mut stored = self.records.lock();
        for record in records {
            self.clock.observe(record.timestamp);
            let slot = (record.origin.clone(), record.key.clone());
            let local = stored.get(&slot).map(SyncRecord::version);
            match resolve(local.as_ref(), &record.version()) {
                Resolution::TakeRemote => {
                    stored.insert(slot, record);
                    response.applied += 1;
                }
                Resolution::KeepLocal | Resolution::Identical => response.superseded += 1,
            }
        }
        Ok(response)
    }
}

fn weak(replica: &Arc<MemoryReplica>) -> Weak<dyn ReplicaStore> {
    let weak = Arc::downgrade(replica);
    weak
}

fn engine_on(network: &LoopbackNetwork, replica: &Arc<MemoryReplica>) -> SyncEngine {
    network.register(weak(replica));
    let transport = Arc::new(network.transport(STORE, replica.device.clone()));
    SyncEngine::new(SyncConfig::new(), transport, weak(replica))
}

#[tokio::test]
async fn push_only_moves_local_records_to_peer() {
    let network = LoopbackNetwork::new();
    let phone = MemoryReplica::new("phone");
    let tablet = MemoryReplica::new("tablet");
    let engine = engine_on(&network, &phone);
    let _tablet_engine = engine_on(&network, &tablet);

    phone.put("k1", "from phone");
    tablet.put("k2", "from tablet");

    let report = engine
        .run_cycle(vec![tablet.device.clone()], SyncMode::PushOnly, None)
        .await;

    assert_eq!(report.results, vec![(tablet.device.clone(), SyncStatus::Success)]);
    assert_eq!(report.pushed, 1);
    assert_eq!(report.pulled, 0);
    assert_eq!(
        tablet.get(&phone.device, "k1"),
        Some(TypedValue::from("from phone"))
    );
    assert_eq!(phone.get(&tablet.device, "k2"), None);
    assert_eq!(engine.state(), SyncState::Completed);
}

#[tokio::test]
async fn pull_only_fetches_peer_records() {
    let network = LoopbackNetwork::new();
    let phone = MemoryReplica::new("phone");
    let tablet = MemoryReplica::new("tablet");
    let engine = engine_on(&network, &phone);
    let _tablet_engine = engine_on(&network, &tablet);

    phone.put("k1", "from phone");
    tablet.put("k2", "from tablet");

    let report = engine
        .run_cycle(vec![tablet.device.clone()], SyncMode::PullOnly, None)
        .await;

    assert!(report.all_succeeded());
    assert_eq!(report.pulled, 1);
    assert_eq!(
        phone.get(&tablet.device, "k2"),
        Some(TypedValue::from("from tablet"))
    );
    assert_eq!(tablet.get(&phone.device, "k1"), None);
}

#[tokio::test]
async fn push_pull_converges_both_sides() {
    let network = LoopbackNetwork::new();
    let phone = MemoryReplica::new("phone");
    let tablet = MemoryReplica::new("tablet");
    let engine = engine_on(&network, &phone);
    let _tablet_engine = engine_on(&network, &tablet);

    phone.put("a", "1");
    tablet.put("b", "2");

    engine
        .run_cycle(vec![tablet.device.clone()], SyncMode::PushPull, None)
        .await;

    assert_eq!(phone.len(), 2);
    assert_eq!(tablet.len(), 2);

    // A second cycle has nothing new to apply.
    let report = engine
        .run_cycle(vec![tablet.device.clone()], SyncMode::PushPull, None)
        .await;
    assert!(report.all_succeeded());
    assert_eq!(tablet.len(), 2);
    assert_eq!(engine.stats().cycles_completed, 2);
}

#[tokio::test]
async fn newer_version_wins_on_merge() {
    let network = LoopbackNetwork::new();
    let phone = MemoryReplica::new("phone");
    let tablet = MemoryReplica::new("tablet");
    let engine = engine_on(&network, &phone);
    let _tablet_engine = engine_on(&network, &tablet);

    phone.put("k", "old");
    engine
        .run_cycle(vec![tablet.device.clone()], SyncMode::PushOnly, None)
        .await;
    phone.put("k", "new");
    engine
        .run_cycle(vec![tablet.device.clone()], SyncMode::PushOnly, None)
        .await;

    assert_eq!(tablet.get(&phone.device, "k"), Some(TypedValue::from("new")));
}

#[tokio::test]
async fn offline_peer_is_unreachable_without_blocking_others() {
    let network = LoopbackNetwork::new();
    let phone = MemoryReplica::new("phone");
    let tablet = MemoryReplica::new("tablet");
    let watch = MemoryReplica::new("watch");
    let engine = engine_on(&network, &phone);
    let _tablet_engine = engine_on(&network, &tablet);
    let _watch_engine = engine_on(&network, &watch);
    network.set_online(&watch.device, false);

    phone.put("k", "v");
    let ghost = DeviceId::new("ghost").unwrap();
    let report = engine
        .run_cycle(
            vec![watch.device.clone(), tablet.device.clone(), ghost.clone()],
            SyncMode::PushOnly,
            None,
        )
        .await;

    assert_eq!(report.status_of(&watch.device), Some(SyncStatus::Unreachable));
    assert_eq!(report.status_of(&tablet.device), Some(SyncStatus::Success));
    assert_eq!(report.status_of(&ghost), Some(SyncStatus::Unreachable));
    assert_eq!(tablet.len(), 1);
    assert_eq!(watch.len(), 0);
    assert_eq!(engine.state(), SyncState::Failed);
    assert!(engine.stats().last_error.is_some());
    assert_eq!(engine.online_peers(), vec![tablet.device.clone()]);
}

#[tokio::test]
async fn slow_peer_times_out() {
    let network = LoopbackNetwork::new();
    let phone = MemoryReplica::new("phone");
    let tablet = MemoryReplica::new("tablet");
    let engine = engine_on(&network, &phone);
    let _tablet_engine = engine_on(&network, &tablet);
    engine.set_timeout(Duration::from_millis(50));
    network.set_latency(&tablet.device, Duration::from_secs(2));

    let report = engine
        .run_cycle(vec![tablet.device.clone()], SyncMode::PushPull, None)
        .await;

    assert_eq!(report.status_of(&tablet.device), Some(SyncStatus::Timeout));
}

#[tokio::test]
async fn sync_range_limits_exchanged_labels() {
    let network = LoopbackNetwork::new();
    let range = SyncRange::new(["albums", "faces"], ["albums"]);
    let phone = MemoryReplica::with_range("phone", Some(range));
    let tablet = MemoryReplica::new("tablet");
    let engine = engine_on(&network, &phone);
    let _tablet_engine = engine_on(&network, &tablet);

    phone.put("albums:1", "beach");
    phone.put("faces:1", "alice");
    phone.put("untagged", "x");

    let report = engine
        .run_cycle(vec![tablet.device.clone()], SyncMode::PushOnly, None)
        .await;

    assert_eq!(report.pushed, 1);
    assert!(tablet.get(&phone.device, "albums:1").is_some());
    assert!(tablet.get(&phone.device, "faces:1").is_none());
    assert!(tablet.get(&phone.device, "untagged").is_none());
}

#[tokio::test]
async fn mock_transport_records_requests() {
    let phone = MemoryReplica::new("phone");
    let tablet = DeviceId::new("tablet").unwrap();
    let transport = Arc::new(MockTransport::new());
    transport.set_reply(
        tablet.clone(),
        MockReply::Message(SyncMessage::PushResponse(PushResponse {
            applied: 1,
            superseded: 0,
        })),
    );
    let engine = SyncEngine::new(SyncConfig::new(), transport.clone(), weak(&phone));

    phone.put("k", "v");
    let report = engine
        .run_cycle(vec![tablet.clone()], SyncMode::PushOnly, None)
        .await;

    assert!(report.all_succeeded());
    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    match &sent[0] {
        (peer, SyncMessage::PushRequest(request)) => {
            assert_eq!(peer, &tablet);
            assert_eq!(request.store_id, STORE);
            assert_eq!(request.records.len(), 1);
        }
        other => panic!("unexpected request {other:?}"),
    }
}

#[tokio::test]
async fn hanging_mock_peer_times_out() {
    let phone = MemoryReplica::new("phone");
    let tablet = DeviceId::new("tablet").unwrap();
    let transport = Arc::new(MockTransport::new());
    transport.set_reply(tablet.clone(), MockReply::Hang);
    let config = SyncConfig::new().with_timeout(Duration::from_millis(20));
    let engine = SyncEngine::new(config, transport, weak(&phone));

    let report = engine.run_cycle(vec![tablet.clone()], SyncMode::PullOnly, None).await;
    assert_eq!(report.status_of(&tablet), Some(SyncStatus::Timeout));
}

#[tokio::test]
async fn cancelled_engine_reports_cancelled() {
    let network = LoopbackNetwork::new();
    let phone = MemoryReplica::new("phone");
    let tablet = MemoryReplica::new("tablet");
    let engine = engine_on(&network, &phone);
    let _tablet_engine = engine_on(&network, &tablet);

    engine.cancel();
    let report = engine
        .run_cycle(vec![tablet.device.clone()], SyncMode::PushPull, None)
        .await;
    assert_eq!(report.status_of(&tablet.device), Some(SyncStatus::Cancelled));
}

#[tokio::test]
async fn dropped_replica_cancels_cycle() {
    let network = LoopbackNetwork::new();
    let phone = MemoryReplica::new("phone");
    let engine = engine_on(&network, &phone);
    let tablet = DeviceId::new("tablet").unwrap();
    drop(phone);

    let report = engine.run_cycle(vec![tablet.clone()], SyncMode::PushOnly, None).await;
    assert_eq!(report.status_of(&tablet), Some(SyncStatus::Cancelled));
}

#[tokio::test]
async fn wrong_store_is_rejected_by_responder() {
    let tablet = MemoryReplica::new("tablet");
    let request = SyncMessage::PullRequest(devkv_sync_protocol::PullRequest {
        store_id: "other".into(),
        requester: DeviceId::new("phone").unwrap(),
        labels: None,
    });
    let reply = devkv_sync_engine::respond(tablet.as_ref(), &request.encode().unwrap());
    match SyncMessage::decode(&reply).unwrap() {
        SyncMessage::Error(error) => assert!(error.message.contains("other")),
        other => panic!("expected error, got {other:?}"),
    }
}

#[tokio::test]
#[traced_test]
async fn cycle_is_logged() {
    let network = LoopbackNetwork::new();
    let phone = MemoryReplica::new("phone");
    let engine = engine_on(&network, &phone);

    let report = engine.run_cycle(Vec::new(), SyncMode::PushPull, None).await;
    assert!(report.results.is_empty());
    assert!(logs_contain("sync cycle finished"));
}

#[test]
fn error_status_mapping() {
    let device = DeviceId::new("tv").unwrap();
    assert_eq!(
        SyncError::Unreachable { device }.status(),
        SyncStatus::Unreachable
    );
    assert_eq!(SyncError::Cancelled.status(), SyncStatus::Cancelled);
}
