//! In-process network connecting replicas that live in one process.

use crate::error::{SyncError, SyncResult};
use crate::replica::ReplicaStore;
use crate::responder::respond;
use crate::transport::SyncTransport;
use async_trait::async_trait;
use devkv_sync_protocol::DeviceId;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;

type Endpoint = (String, DeviceId);

#[derive(Default)]
struct NetworkInner {
    endpoints: RwLock<HashMap<Endpoint, Weak<dyn ReplicaStore>>>,
    offline: RwLock<HashSet<DeviceId>>,
    latency: RwLock<HashMap<DeviceId, Duration>>,
}

/// A shared in-process network.
///
/// Replicas register under `(store id, device)`. A device can be taken
/// offline or given an artificial latency to exercise the unreachable and
/// timeout paths. Cloning yields another handle to the same network.
#[derive(Clone, Default)]
pub struct LoopbackNetwork {
    inner: Arc<NetworkInner>,
}

impl std::fmt::Debug for LoopbackNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackNetwork")
            .field("endpoints", &self.inner.endpoints.read().len())
            .field("offline", &self.inner.offline.read().len())
            .finish()
    }
}

impl LoopbackNetwork {
    /// Creates an empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `replica` reachable as its own `(store id, device)`.
    pub fn register(&self, replica: Weak<dyn ReplicaStore>) {
        let Some(strong) = replica.upgrade() else {
            return;
        };
        let endpoint = (
            strong.store_id().to_string(),
            strong.local_device().clone(),
        );
        tracing::debug!(store = %endpoint.0, device = %endpoint.1, "loopback endpoint registered");
        self.inner.endpoints.write().insert(endpoint, replica);
    }

    /// Removes the endpoint for `(store_id, device)`.
    pub fn unregister(&self, store_id: &str, device: &DeviceId) {
        self.inner
            .endpoints
            .write()
            .remove(&(store_id.to_string(), device.clone()));
    }

    /// Takes a device on or off the network.
    pub fn set_online(&self, device: &DeviceId, online: bool) {
        let mut offline = self.inner.offline.write();
        if online {
            offline.remove(device);
        } else {
            offline.insert(device.clone());
        }
    }

    /// Delays every reply sent by `device`.
    pub fn set_latency(&self, device: &DeviceId, latency: Duration) {
        self.inner.latency.write().insert(device.clone(), latency);
    }

    /// Returns true if `device` is not switched off.
    pub fn is_online(&self, device: &DeviceId) -> bool {
        !self.inner.offline.read().contains(device)
    }

    /// A transport for the replica of `store_id` on `local`.
    pub fn transport(&self, store_id: impl Into<String>, local: DeviceId) -> LoopbackTransport {
        LoopbackTransport {
            network: self.clone(),
            store_id: store_id.into(),
            local,
        }
    }

    fn route(
        &self,
        store_id: &str,
        from: &DeviceId,
        to: &DeviceId,
    ) -> SyncResult<(Arc<dyn ReplicaStore>, Duration)> {
        let unreachable = || SyncError::Unreachable { device: to.clone() };
        if !self.is_online(from) || !self.is_online(to) {
            return Err(unreachable());
        }
        let replica = self
            .inner
            .endpoints
            .read()
            .get(&(store_id.to_string(), to.clone()))
            .and_then(Weak::upgrade)
            .ok_or_else(unreachable)?;
        let latency = self
            .inner
            .latency
            .read()
            .get(to)
            .copied()
            .unwrap_or_default();
        Ok((replica, latency))
    }
}

/// One replica's view of a [`LoopbackNetwork`].
#[derive(Debug, Clone)]
pub struct LoopbackTransport {
    network: LoopbackNetwork,
    store_id: String,
    local: DeviceId,
}

#[async_trait]
impl SyncTransport for LoopbackTransport {
    async fn exchange(&self, peer: &DeviceId, frame: Vec<u8>) -> SyncResult<Vec<u8>> {
        let (replica, latency) = self.network.route(&self.store_id, &self.local, peer)?;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        tokio::task::spawn_blocking(move || respond(replica.as_ref(), &frame))
            .await
            .map_err(|e| SyncError::transport(format!("responder panicked: {e}")))
    }

    fn online_peers(&self) -> Vec<DeviceId> {
        if !self.network.is_online(&self.local) {
            return Vec::new();
        }
        let mut peers: Vec<DeviceId> = self
            .network
            .inner
            .endpoints
            .read()
            .iter()
            .filter(|((store, device), replica)| {
                *store == self.store_id
                    && *device != self.local
                    && replica.strong_count() > 0
            })
            .map(|((_, device), _)| device.clone())
            .filter(|device| self.network.is_online(device))
            .collect();
        peers.sort();
        peers
    }
}
