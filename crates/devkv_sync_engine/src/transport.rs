//! Transport abstraction for device-to-device frames.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use devkv_sync_protocol::{DeviceId, SyncMessage};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Moves encoded protocol frames between devices.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Sends a request frame to `peer` and waits for its reply frame.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Unreachable`] when the peer cannot be reached,
    /// or a transport error.
    async fn exchange(&self, peer: &DeviceId, frame: Vec<u8>) -> SyncResult<Vec<u8>>;

    /// Peers currently reachable for this store.
    fn online_peers(&self) -> Vec<DeviceId>;
}

/// Scripted behaviour of one peer behind a [`MockTransport`].
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Answer every request with this message.
    Message(SyncMessage),
    /// Fail with [`SyncError::Unreachable`].
    Unreachable,
    /// Never answer.
    Hang,
}

/// A transport with scripted peers that records every request it carries.
#[derive(Debug, Default)]
pub struct MockTransport {
    replies: Mutex<HashMap<DeviceId, MockReply>>,
    sent: Mutex<Vec<(DeviceId, SyncMessage)>>,
}

impl MockTransport {
    /// Creates a transport where every peer is unreachable.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts how `peer` answers.
    pub fn set_reply(&self, peer: DeviceId, reply: MockReply) {
        self.replies.lock().insert(peer, reply);
    }

    /// Requests carried so far, decoded.
    pub fn sent(&self) -> Vec<(DeviceId, SyncMessage)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl SyncTransport for MockTransport {
    async fn exchange(&self, peer: &DeviceId, frame: Vec<u8>) -> SyncResult<Vec<u8>> {
        let request = SyncMessage::decode(&frame)?;
        self.sent.lock().push((peer.clone(), request));

        let reply = self.replies.lock().get(peer).cloned();
        match reply {
            Some(MockReply::Message(message)) => Ok(message.encode()?),
            Some(MockReply::Hang) => std::future::pending().await,
            Some(MockReply::Unreachable) | None => Err(SyncError::Unreachable {
                device: peer.clone(),
            }),
        }
    }

    fn online_peers(&self) -> Vec<DeviceId> {
        self.replies
            .lock()
            .iter()
            .filter(|(_, reply)| !matches!(reply, MockReply::Unreachable))
            .map(|(peer, _)| peer.clone())
            .collect()
    }
}
