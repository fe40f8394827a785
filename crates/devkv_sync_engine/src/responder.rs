//! Answers incoming frames on behalf of a replica.

use crate::error::SyncError;
use crate::replica::ReplicaStore;
use devkv_sync_protocol::{
    ErrorResponse, PullRequest, PullResponse, PushRequest, SyncMessage,
};

/// Handles one request frame and returns the encoded reply.
///
/// Failures are answered with an error response rather than dropped, so the
/// requesting device can report them per peer.
pub fn respond(replica: &dyn ReplicaStore, frame: &[u8]) -> Vec<u8> {
    let reply = match SyncMessage::decode(frame) {
        Ok(SyncMessage::PushRequest(request)) => handle_push(replica, request),
        Ok(SyncMessage::PullRequest(request)) => handle_pull(replica, &request),
        Ok(other) => Err(SyncError::Remote(format!(
            "unexpected {} frame",
            other.name()
        ))),
        Err(e) => Err(SyncError::from(e)),
    };

    let reply = reply.unwrap_or_else(|e| {
        tracing::warn!(
            store = replica.store_id(),
            device = %replica.local_device(),
            error = %e,
            "rejecting sync request"
        );
        SyncMessage::Error(ErrorResponse {
            message: e.to_string(),
        })
    });
    reply.encode().unwrap_or_default()
}

fn check_store(replica: &dyn ReplicaStore, store_id: &str) -> Result<(), SyncError> {
    if store_id == replica.store_id() {
        Ok(())
    } else {
        Err(SyncError::Remote(format!(
            "store '{store_id}' is not served here"
        )))
    }
}

fn handle_push(replica: &dyn ReplicaStore, request: PushRequest) -> Result<SyncMessage, SyncError> {
    check_store(replica, &request.store_id)?;
    let sender = request.sender;
    let response = replica.merge_records(&sender, request.records)?;
    replica.peer_seen(&sender);
    tracing::debug!(
        store = replica.store_id(),
        from = %sender,
        applied = response.applied,
        superseded = response.superseded,
        "merged pushed records"
    );
    Ok(SyncMessage::PushResponse(response))
}

fn handle_pull(replica: &dyn ReplicaStore, request: &PullRequest) -> Result<SyncMessage, SyncError> {
    check_store(replica, &request.store_id)?;
    let mut records =
        replica.authored_records(replica.local_device(), request.labels.as_deref())?;
    if let Some(range) = replica.sync_range() {
        records.retain(|record| range.admits(&record.label));
    }
    replica.peer_seen(&request.requester);
    Ok(SyncMessage::PullResponse(PullResponse { records }))
}
