//! Error types for the sync engine.

use devkv_sync_protocol::{DeviceId, ProtocolError, SyncStatus};
use std::time::Duration;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during a sync exchange.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The transport broke down for a reason other than reachability.
    #[error("transport error: {0}")]
    Transport(String),

    /// The peer is offline or unknown to the transport.
    #[error("device {device} is unreachable")]
    Unreachable {
        /// Peer that could not be reached.
        device: DeviceId,
    },

    /// The peer did not answer in time.
    #[error("device {device} did not answer within {after:?}")]
    Timeout {
        /// Peer that timed out.
        device: DeviceId,
        /// Configured limit.
        after: Duration,
    },

    /// Malformed frame.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The peer answered with an error response.
    #[error("remote error: {0}")]
    Remote(String),

    /// The local replica could not export or merge records.
    #[error("replica error: {0}")]
    Replica(String),

    /// The replica was closed while the cycle was running.
    #[error("sync cancelled")]
    Cancelled,

    /// Invalid state transition.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },
}

impl SyncError {
    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Creates a replica error.
    pub fn replica(message: impl Into<String>) -> Self {
        Self::Replica(message.into())
    }

    /// Status reported to sync-complete watchers for this failure.
    pub fn status(&self) -> SyncStatus {
        match self {
            Self::Unreachable { .. } => SyncStatus::Unreachable,
            Self::Timeout { .. } => SyncStatus::Timeout,
            Self::Cancelled => SyncStatus::Cancelled,
            _ => SyncStatus::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses() {
        let device = DeviceId::new("tv").unwrap();
        assert_eq!(
            SyncError::Unreachable {
                device: device.clone()
            }
            .status(),
            SyncStatus::Unreachable
        );
        assert_eq!(
            SyncError::Timeout {
                device,
                after: Duration::from_millis(5)
            }
            .status(),
            SyncStatus::Timeout
        );
        assert_eq!(SyncError::Remote("nope".into()).status(), SyncStatus::Failed);
        assert_eq!(SyncError::transport("reset").status(), SyncStatus::Failed);
        assert_eq!(SyncError::Cancelled.status(), SyncStatus::Cancelled);
    }
}
