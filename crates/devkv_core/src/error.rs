//! Error types for DevKV stores.

use devkv_sync_protocol::DeviceId;
use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type KvResult<T> = Result<T, KvError>;

/// Errors returned by stores and the manager.
#[derive(Debug, Error)]
pub enum KvError {
    /// Wrong type, arity or range. Detected before any I/O.
    #[error("invalid argument: {message}")]
    ArgumentInvalid {
        /// What was wrong.
        message: String,
    },

    /// Key is empty, blank or too long.
    #[error("invalid key: {message}")]
    KeyInvalid {
        /// What was wrong.
        message: String,
    },

    /// Encoded value exceeds the size limit.
    #[error("value too large: {size} bytes exceeds maximum of {max} bytes")]
    ValueTooLarge {
        /// Encoded payload size.
        size: usize,
        /// Allowed maximum.
        max: usize,
    },

    /// No live entry under the key for the requested device.
    #[error("key not found")]
    KeyNotFound,

    /// A transaction is already active on this store handle.
    #[error("a transaction is already active")]
    TransactionAlreadyActive,

    /// Commit or rollback without an active transaction.
    #[error("no active transaction")]
    NoActiveTransaction,

    /// Commit could not be applied; nothing was changed.
    #[error("commit failed: {reason}")]
    CommitFailed {
        /// Underlying failure.
        reason: String,
    },

    /// Operation on a closed result set.
    #[error("result set is closed")]
    ResultSetClosed,

    /// No peer could be reached.
    #[error("no reachable peer")]
    SyncUnreachable,

    /// Device is not a known remote peer.
    #[error("unknown device: {device}")]
    DeviceUnknown {
        /// The device that was named.
        device: String,
    },

    /// Store does not exist and was not to be created.
    #[error("store not found: {store_id}")]
    StoreNotFound {
        /// Requested store.
        store_id: String,
    },

    /// The store handle was closed.
    #[error("store is closed")]
    StoreClosed,

    /// Another process holds the store directory.
    #[error("store locked: another process has exclusive access")]
    StoreLocked,

    /// The persisted log or metadata is unreadable.
    #[error("corruption: {message}")]
    Corruption {
        /// Description of the corruption.
        message: String,
    },

    /// Encryption or decryption failed.
    #[error("crypto error: {message}")]
    Crypto {
        /// Description of the failure.
        message: String,
    },

    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] devkv_storage::StorageError),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] devkv_codec::CodecError),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] devkv_sync_protocol::ProtocolError),

    /// Sync engine error.
    #[error("sync error: {0}")]
    Sync(#[from] devkv_sync_engine::SyncError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl KvError {
    /// Creates an invalid argument error.
    pub fn argument_invalid(message: impl Into<String>) -> Self {
        Self::ArgumentInvalid {
            message: message.into(),
        }
    }

    /// Creates an invalid key error.
    pub fn key_invalid(message: impl Into<String>) -> Self {
        Self::KeyInvalid {
            message: message.into(),
        }
    }

    /// Creates a commit failure wrapping `cause`.
    pub fn commit_failed(cause: impl std::fmt::Display) -> Self {
        Self::CommitFailed {
            reason: cause.to_string(),
        }
    }

    /// Creates an unknown device error.
    pub fn device_unknown(device: &DeviceId) -> Self {
        Self::DeviceUnknown {
            device: device.to_string(),
        }
    }

    /// Creates a corruption error.
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::Corruption {
            message: message.into(),
        }
    }

    /// Creates a crypto error.
    pub fn crypto(message: impl Into<String>) -> Self {
        Self::Crypto {
            message: message.into(),
        }
    }

    /// Returns true for errors raised by argument validation, which never
    /// have side effects.
    pub fn is_argument_error(&self) -> bool {
        matches!(
            self,
            Self::ArgumentInvalid { .. } | Self::KeyInvalid { .. } | Self::ValueTooLarge { .. }
        )
    }

    /// Returns true if the same call may succeed later without changes.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::StoreLocked | Self::SyncUnreachable => true,
            Self::Sync(inner) => matches!(
                inner,
                devkv_sync_engine::SyncError::Unreachable { .. }
                    | devkv_sync_engine::SyncError::Timeout { .. }
            ),
            _ => false,
        }
    }

    /// Returns true for errors about transaction state.
    pub fn is_transaction_error(&self) -> bool {
        matches!(
            self,
            Self::TransactionAlreadyActive | Self::NoActiveTransaction | Self::CommitFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(KvError::argument_invalid("bad").is_argument_error());
        assert!(KvError::key_invalid("empty").is_argument_error());
        assert!(KvError::ValueTooLarge { size: 9, max: 8 }.is_argument_error());
        assert!(!KvError::KeyNotFound.is_argument_error());
        assert!(KvError::NoActiveTransaction.is_transaction_error());
        assert!(KvError::commit_failed("disk full").is_transaction_error());
        assert!(KvError::StoreLocked.is_retryable());
        assert!(!KvError::KeyNotFound.is_retryable());
        let device = DeviceId::new("tv").unwrap();
        assert!(KvError::from(devkv_sync_engine::SyncError::Unreachable { device }).is_retryable());
        assert!(!KvError::from(devkv_sync_engine::SyncError::Cancelled).is_retryable());
    }

    #[test]
    fn messages() {
        let err = KvError::commit_failed("disk full");
        assert_eq!(err.to_string(), "commit failed: disk full");
        let device = DeviceId::new("tv").unwrap();
        assert_eq!(
            KvError::device_unknown(&device).to_string(),
            "unknown device: tv"
        );
    }
}
