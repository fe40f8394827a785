//! Storage errors.

use std::io;
use thiserror::Error;

/// Result alias for backend operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Why a backend operation failed.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The operating system reported an error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The requested range is not fully inside the stored bytes.
    #[error("read of {len} bytes at offset {offset} passes the end ({size} bytes stored)")]
    ReadPastEnd {
        /// First requested byte.
        offset: u64,
        /// Requested length.
        len: usize,
        /// Bytes stored.
        size: u64,
    },

    /// `truncate` was asked to grow the content.
    #[error("cannot truncate to {requested} bytes, storage holds {size}")]
    InvalidTruncate {
        /// Requested size.
        requested: u64,
        /// Bytes stored.
        size: u64,
    },

    /// A write on a backend opened for reading only.
    #[error("{operation} on a read-only backend")]
    ReadOnly {
        /// Name of the rejected operation.
        operation: &'static str,
    },

    /// A fault armed on a [`crate::FaultyBackend`] fired.
    #[error("injected {operation} failure")]
    Injected {
        /// Name of the failing operation.
        operation: &'static str,
    },
}
