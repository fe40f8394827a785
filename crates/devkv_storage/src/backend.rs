//! The byte store every store log sits on.

use crate::error::StorageResult;

/// Append-only bytes with random reads and tail truncation.
///
/// An offset returned by `append` stays valid until a `truncate` cuts below
/// it. Bytes appended before a successful `sync` survive a crash.
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::ReadPastEnd`] if the range is not fully
    /// inside the stored bytes, or an I/O error.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Writes `data` after the last byte and returns where it starts.
    ///
    /// # Errors
    ///
    /// I/O failures, or [`crate::StorageError::ReadOnly`] on a read-only handle.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Hands buffered bytes to the OS without waiting for the disk.
    ///
    /// # Errors
    ///
    /// I/O failures.
    fn flush(&mut self) -> StorageResult<()>;

    /// Current length, which is also the offset of the next append.
    ///
    /// # Errors
    ///
    /// Backends that have to ask the OS may fail here.
    fn size(&self) -> StorageResult<u64>;

    /// Blocks until appended bytes are on stable storage.
    ///
    /// # Errors
    ///
    /// I/O failures; the log treats them as a failed write.
    fn sync(&mut self) -> StorageResult<()>;

    /// Drops every byte at or after `new_size`.
    ///
    /// Used to cut a torn tail off a store log during recovery.
    ///
    /// # Errors
    ///
    /// Fails if `new_size` is greater than the current size or on I/O errors.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Reads the whole content.
    ///
    /// # Errors
    ///
    /// Propagates [`size`](Self::size) and [`read_at`](Self::read_at) errors.
    fn read_all(&self) -> StorageResult<Vec<u8>> {
        let size = self.size()?;
        let len = usize::try_from(size).map_err(|_| crate::StorageError::ReadPastEnd {
            offset: 0,
            len: usize::MAX,
            size,
        })?;
        self.read_at(0, len)
    }
}
