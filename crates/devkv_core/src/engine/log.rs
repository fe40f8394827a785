//! Append-only commit log on a storage backend.

use super::frame::{encode_frame, scan, LogBatch};
use crate::crypto::CryptoManager;
use crate::error::KvResult;
use devkv_storage::StorageBackend;

/// The durable record of every batch applied to a store.
///
/// A batch is durable once [`append`](Self::append) returns. A failed
/// append leaves the log as it was.
pub struct CommitLog {
    backend: Box<dyn StorageBackend>,
    cipher: Option<CryptoManager>,
    aad: Vec<u8>,
    frames: u64,
}

impl std::fmt::Debug for CommitLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitLog")
            .field("encrypted", &self.cipher.is_some())
            .field("frames", &self.frames)
            .finish_non_exhaustive()
    }
}

impl CommitLog {
    /// Opens the log and returns the batches it holds.
    ///
    /// A damaged tail is cut off so that new frames follow the last intact one.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors, on intact frames that cannot be decoded, and on
    /// encrypted frames when no (or the wrong) cipher is given.
    pub fn open(
        mut backend: Box<dyn StorageBackend>,
        cipher: Option<CryptoManager>,
        aad: Vec<u8>,
    ) -> KvResult<(Self, Vec<LogBatch>)> {
        let data = backend.read_all()?;
        let scan = scan(&data, cipher.as_ref(), &aad)?;
        if let Some(damage) = &scan.damage {
            tracing::warn!(
                %damage,
                dropped = data.len() as u64 - scan.valid_len,
                "truncating damaged log tail"
            );
            backend.truncate(scan.valid_len)?;
            backend.sync()?;
        }
        tracing::debug!(frames = scan.frames, bytes = scan.valid_len, "log replayed");

        let log = Self {
            backend,
            cipher,
            aad,
            frames: scan.frames as u64,
        };
        Ok((log, scan.batches))
    }

    /// Durably appends one batch.
    ///
    /// # Errors
    ///
    /// Fails if the frame cannot be encoded or written. Bytes of a partially
    /// written frame are removed before returning.
    pub fn append(&mut self, batch: &LogBatch) -> KvResult<()> {
        let frame = encode_frame(batch, self.cipher.as_ref(), &self.aad)?;
        let before = self.backend.size()?;
        let written = self
            .backend
            .append(&frame)
            .and_then(|_| self.backend.flush())
            .and_then(|()| self.backend.sync());
        if let Err(e) = written {
            if let Err(undo) = self.backend.truncate(before) {
                tracing::warn!(error = %undo, "could not remove partial frame");
            }
            return Err(e.into());
        }
        self.frames += 1;
        Ok(())
    }

    /// Number of frames in the log.
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Log size in bytes.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn size(&self) -> KvResult<u64> {
        Ok(self.backend.size()?)
    }

    /// Returns true if frames are sealed.
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KvError;
    use devkv_storage::{FaultSwitch, FaultyBackend, InMemoryBackend};
    use devkv_sync_protocol::DeviceId;

    fn purge(device: &str) -> LogBatch {
        LogBatch::Purge(DeviceId::new(device).unwrap())
    }

    #[test]
    fn append_then_reopen() {
        let backend = InMemoryBackend::new();
        let (mut log, batches) =
            CommitLog::open(Box::new(backend.share()), None, b"s".to_vec()).unwrap();
        assert!(batches.is_empty());
        log.append(&purge("a")).unwrap();
        log.append(&purge("b")).unwrap();
        assert_eq!(log.frames(), 2);
        drop(log);

        let (log, batches) = CommitLog::open(Box::new(backend), None, b"s".to_vec()).unwrap();
        assert_eq!(log.frames(), 2);
        assert_eq!(batches, vec![purge("a"), purge("b")]);
    }

    #[test]
    fn damaged_tail_is_truncated_on_open() {
        let backend = InMemoryBackend::new();
        let (mut log, _) = CommitLog::open(Box::new(backend.share()), None, Vec::new()).unwrap();
        log.append(&purge("a")).unwrap();
        let good = log.size().unwrap();
        drop(log);

        let mut raw = backend.share();
        raw.append(b"DKVL\x01\x00\xff").unwrap();

        let (log, batches) = CommitLog::open(Box::new(backend.share()), None, Vec::new()).unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(log.size().unwrap(), good);
        assert_eq!(backend.data().len() as u64, good);
    }

    #[test]
    fn failed_append_leaves_log_unchanged() {
        let backend = InMemoryBackend::new();
        let switch = FaultSwitch::new();
        let faulty = FaultyBackend::new(Box::new(backend.share()), switch.clone());
        let (mut log, _) = CommitLog::open(Box::new(faulty), None, Vec::new()).unwrap();
        log.append(&purge("a")).unwrap();
        let size = log.size().unwrap();

        switch.fail_writes();
        assert!(matches!(log.append(&purge("b")), Err(KvError::Storage(_))));
        assert_eq!(log.size().unwrap(), size);
        assert_eq!(log.frames(), 1);

        switch.heal();
        log.append(&purge("c")).unwrap();
        let (_, batches) = CommitLog::open(Box::new(backend), None, Vec::new()).unwrap();
        assert_eq!(batches, vec![purge("a"), purge("c")]);
    }
}
