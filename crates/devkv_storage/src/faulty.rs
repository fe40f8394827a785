//! Fault injection wrapper.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared switch that arms failures on a [`FaultyBackend`].
#[derive(Debug, Clone, Default)]
pub struct FaultSwitch {
    fail_writes: Arc<AtomicBool>,
}

impl FaultSwitch {
    /// Creates a disarmed switch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following append, flush and sync fail.
    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    /// Lets writes through again.
    pub fn heal(&self) {
        self.fail_writes.store(false, Ordering::SeqCst);
    }

    fn writes_fail(&self) -> bool {
        self.fail_writes.load(Ordering::SeqCst)
    }
}

/// Wraps a backend and fails writes while its [`FaultSwitch`] is armed.
///
/// A failed append writes nothing, so the wrapped backend never holds a
/// partial frame.
pub struct FaultyBackend {
    inner: Box<dyn StorageBackend>,
    switch: FaultSwitch,
}

impl FaultyBackend {
    /// Wraps `inner`, controlled by `switch`.
    pub fn new(inner: Box<dyn StorageBackend>, switch: FaultSwitch) -> Self {
        Self { inner, switch }
    }

    fn check(&self, operation: &'static str) -> StorageResult<()> {
        if self.switch.writes_fail() {
            tracing::debug!(operation, "injected storage failure");
            return Err(StorageError::Injected { operation });
        }
        Ok(())
    }
}

impl std::fmt::Debug for FaultyBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultyBackend")
            .field("switch", &self.switch)
            .finish_non_exhaustive()
    }
}

impl StorageBackend for FaultyBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        self.check("append")?;
        self.inner.append(data)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.check("flush")?;
        self.inner.flush()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.check("sync")?;
        self.inner.sync()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.inner.truncate(new_size)
    }
}
