//! The per-handle transaction slot.

use crate::error::{KvError, KvResult};
use crate::transaction::state::{PendingOp, Transaction, TransactionState};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Holds at most one active transaction for a store handle.
///
/// A second `begin` while a transaction is active is rejected, not queued.
/// Mutations issued while a transaction is active are buffered through
/// [`stage`](Self::stage) instead of being applied.
#[derive(Debug)]
pub struct TransactionSlot {
    next_id: AtomicU64,
    current: Mutex<Option<Transaction>>,
    last_outcome: Mutex<Option<TransactionState>>,
}

impl Default for TransactionSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionSlot {
    /// Creates an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            current: Mutex::new(None),
            last_outcome: Mutex::new(None),
        }
    }

    /// Opens a transaction and returns its id.
    ///
    /// # Errors
    ///
    /// `TransactionAlreadyActive` if one is open; nothing changes then.
    pub fn begin(&self) -> KvResult<u64> {
        let mut current = self.current.lock();
        if current.is_some() {
            return Err(KvError::TransactionAlreadyActive);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        *current = Some(Transaction::new(id));
        tracing::debug!(txn = id, "transaction started");
        Ok(id)
    }

    /// `Active` while a transaction is open, `Inactive` otherwise.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        if self.current.lock().is_some() {
            TransactionState::Active
        } else {
            TransactionState::Inactive
        }
    }

    /// Outcome of the most recently finished transaction.
    #[must_use]
    pub fn last_outcome(&self) -> Option<TransactionState> {
        *self.last_outcome.lock()
    }

    /// Buffers `op` if a transaction is active. Otherwise hands it back for
    /// direct application.
    pub fn stage(&self, op: PendingOp) -> Option<PendingOp> {
        match self.current.lock().as_mut() {
            Some(txn) => {
                txn.push(op);
                None
            }
            None => Some(op),
        }
    }

    /// Removes the active transaction for committing. The slot is free again
    /// once this returns; report the result with [`finish`](Self::finish).
    ///
    /// # Errors
    ///
    /// `NoActiveTransaction` if none is open.
    pub fn take(&self) -> KvResult<Transaction> {
        self.current.lock().take().ok_or(KvError::NoActiveTransaction)
    }

    /// Discards the active transaction. Returns the number of buffered
    /// operations dropped.
    ///
    /// # Errors
    ///
    /// `NoActiveTransaction` if none is open.
    pub fn rollback(&self) -> KvResult<usize> {
        let txn = self.take()?;
        let dropped = txn.ops().len();
        self.finish(TransactionState::RolledBack);
        tracing::debug!(txn = txn.id(), dropped, "transaction rolled back");
        Ok(dropped)
    }

    pub(crate) fn finish(&self, outcome: TransactionState) {
        *self.last_outcome.lock() = Some(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Key;

    #[test]
    fn only_one_active_transaction() {
        let slot = TransactionSlot::new();
        assert_eq!(slot.state(), TransactionState::Inactive);
        let first = slot.begin().unwrap();
        assert!(matches!(slot.begin(), Err(KvError::TransactionAlreadyActive)));
        assert_eq!(slot.state(), TransactionState::Active);

        slot.take().unwrap();
        let second = slot.begin().unwrap();
        assert!(second > first);
    }

    #[test]
    fn stage_buffers_only_while_active() {
        let slot = TransactionSlot::new();
        let op = PendingOp::Delete(Key::from("k"));
        assert_eq!(slot.stage(op.clone()), Some(op.clone()));

        slot.begin().unwrap();
        assert_eq!(slot.stage(op), None);
        let txn = slot.take().unwrap();
        assert_eq!(txn.ops().len(), 1);
    }

    #[test]
    fn rollback_and_commit_need_an_active_transaction() {
        let slot = TransactionSlot::new();
        assert!(matches!(slot.rollback(), Err(KvError::NoActiveTransaction)));
        assert!(matches!(slot.take(), Err(KvError::NoActiveTransaction)));

        slot.begin().unwrap();
        slot.stage(PendingOp::Delete(Key::from("k")));
        assert_eq!(slot.rollback().unwrap(), 1);
        assert_eq!(slot.last_outcome(), Some(TransactionState::RolledBack));
        assert_eq!(slot.state(), TransactionState::Inactive);
    }
}
