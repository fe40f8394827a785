//! Transaction state and the pending operation log.

use crate::engine::WriteOp;
use crate::types::Key;
use devkv_codec::TypedValue;

/// Lifecycle of a transaction.
///
/// `Committed` and `RolledBack` are terminal; the owning store handle
/// returns to `Inactive` and can start a new transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionState {
    /// No transaction is open.
    #[default]
    Inactive,
    /// Mutations are being buffered.
    Active,
    /// The buffered mutations were applied.
    Committed,
    /// The buffered mutations were discarded.
    RolledBack,
}

impl TransactionState {
    /// Returns true for `Committed` and `RolledBack`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack)
    }
}

/// A mutation buffered inside a transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingOp {
    /// `put(key, value)`.
    Put(Key, TypedValue),
    /// `delete(key)`.
    Delete(Key),
    /// `put_batch(entries)`.
    PutBatch(Vec<(Key, TypedValue)>),
    /// `delete_batch(keys)`.
    DeleteBatch(Vec<Key>),
}

impl PendingOp {
    /// Expands the operation into single-key writes, preserving order.
    #[must_use]
    pub fn into_writes(self) -> Vec<WriteOp> {
        match self {
            Self::Put(key, value) => vec![WriteOp::Put(key, value)],
            Self::Delete(key) => vec![WriteOp::Delete(key)],
            Self::PutBatch(entries) => entries
                .into_iter()
                .map(|(key, value)| WriteOp::Put(key, value))
                .collect(),
            Self::DeleteBatch(keys) => keys.into_iter().map(WriteOp::Delete).collect(),
        }
    }

    /// Number of keys the operation touches.
    #[must_use]
    pub fn key_count(&self) -> usize {
        match self {
            Self::Put(..) | Self::Delete(_) => 1,
            Self::PutBatch(entries) => entries.len(),
            Self::DeleteBatch(keys) => keys.len(),
        }
    }
}

/// An open transaction: an append-only log of pending operations.
#[derive(Debug)]
pub struct Transaction {
    id: u64,
    ops: Vec<PendingOp>,
}

impl Transaction {
    pub(crate) fn new(id: u64) -> Self {
        Self {
            id,
            ops: Vec::new(),
        }
    }

    /// Transaction id, unique per store handle.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Buffered operations in submission order.
    #[must_use]
    pub fn ops(&self) -> &[PendingOp] {
        &self.ops
    }

    pub(crate) fn push(&mut self, op: PendingOp) {
        self.ops.push(op);
    }

    /// Flattens the log into one ordered write batch.
    #[must_use]
    pub fn into_writes(self) -> Vec<WriteOp> {
        self.ops.into_iter().flat_map(PendingOp::into_writes).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_ops_flatten_in_order() {
        let mut txn = Transaction::new(1);
        txn.push(PendingOp::PutBatch(vec![
            (Key::from("a"), TypedValue::Integer(1)),
            (Key::from("b"), TypedValue::Integer(2)),
        ]));
        txn.push(PendingOp::Delete(Key::from("a")));
        txn.push(PendingOp::DeleteBatch(vec![Key::from("b"), Key::from("c")]));

        assert_eq!(txn.ops().iter().map(PendingOp::key_count).sum::<usize>(), 5);
        let writes = txn.into_writes();
        assert_eq!(writes.len(), 5);
        assert_eq!(writes[0], WriteOp::Put(Key::from("a"), TypedValue::Integer(1)));
        assert_eq!(writes[2], WriteOp::Delete(Key::from("a")));
        assert_eq!(writes[4], WriteOp::Delete(Key::from("c")));
    }

    #[test]
    fn terminal_states() {
        assert!(TransactionState::Committed.is_terminal());
        assert!(TransactionState::RolledBack.is_terminal());
        assert!(!TransactionState::Active.is_terminal());
        assert_eq!(TransactionState::default(), TransactionState::Inactive);
    }
}
