//! Explicit transactions.
//!
//! A transaction buffers mutations in an append-only operation log. Commit
//! turns the log into a single engine batch, so readers see either none or
//! all of it; rollback drops the log without touching the engine.

mod manager;
mod state;

pub use manager::TransactionSlot;
pub use state::{PendingOp, Transaction, TransactionState};
