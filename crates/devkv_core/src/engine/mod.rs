//! Storage engine: the commit log and the index it rebuilds.

mod frame;
mod log;
mod store;

pub use frame::{scan, LogBatch, Scan, TailDamage};
pub use log::CommitLog;
pub use store::{ChangeSet, StoreEngine, WriteOp};
