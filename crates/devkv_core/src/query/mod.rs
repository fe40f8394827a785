//! Query engine: filters, predicates and result set cursors.

mod predicate;
mod query;
mod result_set;

pub use predicate::{EntryFilter, Predicate};
pub use query::Query;
pub use result_set::ResultSet;
