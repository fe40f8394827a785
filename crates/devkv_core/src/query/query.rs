//! Query description.

use super::predicate::{EntryFilter, Predicate};
use crate::types::{DeviceId, Entry, Key};
use std::sync::Arc;

/// An immutable-once-built filter over store entries: key prefix, origin
/// device, value predicate, and paging.
///
/// A query is plain data. It is evaluated when a result is created and the
/// result does not follow later store changes.
///
/// ```
/// use devkv_core::{Predicate, Query, TypedValue};
///
/// let query = Query::new()
///     .prefix_key("sensor:")
///     .predicate(Predicate::GreaterThan(TypedValue::Double(20.0)))
///     .limit(10, 0);
/// assert_eq!(query.prefix().as_bytes(), b"sensor:");
/// ```
#[derive(Debug, Clone, Default)]
pub struct Query {
    prefix: Key,
    device: Option<DeviceId>,
    predicate: Option<Predicate>,
    filter: Option<Arc<dyn EntryFilter>>,
    limit: Option<(usize, usize)>,
    descending: bool,
}

impl Query {
    /// A query matching every entry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries written by `device` whose key starts with `prefix`.
    #[must_use]
    pub fn scoped(device: DeviceId, prefix: impl Into<Key>) -> Self {
        Self::new().device_id(device).prefix_key(prefix)
    }

    /// Restricts to keys starting with `prefix`.
    #[must_use]
    pub fn prefix_key(mut self, prefix: impl Into<Key>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Restricts to entries whose origin is `device`.
    #[must_use]
    pub fn device_id(mut self, device: DeviceId) -> Self {
        self.device = Some(device);
        self
    }

    /// Adds a value predicate; repeated calls are combined with AND.
    #[must_use]
    pub fn predicate(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(match self.predicate.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    /// Adds an externally defined filter.
    #[must_use]
    pub fn filter(mut self, filter: Arc<dyn EntryFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Keeps at most `total` entries after skipping `offset`.
    #[must_use]
    pub fn limit(mut self, total: usize, offset: usize) -> Self {
        self.limit = Some((total, offset));
        self
    }

    /// Orders results by ascending key, the default.
    #[must_use]
    pub fn order_by_key_asc(mut self) -> Self {
        self.descending = false;
        self
    }

    /// Orders results by descending key.
    #[must_use]
    pub fn order_by_key_desc(mut self) -> Self {
        self.descending = true;
        self
    }

    /// Clears every condition.
    #[must_use]
    pub fn reset(self) -> Self {
        Self::default()
    }

    /// Key prefix; empty matches everything.
    #[must_use]
    pub fn prefix(&self) -> &Key {
        &self.prefix
    }

    /// Origin device restriction.
    #[must_use]
    pub fn device(&self) -> Option<&DeviceId> {
        self.device.as_ref()
    }

    /// Returns true if `entry` passes prefix, device, predicate and filter.
    /// Paging is not considered.
    #[must_use]
    pub fn matches(&self, entry: &Entry) -> bool {
        entry.key.starts_with(self.prefix.as_bytes())
            && self.device.as_ref().map_or(true, |d| entry.origin == *d)
            && self.predicate.as_ref().map_or(true, |p| p.matches(entry))
            && self.filter.as_ref().map_or(true, |f| f.matches(entry))
    }

    /// Filters, orders and pages `entries`, which must be sorted by key.
    #[must_use]
    pub fn apply(&self, entries: Vec<Entry>) -> Vec<Entry> {
        let mut selected: Vec<Entry> = entries.into_iter().filter(|e| self.matches(e)).collect();
        if self.descending {
            selected.reverse();
        }
        match self.limit {
            Some((total, offset)) => selected.into_iter().skip(offset).take(total).collect(),
            None => selected,
        }
    }
}

impl From<&str> for Query {
    fn from(prefix: &str) -> Self {
        Self::new().prefix_key(prefix)
    }
}

impl From<Key> for Query {
    fn from(prefix: Key) -> Self {
        Self::new().prefix_key(prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devkv_codec::TypedValue;

    fn entry(key: &str, value: i32, origin: &str) -> Entry {
        Entry::new(key, value, DeviceId::new(origin).unwrap())
    }

    fn sample() -> Vec<Entry> {
        vec![
            entry("a:1", 1, "phone"),
            entry("a:2", 2, "tablet"),
            entry("a:3", 3, "phone"),
            entry("b:1", 4, "phone"),
        ]
    }

    fn keys(entries: &[Entry]) -> Vec<String> {
        entries.iter().map(|e| e.key.to_string()).collect()
    }

    #[test]
    fn prefix_and_device() {
        let q = Query::scoped(DeviceId::new("phone").unwrap(), "a:");
        assert_eq!(keys(&q.apply(sample())), vec!["a:1", "a:3"]);
        assert_eq!(Query::from("b").apply(sample()).len(), 1);
        assert_eq!(Query::new().apply(sample()).len(), 4);
    }

    #[test]
    fn predicates_accumulate() {
        let q = Query::new()
            .predicate(Predicate::GreaterThan(TypedValue::Integer(1)))
            .predicate(Predicate::LessThan(TypedValue::Integer(4)));
        assert_eq!(keys(&q.apply(sample())), vec!["a:2", "a:3"]);
    }

    #[test]
    fn paging_and_order() {
        let q = Query::new().order_by_key_desc().limit(2, 1);
        assert_eq!(keys(&q.apply(sample())), vec!["a:3", "a:2"]);
        assert!(Query::new().limit(5, 10).apply(sample()).is_empty());

        let back = Query::new().order_by_key_desc().limit(2, 1).order_by_key_asc();
        assert_eq!(keys(&back.apply(sample())), vec!["a:2", "a:3"]);
    }

    #[derive(Debug)]
    struct EvenOnly;

    impl EntryFilter for EvenOnly {
        fn matches(&self, entry: &Entry) -> bool {
            matches!(entry.value, TypedValue::Integer(n) if n % 2 == 0)
        }
    }

    #[test]
    fn external_filter() {
        let q = Query::new().filter(Arc::new(EvenOnly));
        assert_eq!(keys(&q.apply(sample())), vec!["a:2", "b:1"]);
        assert_eq!(q.reset().apply(sample()).len(), 4);
    }
}
