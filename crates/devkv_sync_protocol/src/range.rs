//! Sync ranges and key partition labels.

use std::collections::BTreeSet;

/// Separator ending the partition label at the start of a key.
pub const LABEL_SEPARATOR: u8 = b':';

/// Partition label of a key: the bytes before the first [`LABEL_SEPARATOR`].
///
/// Keys without a separator belong to the empty label. Non UTF-8 label
/// bytes are replaced.
#[must_use]
pub fn partition_label(key: &[u8]) -> String {
    match key.iter().position(|b| *b == LABEL_SEPARATOR) {
        Some(end) => String::from_utf8_lossy(&key[..end]).into_owned(),
        None => String::new(),
    }
}

/// Labels a store agrees to exchange with peers.
///
/// Only entries whose label is both offered locally and supported remotely
/// take part in sync.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncRange {
    local: BTreeSet<String>,
    remote: BTreeSet<String>,
}

impl SyncRange {
    /// Creates a range from local labels and labels the remote side supports.
    pub fn new<L, R>(local: L, remote: R) -> Self
    where
        L: IntoIterator,
        L::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        Self {
            local: local.into_iter().map(Into::into).collect(),
            remote: remote.into_iter().map(Into::into).collect(),
        }
    }

    /// Labels present on both sides.
    #[must_use]
    pub fn labels(&self) -> BTreeSet<String> {
        self.local.intersection(&self.remote).cloned().collect()
    }

    /// Returns true if entries with `label` are exchanged.
    #[must_use]
    pub fn admits(&self, label: &str) -> bool {
        self.local.contains(label) && self.remote.contains(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_is_prefix_before_separator() {
        assert_eq!(partition_label(b"photos:1"), "photos");
        assert_eq!(partition_label(b"a:b:c"), "a");
        assert_eq!(partition_label(b"plain"), "");
        assert_eq!(partition_label(b":x"), "");
    }

    #[test]
    fn range_uses_intersection() {
        let range = SyncRange::new(["photos", "notes"], ["notes", "music"]);
        assert!(range.admits("notes"));
        assert!(!range.admits("photos"));
        assert!(!range.admits("music"));
        assert_eq!(range.labels().into_iter().collect::<Vec<_>>(), vec!["notes"]);
    }

    #[test]
    fn empty_range_admits_nothing() {
        let range = SyncRange::new(Vec::<String>::new(), ["a"]);
        assert!(!range.admits("a"));
    }
}
