//! Last-writer-wins conflict resolution.

use crate::device::{DeviceId, LogicalTimestamp};
use std::cmp::Ordering;

/// Identity of one write: when it happened and who made it.
///
/// Versions are totally ordered: by timestamp, then by origin device id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    /// Lamport time of the write.
    pub timestamp: LogicalTimestamp,
    /// Authoring device.
    pub origin: DeviceId,
}

impl Version {
    /// Creates a version.
    #[must_use]
    pub fn new(timestamp: LogicalTimestamp, origin: DeviceId) -> Self {
        Self { timestamp, origin }
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.origin.cmp(&other.origin))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Outcome of merging an incoming version into local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The incoming version is newer; store it.
    TakeRemote,
    /// The local version is newer; drop the incoming one.
    KeepLocal,
    /// Both sides already hold this exact version.
    Identical,
}

/// Decides whether `incoming` replaces `local`.
///
/// Higher timestamp wins. Equal timestamps from different devices are
/// broken toward the lexicographically greater device id, so every replica
/// picks the same winner without coordination.
#[must_use]
pub fn resolve(local: Option<&Version>, incoming: &Version) -> Resolution {
    match local.map(|local| incoming.cmp(local)) {
        None | Some(Ordering::Greater) => Resolution::TakeRemote,
        Some(Ordering::Less) => Resolution::KeepLocal,
        Some(Ordering::Equal) => Resolution::Identical,
    }
}
