//! Sync directions and per-device outcomes.

use std::fmt;

/// Direction of a sync cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncMode {
    /// Only pull data authored by the peer.
    PullOnly,
    /// Only push data authored locally.
    PushOnly,
    /// Push, then pull.
    PushPull,
}

impl SyncMode {
    /// Wire code, matching the public sync mode enumeration.
    #[must_use]
    pub const fn to_code(self) -> u8 {
        match self {
            Self::PullOnly => 0,
            Self::PushOnly => 1,
            Self::PushPull => 2,
        }
    }

    /// Parses a wire code.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::PullOnly),
            1 => Some(Self::PushOnly),
            2 => Some(Self::PushPull),
            _ => None,
        }
    }

    /// Returns true if local data leaves the device in this mode.
    #[must_use]
    pub const fn pushes(self) -> bool {
        matches!(self, Self::PushOnly | Self::PushPull)
    }

    /// Returns true if peer data is brought in by this mode.
    #[must_use]
    pub const fn pulls(self) -> bool {
        matches!(self, Self::PullOnly | Self::PushPull)
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PullOnly => "pull-only",
            Self::PushOnly => "push-only",
            Self::PushPull => "push-pull",
        };
        f.write_str(name)
    }
}

/// Outcome of one sync cycle with one peer, as reported to watchers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncStatus {
    /// All requested directions completed.
    Success,
    /// The peer answered with an error or the local store rejected the data.
    Failed,
    /// The peer could not be reached.
    Unreachable,
    /// The peer did not answer within the configured timeout.
    Timeout,
    /// The store closed before the exchange finished.
    Cancelled,
}

impl SyncStatus {
    /// Numeric status code delivered to watchers.
    #[must_use]
    pub const fn to_code(self) -> u32 {
        match self {
            Self::Success => 0,
            Self::Failed => 1,
            Self::Unreachable => 27,
            Self::Timeout => 28,
            Self::Cancelled => 29,
        }
    }

    /// Returns true for [`SyncStatus::Success`].
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Unreachable => "unreachable",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_directions() {
        assert!(SyncMode::PushOnly.pushes() && !SyncMode::PushOnly.pulls());
        assert!(SyncMode::PullOnly.pulls() && !SyncMode::PullOnly.pushes());
        assert!(SyncMode::PushPull.pushes() && SyncMode::PushPull.pulls());
    }

    #[test]
    fn mode_codes_roundtrip() {
        for mode in [SyncMode::PullOnly, SyncMode::PushOnly, SyncMode::PushPull] {
            assert_eq!(SyncMode::from_code(mode.to_code()), Some(mode));
        }
        assert_eq!(SyncMode::from_code(3), None);
    }
}
