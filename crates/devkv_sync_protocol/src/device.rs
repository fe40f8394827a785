//! Device identity and logical time.

use crate::error::{ProtocolError, ProtocolResult};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Longest accepted device identifier, in bytes.
pub const MAX_DEVICE_ID_LENGTH: usize = 128;

/// Identifier of a device taking part in synchronization.
///
/// Entries are attributed to the device that authored them, so the id is
/// part of every stored version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(String);

impl DeviceId {
    /// Validates and wraps a device identifier.
    ///
    /// # Errors
    ///
    /// Fails if the id is empty, only whitespace, or longer than
    /// [`MAX_DEVICE_ID_LENGTH`] bytes.
    pub fn new(id: impl Into<String>) -> ProtocolResult<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ProtocolError::InvalidDeviceId("empty device id".into()));
        }
        if id.len() > MAX_DEVICE_ID_LENGTH {
            return Err(ProtocolError::InvalidDeviceId(format!(
                "device id is {} bytes, max {MAX_DEVICE_ID_LENGTH}",
                id.len()
            )));
        }
        Ok(Self(id))
    }

    /// Returns the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for DeviceId {
    type Error = ProtocolError;

    fn try_from(value: &str) -> ProtocolResult<Self> {
        Self::new(value)
    }
}

impl AsRef<str> for DeviceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A Lamport timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct LogicalTimestamp(u64);

impl LogicalTimestamp {
    /// The timestamp before any write.
    pub const ZERO: Self = Self(0);

    /// Latest timestamp a replica accepts from a peer. Local ticks above it
    /// still fit the signed wire field.
    pub const MAX_ACCEPTED: Self = Self(1 << 62);

    /// Creates a timestamp from its raw counter value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw counter value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LogicalTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Lamport clock of one store replica.
///
/// Local writes [`tick`](Self::tick); versions received from peers are
/// [`observe`](Self::observe)d so the next local write orders after them.
#[derive(Debug, Default)]
pub struct LamportClock {
    counter: AtomicU64,
}

impl LamportClock {
    /// Creates a clock that has already seen `last`.
    #[must_use]
    pub fn starting_at(last: LogicalTimestamp) -> Self {
        Self {
            counter: AtomicU64::new(last.as_u64()),
        }
    }

    /// Advances the clock and returns the new timestamp.
    pub fn tick(&self) -> LogicalTimestamp {
        LogicalTimestamp(self.counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Moves the clock forward to at least `seen`.
    pub fn observe(&self, seen: LogicalTimestamp) {
        self.counter.fetch_max(seen.as_u64(), Ordering::SeqCst);
    }

    /// Returns the latest timestamp issued or observed.
    #[must_use]
    pub fn current(&self) -> LogicalTimestamp {
        LogicalTimestamp(self.counter.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_id_validation() {
        assert!(DeviceId::new("phone-1").is_ok());
        assert!(DeviceId::new("").is_err());
        assert!(DeviceId::new("   ").is_err());
        assert!(DeviceId::new("x".repeat(MAX_DEVICE_ID_LENGTH + 1)).is_err());
        assert_eq!(DeviceId::try_from("tv").unwrap().as_str(), "tv");
    }

    #[test]
    fn clock_ticks_after_observed() {
        let clock = LamportClock::default();
        assert_eq!(clock.tick(), LogicalTimestamp::new(1));
        clock.observe(LogicalTimestamp::new(10));
        assert_eq!(clock.tick(), LogicalTimestamp::new(11));
        clock.observe(LogicalTimestamp::new(3));
        assert_eq!(clock.current(), LogicalTimestamp::new(11));
    }

    #[test]
    fn clock_resumes_from_replayed_state() {
        let clock = LamportClock::starting_at(LogicalTimestamp::new(41));
        assert_eq!(clock.tick().as_u64(), 42);
    }
}
