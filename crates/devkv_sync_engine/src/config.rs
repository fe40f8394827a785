//! Configuration for the sync engine.

use std::time::Duration;

/// Configuration for sync cycles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Upper bound for one exchange with one peer.
    pub timeout: Duration,
    /// Delay applied before a cycle when the caller does not give one.
    pub default_delay: Duration,
}

impl SyncConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            default_delay: Duration::ZERO,
        }
    }

    /// Sets the per-peer timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the default delay before a cycle starts.
    #[must_use]
    pub const fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_pattern() {
        let config = SyncConfig::new()
            .with_timeout(Duration::from_millis(250))
            .with_default_delay(Duration::from_millis(10));
        assert_eq!(config.timeout, Duration::from_millis(250));
        assert_eq!(config.default_delay, Duration::from_millis(10));
        assert_eq!(SyncConfig::default().timeout, Duration::from_secs(5));
    }
}
