//! Core type definitions for DevKV.

use devkv_codec::TypedValue;
use devkv_sync_protocol::partition_label;
use std::fmt;

pub use devkv_sync_protocol::{DeviceId, LogicalTimestamp};

/// An entry key: an arbitrary byte string, unique within a store scope.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Key(Vec<u8>);

impl Key {
    /// Creates a key from raw bytes.
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Returns the raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consumes the key and returns its bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true for the empty key.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true if the key starts with `prefix`.
    #[must_use]
    pub fn starts_with(&self, prefix: &[u8]) -> bool {
        self.0.starts_with(prefix)
    }

    /// Sync partition this key belongs to: the bytes before the first `:`.
    #[must_use]
    pub fn label(&self) -> String {
        partition_label(&self.0)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(text) => f.write_str(text),
            Err(_) => {
                f.write_str("0x")?;
                for byte in &self.0 {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Self(s.into_bytes())
    }
}

impl From<&String> for Key {
    fn from(s: &String) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for Key {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for Key {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl AsRef<[u8]> for Key {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A live key/value pair together with the device that wrote it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Entry key.
    pub key: Key,
    /// Current value.
    pub value: TypedValue,
    /// Device that authored the current value.
    pub origin: DeviceId,
}

impl Entry {
    /// Creates an entry.
    #[must_use]
    pub fn new(key: impl Into<Key>, value: impl Into<TypedValue>, origin: DeviceId) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            origin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_display() {
        assert_eq!(Key::from("photos:1").to_string(), "photos:1");
        assert_eq!(Key::from(vec![0xff, 0x00]).to_string(), "0xff00");
    }

    #[test]
    fn key_label() {
        assert_eq!(Key::from("photos:1").label(), "photos");
        assert_eq!(Key::from("plain").label(), "");
    }

    #[test]
    fn key_ordering_is_bytewise() {
        let mut keys = vec![Key::from("b"), Key::from("a2"), Key::from("a")];
        keys.sort();
        assert_eq!(keys, vec![Key::from("a"), Key::from("a2"), Key::from("b")]);
    }
}
