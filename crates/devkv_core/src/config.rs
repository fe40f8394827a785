//! Store and manager configuration.

use devkv_sync_engine::LoopbackNetwork;
use devkv_sync_protocol::DeviceId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Maximum key length in bytes.
pub const MAX_KEY_LENGTH: usize = 1024;
/// Maximum key length in bytes for device-collaboration stores.
pub const MAX_KEY_LENGTH_DEVICE: usize = 896;
/// Maximum encoded value length in bytes.
pub const MAX_VALUE_LENGTH: usize = 4_194_303;
/// Maximum store identifier length in bytes.
pub const MAX_STORE_ID_LENGTH: usize = 128;
/// Maximum number of entries in one batch call.
pub const MAX_BATCH_SIZE: usize = 128;

/// How entries are scoped within a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum KvStoreType {
    /// Every device owns its own key space; reads name the device.
    #[default]
    DeviceCollaboration,
    /// One key space shared by all devices; the last writer wins.
    SingleVersion,
    /// Keeps every version. Not supported.
    MultiVersion,
}

impl KvStoreType {
    /// Numeric code.
    #[must_use]
    pub const fn to_code(self) -> u8 {
        match self {
            Self::DeviceCollaboration => 0,
            Self::SingleVersion => 1,
            Self::MultiVersion => 2,
        }
    }

    /// Parses a numeric code.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::DeviceCollaboration),
            1 => Some(Self::SingleVersion),
            2 => Some(Self::MultiVersion),
            _ => None,
        }
    }

    /// Longest key accepted by this kind of store.
    #[must_use]
    pub const fn max_key_length(self) -> usize {
        match self {
            Self::DeviceCollaboration => MAX_KEY_LENGTH_DEVICE,
            Self::SingleVersion | Self::MultiVersion => MAX_KEY_LENGTH,
        }
    }
}

impl fmt::Display for KvStoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DeviceCollaboration => "device-collaboration",
            Self::SingleVersion => "single-version",
            Self::MultiVersion => "multi-version",
        };
        f.write_str(name)
    }
}

/// Sensitivity of the data kept in a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum SecurityLevel {
    /// Not set.
    #[default]
    NoLevel,
    /// Public data.
    S0,
    /// Low impact if leaked.
    S1,
    /// Major impact if leaked.
    S2,
    /// Severe impact if leaked.
    S3,
    /// Critical impact if leaked.
    S4,
}

impl SecurityLevel {
    /// Numeric code.
    #[must_use]
    pub const fn to_code(self) -> u8 {
        match self {
            Self::NoLevel => 0,
            Self::S0 => 1,
            Self::S1 => 2,
            Self::S2 => 3,
            Self::S3 => 5,
            Self::S4 => 6,
        }
    }

    /// Parses a numeric code.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::NoLevel),
            1 => Some(Self::S0),
            2 => Some(Self::S1),
            3 => Some(Self::S2),
            5 => Some(Self::S3),
            6 => Some(Self::S4),
            _ => None,
        }
    }
}

/// Options for opening a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Options {
    /// Create the store if it does not exist.
    pub create_if_missing: bool,
    /// Encrypt the persisted log.
    pub encrypt: bool,
    /// Include the store in backups.
    pub backup: bool,
    /// Push committed local changes to online peers automatically.
    pub auto_sync: bool,
    /// Entry scoping.
    pub kv_store_type: KvStoreType,
    /// Data sensitivity.
    pub security_level: SecurityLevel,
}

impl Default for Options {
    fn default() -> Self {
        Self::new()
    }
}

impl Options {
    /// Creates options with default values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            create_if_missing: true,
            encrypt: false,
            backup: true,
            auto_sync: true,
            kv_store_type: KvStoreType::DeviceCollaboration,
            security_level: SecurityLevel::NoLevel,
        }
    }

    /// Sets whether to create the store if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to encrypt the store.
    #[must_use]
    pub const fn encrypt(mut self, value: bool) -> Self {
        self.encrypt = value;
        self
    }

    /// Sets whether the store is backed up.
    #[must_use]
    pub const fn backup(mut self, value: bool) -> Self {
        self.backup = value;
        self
    }

    /// Sets whether committed changes are synced automatically.
    #[must_use]
    pub const fn auto_sync(mut self, value: bool) -> Self {
        self.auto_sync = value;
        self
    }

    /// Sets the store kind.
    #[must_use]
    pub const fn kv_store_type(mut self, value: KvStoreType) -> Self {
        self.kv_store_type = value;
        self
    }

    /// Sets the security level.
    #[must_use]
    pub const fn security_level(mut self, value: SecurityLevel) -> Self {
        self.security_level = value;
        self
    }
}

/// Configuration for a [`KvManager`](crate::KvManager).
#[derive(Clone)]
pub struct KvManagerConfig {
    /// Application bundle owning the stores.
    pub bundle_name: String,
    /// Owning user.
    pub user_id: String,
    /// Root directory for persisted stores. `None` keeps every store in memory.
    pub data_dir: Option<PathBuf>,
    /// This device. `None` generates a random id.
    pub local_device: Option<DeviceId>,
    /// Secret from which per-store encryption keys are derived.
    pub encryption_secret: Option<Vec<u8>>,
    /// Capacity of each store's notification queue.
    pub notify_queue_capacity: usize,
    /// Upper bound for one exchange with one peer.
    pub sync_timeout: Duration,
    /// Network used for sync. `None` leaves stores without peers.
    pub network: Option<LoopbackNetwork>,
}

impl fmt::Debug for KvManagerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KvManagerConfig")
            .field("bundle_name", &self.bundle_name)
            .field("user_id", &self.user_id)
            .field("data_dir", &self.data_dir)
            .field("local_device", &self.local_device)
            .field(
                "encryption_secret",
                &self.encryption_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("notify_queue_capacity", &self.notify_queue_capacity)
            .field("sync_timeout", &self.sync_timeout)
            .field("network", &self.network)
            .finish()
    }
}

impl KvManagerConfig {
    /// Creates an in-memory configuration for `bundle_name`.
    #[must_use]
    pub fn new(bundle_name: impl Into<String>) -> Self {
        Self {
            bundle_name: bundle_name.into(),
            user_id: "0".to_string(),
            data_dir: None,
            local_device: None,
            encryption_secret: None,
            notify_queue_capacity: 256,
            sync_timeout: Duration::from_secs(5),
            network: None,
        }
    }

    /// Sets the owning user.
    #[must_use]
    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    /// Persists stores under `dir`.
    #[must_use]
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Sets this device's id.
    #[must_use]
    pub fn local_device(mut self, device: DeviceId) -> Self {
        self.local_device = Some(device);
        self
    }

    /// Sets the secret used to derive store keys.
    #[must_use]
    pub fn encryption_secret(mut self, secret: impl Into<Vec<u8>>) -> Self {
        self.encryption_secret = Some(secret.into());
        self
    }

    /// Sets the notification queue capacity.
    #[must_use]
    pub const fn notify_queue_capacity(mut self, capacity: usize) -> Self {
        self.notify_queue_capacity = capacity;
        self
    }

    /// Sets the per-peer sync timeout.
    #[must_use]
    pub const fn sync_timeout(mut self, timeout: Duration) -> Self {
        self.sync_timeout = timeout;
        self
    }

    /// Attaches the stores to `network`.
    #[must_use]
    pub fn network(mut self, network: LoopbackNetwork) -> Self {
        self.network = Some(network);
        self
    }
}
