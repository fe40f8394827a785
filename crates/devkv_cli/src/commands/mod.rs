//! CLI command implementations.

pub mod dump;
pub mod inspect;
pub mod verify;

use devkv_core::{
    is_store_dir, log_path, scan, CryptoManager, DeviceId, EncryptionKey, KvStoreType, LogBatch,
    Scan, StoreMeta, SyncRecord,
};
use devkv_storage::{FileBackend, StorageBackend};
use std::collections::BTreeMap;
use std::error::Error;
use std::path::Path;

/// A store directory read without taking its lock or repairing the log.
pub struct LoadedStore {
    /// Contents of META.
    pub meta: StoreMeta,
    /// Log file size in bytes.
    pub log_size: u64,
    /// Every intact frame.
    pub scan: Scan,
}

/// Reads META and scans the whole log.
pub fn load(path: &Path, secret: Option<&[u8]>) -> Result<LoadedStore, Box<dyn Error>> {
    if !is_store_dir(path) {
        return Err(format!("No store found at {}", path.display()).into());
    }
    let meta = StoreMeta::load(path)?.ok_or("store META disappeared")?;

    let cipher = match (&meta.salt, secret) {
        (Some(salt), Some(secret)) => {
            Some(CryptoManager::new(&EncryptionKey::derive(secret, salt)?))
        }
        (Some(_), None) => {
            return Err("store is encrypted; pass --secret".into());
        }
        (None, _) => None,
    };

    let log = log_path(path);
    let data = if log.exists() {
        FileBackend::open_read_only(&log)?.read_all()?
    } else {
        Vec::new()
    };
    let scan = scan(&data, cipher.as_ref(), meta.store_id.as_bytes())?;
    tracing::debug!(frames = scan.frames, bytes = data.len(), "log scanned");

    Ok(LoadedStore {
        meta,
        log_size: data.len() as u64,
        scan,
    })
}

/// Latest version of every key, tombstones included, ordered by key then
/// origin.
pub fn replay(kind: KvStoreType, batches: &[LogBatch]) -> Vec<SyncRecord> {
    let mut index: BTreeMap<(Vec<u8>, Option<DeviceId>), SyncRecord> = BTreeMap::new();
    for batch in batches {
        match batch {
            LogBatch::Apply(records) => {
                for record in records {
                    let origin = match kind {
                        KvStoreType::SingleVersion => None,
                        _ => Some(record.origin.clone()),
                    };
                    index.insert((record.key.clone(), origin), record.clone());
                }
            }
            LogBatch::Purge(device) => index.retain(|_, record| record.origin != *device),
        }
    }
    index.into_values().collect()
}

/// Key as text, or hex when it is not UTF-8.
pub fn display_key(key: &[u8]) -> String {
    match std::str::from_utf8(key) {
        Ok(text) => text.to_string(),
        Err(_) => format!("0x{}", hex(key)),
    }
}

/// Lower-case hex.
pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Human-readable byte count.
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes}")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use devkv_core::{DeviceId, KvManager, KvManagerConfig, Options};
    use std::path::{Path, PathBuf};

    pub const SECRET: &[u8] = b"cli secret";

    /// Writes a small store under `root` and returns its directory.
    pub fn build_store(root: &Path, options: Options) -> PathBuf {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let manager = KvManager::new(
                KvManagerConfig::new("com.example.cli")
                    .data_dir(root)
                    .local_device(DeviceId::new("phone").unwrap())
                    .encryption_secret(SECRET.to_vec()),
            )
            .unwrap();
            let store = manager
                .get_kv_store("notes", options.auto_sync(false))
                .await
                .unwrap();
            store.put("note:1", "groceries").await.unwrap();
            store.put("note:2", 7).await.unwrap();
            store.put("todo:1", true).await.unwrap();
            store.delete("note:2").await.unwrap();
            manager.close_kv_store("notes").await.unwrap();
        });
        root.join("com.example.cli").join("notes")
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{build_store, SECRET};
    use super::*;
    use devkv_core::Options;
    use tempfile::tempdir;

    #[test]
    fn replay_keeps_latest_versions() {
        let dir = tempdir().unwrap();
        let path = build_store(dir.path(), Options::new());
        let loaded = load(&path, None).unwrap();
        assert_eq!(loaded.scan.frames, 4);
        assert!(loaded.scan.damage.is_none());

        let records = replay(loaded.meta.options.kv_store_type, &loaded.scan.batches);
        let live: Vec<String> = records
            .iter()
            .filter(|r| !r.is_tombstone())
            .map(|r| display_key(&r.key))
            .collect();
        assert_eq!(live, vec!["note:1", "todo:1"]);
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn encrypted_store_needs_secret() {
        let dir = tempdir().unwrap();
        let path = build_store(dir.path(), Options::new().encrypt(true));
        assert!(load(&path, None).is_err());
        assert!(load(&path, Some(b"other")).is_err());
        let loaded = load(&path, Some(SECRET)).unwrap();
        assert!(loaded.scan.encrypted);
    }

    #[test]
    fn missing_store_is_reported() {
        let dir = tempdir().unwrap();
        assert!(load(dir.path(), None).is_err());
    }

    #[test]
    fn keys_and_sizes_render() {
        assert_eq!(display_key(b"abc"), "abc");
        assert_eq!(display_key(&[0xff, 0x00]), "0xff00");
        assert_eq!(format_size(10), "10");
        assert_eq!(format_size(2048), "2.0 KB");
    }
}
