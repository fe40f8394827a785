//! Store lifecycle for one application bundle.

use crate::config::{KvManagerConfig, KvStoreType, Options};
use crate::crypto::{random_salt, random_secret, CryptoManager, EncryptionKey};
use crate::dir::{is_store_dir, StoreDir, StoreMeta};
use crate::error::{KvError, KvResult};
use crate::store::{blocking, KvStore, StoreContext};
use crate::types::DeviceId;
use crate::validate;
use devkv_storage::{FileBackend, InMemoryBackend, StorageBackend};
use devkv_sync_engine::{LoopbackNetwork, SyncConfig};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use zeroize::Zeroizing;

/// Log and metadata of an in-memory store, kept until the store is deleted.
struct MemoryStore {
    backend: InMemoryBackend,
    meta: StoreMeta,
}

/// Opens, closes and deletes the stores of one application bundle on this
/// device.
///
/// With a `data_dir`, stores persist under `<data_dir>/<bundle>/<store_id>/`.
/// Without one, stores live in memory for as long as the manager does.
pub struct KvManager {
    config: KvManagerConfig,
    local: DeviceId,
    secret: Arc<Zeroizing<Vec<u8>>>,
    network: LoopbackNetwork,
    stores: tokio::sync::Mutex<HashMap<String, KvStore>>,
    memory: Mutex<HashMap<String, MemoryStore>>,
}

impl std::fmt::Debug for KvManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvManager")
            .field("config", &self.config)
            .field("local", &self.local)
            .finish_non_exhaustive()
    }
}

impl KvManager {
    /// Creates a manager.
    ///
    /// # Errors
    ///
    /// Fails if a device id cannot be generated.
    pub fn new(config: KvManagerConfig) -> KvResult<Self> {
        let local = match &config.local_device {
            Some(device) => device.clone(),
            None => DeviceId::new(uuid::Uuid::new_v4().to_string())?,
        };
        let secret = match &config.encryption_secret {
            Some(secret) => secret.clone(),
            None => {
                if config.data_dir.is_some() {
                    tracing::warn!(
                        "no encryption secret configured; encrypted stores will not reopen in a new manager"
                    );
                }
                random_secret()
            }
        };
        let network = config.network.clone().unwrap_or_default();
        tracing::debug!(bundle = %config.bundle_name, device = %local, "manager created");

        Ok(Self {
            config,
            local,
            secret: Arc::new(Zeroizing::new(secret)),
            network,
            stores: tokio::sync::Mutex::new(HashMap::new()),
            memory: Mutex::new(HashMap::new()),
        })
    }

    /// This device.
    #[must_use]
    pub fn local_device(&self) -> &DeviceId {
        &self.local
    }

    /// The network stores of this manager sync over.
    #[must_use]
    pub fn network(&self) -> &LoopbackNetwork {
        &self.network
    }

    /// Directory holding this bundle's stores, if persistent.
    #[must_use]
    pub fn root(&self) -> Option<PathBuf> {
        self.config
            .data_dir
            .as_ref()
            .map(|dir| dir.join(&self.config.bundle_name))
    }

    /// Opens `store_id`, creating it if allowed. Returns the existing handle
    /// when the store is already open.
    ///
    /// # Errors
    ///
    /// `ArgumentInvalid` for a bad id, an unsupported kind, or options that
    /// contradict the existing store; `StoreNotFound` when missing and
    /// `create_if_missing` is false; `StoreLocked`; I/O and corruption
    /// errors from replay.
    pub async fn get_kv_store(&self, store_id: &str, options: Options) -> KvResult<KvStore> {
        validate::store_id(store_id)?;
        if options.kv_store_type == KvStoreType::MultiVersion {
            return Err(KvError::argument_invalid(
                "multi-version stores are not supported",
            ));
        }

        let mut stores = self.stores.lock().await;
        if let Some(store) = stores.get(store_id) {
            if !store.is_closed() {
                return Ok(store.clone());
            }
        }

        let ctx = match self.root() {
            Some(root) => {
                let path = root.join(store_id);
                let id = store_id.to_string();
                let secret = Arc::clone(&self.secret);
                let (network, sync_config, capacity, local) = self.shared_parts();
                blocking(move || {
                    let (options, backend, cipher, dir) =
                        prepare_persisted(&path, &id, options, &secret)?;
                    Ok(StoreContext {
                        store_id: id,
                        options,
                        local,
                        backend,
                        cipher,
                        dir: Some(dir),
                        network,
                        sync_config,
                        notify_capacity: capacity,
                    })
                })
                .await?
            }
            None => self.prepare_memory(store_id, options)?,
        };

        let store = blocking(move || KvStore::open(ctx)).await?;
        stores.insert(store_id.to_string(), store.clone());
        Ok(store)
    }

    fn shared_parts(&self) -> (LoopbackNetwork, SyncConfig, usize, DeviceId) {
        (
            self.network.clone(),
            SyncConfig::new().with_timeout(self.config.sync_timeout),
            self.config.notify_queue_capacity,
            self.local.clone(),
        )
    }

    fn prepare_memory(&self, store_id: &str, options: Options) -> KvResult<StoreContext> {
        let mut memory = self.memory.lock();
        if !memory.contains_key(store_id) {
            if !options.create_if_missing {
                return Err(KvError::StoreNotFound {
                    store_id: store_id.to_string(),
                });
            }
            let meta = StoreMeta::new(store_id, options, options.encrypt.then(random_salt));
            memory.insert(
                store_id.to_string(),
                MemoryStore {
                    backend: InMemoryBackend::new(),
                    meta,
                },
            );
        }
        let Some(existing) = memory.get(store_id) else {
            return Err(KvError::StoreNotFound {
                store_id: store_id.to_string(),
            });
        };
        let options = reconcile(&existing.meta, options)?;
        let cipher = cipher_for(&existing.meta, &self.secret)?;
        let (network, sync_config, notify_capacity, local) = self.shared_parts();

        Ok(StoreContext {
            store_id: store_id.to_string(),
            options,
            local,
            backend: Box::new(existing.backend.share()),
            cipher,
            dir: None,
            network,
            sync_config,
            notify_capacity,
        })
    }

    /// Closes an open store. Queued notifications are delivered first.
    ///
    /// # Errors
    ///
    /// `StoreNotFound` if the store is not open.
    pub async fn close_kv_store(&self, store_id: &str) -> KvResult<()> {
        let store = self
            .stores
            .lock()
            .await
            .remove(store_id)
            .ok_or_else(|| KvError::StoreNotFound {
                store_id: store_id.to_string(),
            })?;
        blocking(move || {
            store.close();
            Ok(())
        })
        .await
    }

    /// Closes the store if open and deletes its data.
    ///
    /// # Errors
    ///
    /// `StoreNotFound` if there is no such store, or I/O errors.
    pub async fn delete_kv_store(&self, store_id: &str) -> KvResult<()> {
        validate::store_id(store_id)?;
        let open = self.stores.lock().await.remove(store_id);
        if let Some(store) = open {
            blocking(move || {
                store.close();
                Ok(())
            })
            .await?;
        }

        let not_found = || KvError::StoreNotFound {
            store_id: store_id.to_string(),
        };
        match self.root() {
            Some(root) => {
                let path = root.join(store_id);
                if !is_store_dir(&path) {
                    return Err(not_found());
                }
                blocking(move || fs::remove_dir_all(&path).map_err(KvError::from)).await?;
            }
            None => {
                self.memory.lock().remove(store_id).ok_or_else(not_found)?;
            }
        }
        tracing::info!(store = store_id, "store deleted");
        Ok(())
    }

    /// Ids of every store of this bundle, open or not, sorted.
    ///
    /// # Errors
    ///
    /// I/O errors while listing the bundle directory.
    pub async fn get_all_kv_store_id(&self) -> KvResult<Vec<String>> {
        let mut ids = match self.root() {
            Some(root) => blocking(move || list_store_dirs(&root)).await?,
            None => self.memory.lock().keys().cloned().collect(),
        };
        ids.sort();
        Ok(ids)
    }
}

fn list_store_dirs(root: &Path) -> KvResult<Vec<String>> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    let mut ids = Vec::new();
    for entry in fs::read_dir(root)? {
        let path = entry?.path();
        if is_store_dir(&path) {
            if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
                ids.push(name.to_string());
            }
        }
    }
    Ok(ids)
}

type Prepared = (Options, Box<dyn StorageBackend>, Option<CryptoManager>, StoreDir);

fn prepare_persisted(path: &Path, store_id: &str, options: Options, secret: &[u8]) -> KvResult<Prepared> {
    let dir = StoreDir::open(path, options.create_if_missing)?;
    let meta = match dir.load_meta()? {
        Some(meta) => meta,
        None => {
            let meta = StoreMeta::new(store_id, options, options.encrypt.then(random_salt));
            dir.save_meta(&meta)?;
            tracing::info!(store = store_id, path = %path.display(), "store created");
            meta
        }
    };
    let options = reconcile(&meta, options)?;
    let cipher = cipher_for(&meta, secret)?;
    let backend = FileBackend::open(&dir.log_path())?;
    Ok((options, Box::new(backend), cipher, dir))
}

/// Checks the requested options against the stored ones. Kind and
/// encryption are fixed at creation; the security level is taken from the
/// store.
fn reconcile(meta: &StoreMeta, requested: Options) -> KvResult<Options> {
    let stored = meta.options;
    if stored.kv_store_type != requested.kv_store_type {
        return Err(KvError::argument_invalid(format!(
            "store '{}' is {}, not {}",
            meta.store_id, stored.kv_store_type, requested.kv_store_type
        )));
    }
    if stored.encrypt != requested.encrypt {
        return Err(KvError::argument_invalid(format!(
            "store '{}' was created with encrypt = {}",
            meta.store_id, stored.encrypt
        )));
    }
    Ok(requested.security_level(stored.security_level))
}

fn cipher_for(meta: &StoreMeta, secret: &[u8]) -> KvResult<Option<CryptoManager>> {
    if !meta.options.encrypt {
        return Ok(None);
    }
    let salt = meta
        .salt
        .as_deref()
        .ok_or_else(|| KvError::corruption("encrypted store has no key salt"))?;
    let key = EncryptionKey::derive(secret, salt)?;
    Ok(Some(CryptoManager::new(&key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SecurityLevel;

    fn manager() -> KvManager {
        KvManager::new(
            KvManagerConfig::new("com.example.test")
                .local_device(DeviceId::new("phone").unwrap()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn open_returns_same_handle() {
        let manager = manager();
        let a = manager.get_kv_store("s", Options::default()).await.unwrap();
        a.put("k", 1).await.unwrap();
        let b = manager.get_kv_store("s", Options::default()).await.unwrap();
        assert_eq!(
            b.get(manager.local_device(), "k").await.unwrap(),
            devkv_codec::TypedValue::Integer(1)
        );
        assert_eq!(a.store_id(), b.store_id());
    }

    #[tokio::test]
    async fn rejects_bad_arguments() {
        let manager = manager();
        let err = manager.get_kv_store("../x", Options::default()).await.unwrap_err();
        assert!(err.is_argument_error());
        let err = manager
            .get_kv_store("mv", Options::new().kv_store_type(KvStoreType::MultiVersion))
            .await
            .unwrap_err();
        assert!(err.is_argument_error());
        let err = manager
            .get_kv_store("absent", Options::new().create_if_missing(false))
            .await
            .unwrap_err();
        assert!(matches!(err, KvError::StoreNotFound { .. }));
    }

    #[tokio::test]
    async fn memory_store_survives_close_until_deleted() {
        let manager = manager();
        let store = manager.get_kv_store("mem", Options::default()).await.unwrap();
        store.put("k", "v").await.unwrap();
        manager.close_kv_store("mem").await.unwrap();
        assert!(matches!(store.put("k", "w").await, Err(KvError::StoreClosed)));
        assert!(matches!(
            manager.close_kv_store("mem").await,
            Err(KvError::StoreNotFound { .. })
        ));

        let store = manager.get_kv_store("mem", Options::default()).await.unwrap();
        assert_eq!(store.get(manager.local_device(), "k").await.unwrap(), "v".into());
        assert_eq!(manager.get_all_kv_store_id().await.unwrap(), vec!["mem"]);

        manager.delete_kv_store("mem").await.unwrap();
        assert!(manager.get_all_kv_store_id().await.unwrap().is_empty());
        assert!(matches!(
            manager.delete_kv_store("mem").await,
            Err(KvError::StoreNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn kind_mismatch_on_reopen() {
        let manager = manager();
        manager.get_kv_store("s", Options::default()).await.unwrap();
        manager.close_kv_store("s").await.unwrap();
        let err = manager
            .get_kv_store("s", Options::new().kv_store_type(KvStoreType::SingleVersion))
            .await
            .unwrap_err();
        assert!(err.is_argument_error());
    }

    #[tokio::test]
    async fn security_level_is_fixed_at_creation() {
        let manager = manager();
        manager
            .get_kv_store("s", Options::new().security_level(SecurityLevel::S2))
            .await
            .unwrap();
        manager.close_kv_store("s").await.unwrap();
        let store = manager.get_kv_store("s", Options::default()).await.unwrap();
        assert_eq!(store.get_security_level().await.unwrap(), SecurityLevel::S2);
    }
}
