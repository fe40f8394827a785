//! Store directory layout.
//!
//! ```text
//! <data_dir>/<bundle>/<store_id>/
//! ├─ META      # JSON: format version, store id, options, key salt
//! ├─ LOCK      # advisory lock held while the store is open
//! └─ kv.log    # commit log
//! ```

use crate::config::Options;
use crate::error::{KvError, KvResult};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const META_FILE: &str = "META";
const META_TEMP: &str = "META.tmp";
const LOCK_FILE: &str = "LOCK";
const LOG_FILE: &str = "kv.log";

/// Current META format.
pub const FORMAT_VERSION: u32 = 1;

/// Persisted store metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreMeta {
    /// META format version.
    pub format_version: u32,
    /// Store id.
    pub store_id: String,
    /// Options the store was created with.
    pub options: Options,
    /// HKDF salt for encrypted stores.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<Vec<u8>>,
}

impl StoreMeta {
    /// Metadata for a new store.
    #[must_use]
    pub fn new(store_id: impl Into<String>, options: Options, salt: Option<Vec<u8>>) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            store_id: store_id.into(),
            options,
            salt,
        }
    }

    /// Reads META from the store directory at `dir`. `None` if absent.
    ///
    /// # Errors
    ///
    /// I/O errors, unparsable content, or an unknown format version.
    pub fn load(dir: &Path) -> KvResult<Option<Self>> {
        let path = dir.join(META_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read(&path)?;
        let meta: Self = serde_json::from_slice(&data)
            .map_err(|e| KvError::corruption(format!("unreadable {}: {e}", path.display())))?;
        if meta.format_version != FORMAT_VERSION {
            return Err(KvError::corruption(format!(
                "unsupported META format version {}",
                meta.format_version
            )));
        }
        Ok(Some(meta))
    }
}

/// An open store directory. Holds the exclusive lock until dropped.
#[derive(Debug)]
pub struct StoreDir {
    path: PathBuf,
    _lock_file: File,
}

impl StoreDir {
    /// Opens the store directory, creating it when allowed.
    ///
    /// # Errors
    ///
    /// `StoreNotFound` when missing and `create_if_missing` is false,
    /// `StoreLocked` when another handle holds it, and I/O errors.
    pub fn open(path: &Path, create_if_missing: bool) -> KvResult<Self> {
        if !path.join(META_FILE).exists() && !create_if_missing {
            return Err(KvError::StoreNotFound {
                store_id: path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            });
        }
        fs::create_dir_all(path)?;

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(KvError::StoreLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the commit log.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        log_path(&self.path)
    }

    /// Reads META.
    ///
    /// # Errors
    ///
    /// See [`StoreMeta::load`].
    pub fn load_meta(&self) -> KvResult<Option<StoreMeta>> {
        StoreMeta::load(&self.path)
    }

    /// Writes META atomically: temp file, fsync, rename, directory fsync.
    ///
    /// # Errors
    ///
    /// I/O errors.
    pub fn save_meta(&self, meta: &StoreMeta) -> KvResult<()> {
        let data = serde_json::to_vec_pretty(meta)
            .map_err(|e| KvError::corruption(format!("cannot encode META: {e}")))?;
        let temp = self.path.join(META_TEMP);
        let mut file = File::create(&temp)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp, self.path.join(META_FILE))?;
        sync_directory(&self.path)
    }
}

/// Path of the commit log inside the store directory `dir`.
#[must_use]
pub fn log_path(dir: &Path) -> PathBuf {
    dir.join(LOG_FILE)
}

/// Returns true if `dir` holds a store.
#[must_use]
pub fn is_store_dir(dir: &Path) -> bool {
    dir.join(META_FILE).is_file()
}

#[cfg(unix)]
fn sync_directory(path: &Path) -> KvResult<()> {
    File::open(path)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_directory(_path: &Path) -> KvResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KvStoreType;
    use tempfile::tempdir;

    #[test]
    fn meta_roundtrip() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("store");
        let dir = StoreDir::open(&path, true).unwrap();
        assert_eq!(dir.load_meta().unwrap(), None);
        assert!(!is_store_dir(&path));

        let meta = StoreMeta::new(
            "store",
            Options::new().kv_store_type(KvStoreType::SingleVersion).encrypt(true),
            Some(vec![7; 16]),
        );
        dir.save_meta(&meta).unwrap();
        assert_eq!(dir.load_meta().unwrap(), Some(meta));
        assert!(is_store_dir(&path));
        assert!(!path.join(META_TEMP).exists());
        assert_eq!(dir.log_path(), path.join("kv.log"));
    }

    #[test]
    fn second_open_is_locked() {
        let temp = tempdir().unwrap();
        let _dir = StoreDir::open(temp.path(), true).unwrap();
        assert!(matches!(
            StoreDir::open(temp.path(), true),
            Err(KvError::StoreLocked)
        ));
    }

    #[test]
    fn missing_store_without_create() {
        let temp = tempdir().unwrap();
        let err = StoreDir::open(&temp.path().join("absent"), false).unwrap_err();
        assert!(matches!(err, KvError::StoreNotFound { store_id } if store_id == "absent"));
        assert!(!temp.path().join("absent").exists());
    }

    #[test]
    fn garbage_meta_is_corruption() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join(META_FILE), b"{not json").unwrap();
        assert!(matches!(
            StoreMeta::load(temp.path()),
            Err(KvError::Corruption { .. })
        ));
    }
}
