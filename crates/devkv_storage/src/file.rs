//! Backend over a single log file.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A store log kept in one file.
///
/// The length is tracked in memory, so appends land after the last byte
/// this handle knows about even if the file was extended behind its back.
/// `sync` is `File::sync_all`; `truncate` syncs on its own.
///
/// # Example
///
/// ```no_run
/// use devkv_storage::{FileBackend, StorageBackend};
/// use std::path::Path;
///
/// let mut backend = FileBackend::open(Path::new("kv.log")).unwrap();
/// backend.append(b"frame").unwrap();
/// backend.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    file: Mutex<File>,
    len: u64,
    writable: bool,
}

impl FileBackend {
    /// Opens `path` for reading and appending, creating it if missing.
    ///
    /// # Errors
    ///
    /// I/O errors from opening or inspecting the file.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Self::wrap(path, file, true)
    }

    /// Like [`open`](Self::open), creating missing parent directories first.
    ///
    /// # Errors
    ///
    /// I/O errors from creating the directories or opening the file.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Opens an existing file without write access. Every mutating call
    /// fails with [`StorageError::ReadOnly`].
    ///
    /// # Errors
    ///
    /// I/O errors, including a missing file.
    pub fn open_read_only(path: &Path) -> StorageResult<Self> {
        let file = File::open(path)?;
        Self::wrap(path, file, false)
    }

    fn wrap(path: &Path, file: File, writable: bool) -> StorageResult<Self> {
        let len = file.metadata()?.len();
        tracing::debug!(path = %path.display(), len, writable, "file backend opened");
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            len,
            writable,
        })
    }

    /// Path of the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns false for backends from [`open_read_only`](Self::open_read_only).
    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    fn writable_file(&mut self, operation: &'static str) -> StorageResult<&mut File> {
        if !self.writable {
            return Err(StorageError::ReadOnly { operation });
        }
        Ok(self.file.get_mut())
    }
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let in_bounds = u64::try_from(len)
            .ok()
            .and_then(|n| offset.checked_add(n))
            .is_some_and(|end| end <= self.len);
        if !in_bounds {
            return Err(StorageError::ReadPastEnd {
                offset,
                len,
                size: self.len,
            });
        }

        let mut buffer = vec![0u8; len];
        if len > 0 {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(&mut buffer)?;
        }
        Ok(buffer)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let offset = self.len;
        let file = self.writable_file("append")?;
        if !data.is_empty() {
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(data)?;
        }
        self.len = offset + data.len() as u64;
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.writable_file("flush")?.flush()?;
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.len)
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.writable_file("sync")?.sync_all()?;
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let size = self.len;
        if new_size > size {
            return Err(StorageError::InvalidTruncate {
                requested: new_size,
                size,
            });
        }
        let file = self.writable_file("truncate")?;
        file.set_len(new_size)?;
        file.sync_all()?;
        self.len = new_size;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn appends_are_read_back_after_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kv.log");
        {
            let mut backend = FileBackend::open(&path).unwrap();
            assert_eq!(backend.size().unwrap(), 0);
            assert_eq!(backend.append(b"first ").unwrap(), 0);
            assert_eq!(backend.append(b"second").unwrap(), 6);
            backend.sync().unwrap();
            assert_eq!(backend.read_at(6, 6).unwrap(), b"second");
        }

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.path(), path);
        assert_eq!(backend.read_all().unwrap(), b"first second");
        assert!(matches!(
            backend.read_at(10, 5),
            Err(StorageError::ReadPastEnd { size: 12, .. })
        ));
        assert!(backend.read_at(12, 0).unwrap().is_empty());
    }

    #[test]
    fn truncate_cuts_a_torn_tail() {
        let dir = tempdir().unwrap();
        let mut backend = FileBackend::open(&dir.path().join("kv.log")).unwrap();
        backend.append(b"good-torn").unwrap();

        backend.truncate(4).unwrap();
        assert_eq!(backend.append(b"!").unwrap(), 4);
        assert_eq!(backend.read_all().unwrap(), b"good!");
        assert!(matches!(
            backend.truncate(100),
            Err(StorageError::InvalidTruncate { .. })
        ));
    }

    #[test]
    fn read_only_rejects_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kv.log");
        assert!(FileBackend::open_read_only(&path).is_err());
        FileBackend::open(&path).unwrap().append(b"data").unwrap();

        let mut backend = FileBackend::open_read_only(&path).unwrap();
        assert!(!backend.is_writable());
        assert_eq!(backend.read_all().unwrap(), b"data");
        assert!(matches!(
            backend.append(b"x"),
            Err(StorageError::ReadOnly { operation: "append" })
        ));
        assert!(backend.truncate(0).is_err());
        assert_eq!(std::fs::read(&path).unwrap(), b"data");
    }

    #[test]
    fn parent_directories_are_created() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bundle").join("store").join("kv.log");
        let backend = FileBackend::open_with_create_dirs(&path).unwrap();
        assert!(backend.is_writable());
        assert!(path.exists());
    }
}
