//! # DevKV Storage
//!
//! Storage backends for DevKV store logs.
//!
//! Backends are **opaque byte stores**: they append, read back and
//! truncate bytes. Framing, checksums and encryption of the store log
//! belong to `devkv_core`.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - Stores that live only as long as their manager
//! - [`FileBackend`] - Persistent stores using OS file APIs
//! - [`FaultyBackend`] - Wraps another backend and fails on demand (tests)
//!
//! ## Example
//!
//! ```rust
//! use devkv_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"hello world").unwrap();
//! assert_eq!(backend.read_at(offset, 11).unwrap(), b"hello world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod faulty;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use faulty::{FaultSwitch, FaultyBackend};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
