//! # notesync storage
//!
//! Byte-level storage backends for the notesync object stores.
//!
//! Backends are **opaque append-only byte logs**. They know nothing about
//! notes, records or checksums; `notesync_core` owns the record format and
//! replays a backend's bytes to rebuild its index at open.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - ephemeral storage for tests and scratch databases
//! - [`FileBackend`] - one OS file per object store
//!
//! ## Example
//!
//! ```rust
//! use notesync_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"note payload").unwrap();
//! assert_eq!(backend.read_at(offset, 4).unwrap(), b"note");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{BackendError, BackendResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
