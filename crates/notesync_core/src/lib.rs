//! # notesync core
//!
//! Local persistence for notesync.
//!
//! This crate provides:
//! - A record-log object store per named store, replayed at open
//! - A database directory with a manifest, an exclusive lock and schema
//!   migrations
//! - [`NoteStore`], the authoritative local collection of notes
//! - [`SyncQueue`], the set of notes whose latest write is undelivered
//! - [`NoteRepository`], the async facade that writes both
//!
//! ## Example
//!
//! ```rust,ignore
//! use notesync_core::{Database, NoteDraft, NoteRepository};
//! use std::sync::Arc;
//!
//! let db = Arc::new(Database::open_in_memory()?);
//! let repo = NoteRepository::new(db)?;
//! let note = repo.save(NoteDraft::new("buy milk").with_title("Groceries")).await?;
//! assert_eq!(repo.pending_count().await?, 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod config;
mod database;
pub mod dir;
mod error;
mod manifest;
pub mod migration;
mod note;
mod note_store;
mod object_store;
mod record;
mod repository;
mod sync_queue;

pub use codec::{decode_note, encode_note};
pub use config::Config;
pub use database::Database;
pub use error::{StorageError, StorageResult};
pub use manifest::Manifest;
pub use migration::{
    Migration, MigrationContext, MigrationManager, MigrationReport, SchemaVersion, NOTES_STORE,
    SYNC_QUEUE_STORE,
};
pub use note::{now_millis, now_timestamp, IdGenerator, Note, NoteDraft, NoteId};
pub use note_store::NoteStore;
pub use object_store::{ObjectStore, StoreStats};
pub use record::{RecordFlags, StoreRecord};
pub use repository::NoteRepository;
pub use sync_queue::SyncQueue;

// Re-export storage types for convenience
pub use notesync_storage::{FileBackend, InMemoryBackend, StorageBackend};
