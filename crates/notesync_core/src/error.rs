//! Error types for notesync core.

use crate::note::NoteId;
use notesync_storage::BackendError;
use std::io;
use thiserror::Error;

/// Result type for persistence operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by the local persistence layer.
///
/// Every repository, store and database operation reports failures through
/// this type. Callers decide whether to surface or retry; nothing in this
/// crate retries internally.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend (byte log) error.
    #[error("storage backend error: {0}")]
    Backend(#[from] BackendError),

    /// I/O error outside a backend (directory, manifest, lock file).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A store's log holds bytes that cannot be a valid record.
    #[error("store '{store}' is corrupted: {message}")]
    Corrupted {
        /// Store name.
        store: String,
        /// Description of the corruption.
        message: String,
    },

    /// A record's checksum does not match its contents.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Checksum stored in the record.
        expected: u32,
        /// Checksum computed over the record.
        actual: u32,
    },

    /// The database directory or manifest cannot be opened.
    #[error("invalid database format: {message}")]
    InvalidFormat {
        /// Description of the problem.
        message: String,
    },

    /// The database was written by a newer schema than this build knows.
    #[error("database schema v{found} is newer than supported v{supported}")]
    SchemaTooNew {
        /// Schema version found on disk.
        found: u32,
        /// Latest schema version this build can migrate to.
        supported: u32,
    },

    /// A schema migration step failed.
    #[error("migration v{version} failed: {message}")]
    MigrationFailed {
        /// Version of the failing migration.
        version: u32,
        /// Description of the failure.
        message: String,
    },

    /// The requested object store does not exist.
    #[error("object store not found: {name}")]
    StoreNotFound {
        /// Store name.
        name: String,
    },

    /// Another process holds the database lock.
    #[error("database locked: another process has exclusive access")]
    DatabaseLocked,

    /// The database has been closed.
    #[error("database is closed")]
    DatabaseClosed,

    /// A note payload could not be encoded or decoded.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the failure.
        message: String,
    },

    /// The note was written to the durable store but not to the sync queue.
    ///
    /// The note is visible locally and will not be delivered until it is
    /// saved again.
    #[error("note {id} saved locally but not queued for sync: {source}")]
    NotQueued {
        /// Id of the saved note.
        id: NoteId,
        /// The sync queue failure.
        #[source]
        source: Box<StorageError>,
    },

    /// A blocking storage task was cancelled or panicked.
    #[error("storage task aborted: {message}")]
    TaskAborted {
        /// Description of the abort.
        message: String,
    },
}

impl StorageError {
    /// Creates a corruption error for `store`.
    pub fn corrupted(store: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Corrupted {
            store: store.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates a task aborted error.
    pub fn task_aborted(message: impl Into<String>) -> Self {
        Self::TaskAborted {
            message: message.into(),
        }
    }

    /// Returns true when the local write succeeded and only queuing failed.
    #[must_use]
    pub fn is_saved_locally(&self) -> bool {
        matches!(self, Self::NotQueued { .. })
    }
}
