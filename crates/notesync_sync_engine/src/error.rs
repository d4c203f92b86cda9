//! Error types for the sync engine.

use notesync_core::{NoteId, StorageError};
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while delivering notes or driving the client.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the delivery can be retried.
        retryable: bool,
    },

    /// The endpoint answered with a non-2xx status.
    #[error("endpoint returned {status}: {reason}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Reason phrase or body excerpt.
        reason: String,
    },

    /// The request timed out.
    #[error("request timed out")]
    Timeout,

    /// A non-empty response body was not JSON.
    #[error("malformed acknowledgement: {0}")]
    MalformedAck(String),

    /// No usable endpoint is configured.
    #[error("sync endpoint is not configured: {endpoint:?}")]
    NotConfigured {
        /// The configured value.
        endpoint: String,
    },

    /// Local persistence failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A submitted note had neither title nor content.
    #[error("a note needs a title or content")]
    EmptyNote,

    /// The referenced note does not exist.
    #[error("note {id} not found")]
    NoteNotFound {
        /// Requested id.
        id: NoteId,
    },
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true for failures of a single delivery attempt.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            SyncError::Transport { .. }
                | SyncError::Status { .. }
                | SyncError::Timeout
                | SyncError::MalformedAck(_)
        )
    }

    /// Returns true if a later attempt may succeed without a config change.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout => true,
            SyncError::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Returns true when the note was stored locally despite the error.
    pub fn is_saved_locally(&self) -> bool {
        matches!(self, SyncError::Storage(err) if err.is_saved_locally())
    }
}
