//! Storage backend trait definition.

use crate::error::BackendResult;

/// An append-only byte log backing a single object store.
///
/// Invariants:
///
/// - `append` returns the offset the bytes were written at
/// - `read_at` returns exactly the bytes previously appended at that offset
/// - after `sync` returns, every appended byte survives process termination
/// - after `close`, every operation fails with [`crate::BackendError::Closed`]
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Fails if the range extends beyond the current size or on I/O error.
    fn read_at(&self, offset: u64, len: usize) -> BackendResult<Vec<u8>>;

    /// Reads the whole log. Used when replaying a store at open.
    ///
    /// # Errors
    ///
    /// Fails on I/O error or if the backend is closed.
    fn read_all(&self) -> BackendResult<Vec<u8>> {
        let size = self.size()?;
        let len = usize::try_from(size).map_err(|_| crate::BackendError::ReadPastEnd {
            offset: 0,
            len: usize::MAX,
            size,
        })?;
        self.read_at(0, len)
    }

    /// Appends `data` and returns the offset it was written at.
    ///
    /// # Errors
    ///
    /// Fails on I/O error or if the backend is closed.
    fn append(&mut self, data: &[u8]) -> BackendResult<u64>;

    /// Pushes buffered writes to the operating system.
    ///
    /// # Errors
    ///
    /// Fails on I/O error or if the backend is closed.
    fn flush(&mut self) -> BackendResult<()>;

    /// Forces data and metadata to durable media.
    ///
    /// # Errors
    ///
    /// Fails on I/O error or if the backend is closed.
    fn sync(&mut self) -> BackendResult<()>;

    /// Returns the current size in bytes (the offset of the next append).
    ///
    /// # Errors
    ///
    /// Fails if the backend is closed.
    fn size(&self) -> BackendResult<u64>;

    /// Cuts the log down to `new_size` bytes.
    ///
    /// Used to drop a torn tail record found during replay.
    ///
    /// # Errors
    ///
    /// Fails if `new_size` exceeds the current size or on I/O error.
    fn truncate(&mut self, new_size: u64) -> BackendResult<()>;

    /// Syncs and releases the backend. Idempotent.
    ///
    /// # Errors
    ///
    /// Fails if the final sync fails.
    fn close(&mut self) -> BackendResult<()>;
}
