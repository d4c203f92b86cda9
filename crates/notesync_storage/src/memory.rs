//! In-memory storage backend.

use crate::backend::StorageBackend;
use crate::error::{BackendError, BackendResult};
use parking_lot::RwLock;

/// A byte log held in memory.
///
/// Used for tests and for databases opened with
/// `Database::open_in_memory`. Contents are lost when dropped.
///
/// ```rust
/// use notesync_storage::{InMemoryBackend, StorageBackend};
///
/// let mut backend = InMemoryBackend::new();
/// backend.append(b"abc").unwrap();
/// assert_eq!(backend.size().unwrap(), 3);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    data: RwLock<Vec<u8>>,
    closed: bool,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend preloaded with `data`.
    ///
    /// Handy for replay tests that need a hand-crafted log.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: RwLock::new(data),
            closed: false,
        }
    }

    /// Returns a copy of the log contents.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    fn ensure_open(&self) -> BackendResult<()> {
        if self.closed {
            Err(BackendError::Closed)
        } else {
            Ok(())
        }
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> BackendResult<Vec<u8>> {
        self.ensure_open()?;
        let data = self.data.read();
        let size = data.len() as u64;
        let end = offset.saturating_add(len as u64);
        if end > size {
            return Err(BackendError::ReadPastEnd { offset, len, size });
        }
        Ok(data[offset as usize..end as usize].to_vec())
    }

    fn append(&mut self, bytes: &[u8]) -> BackendResult<u64> {
        self.ensure_open()?;
        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(bytes);
        Ok(offset)
    }

    fn flush(&mut self) -> BackendResult<()> {
        self.ensure_open()
    }

    fn sync(&mut self) -> BackendResult<()> {
        self.ensure_open()
    }

    fn size(&self) -> BackendResult<u64> {
        self.ensure_open()?;
        Ok(self.data.read().len() as u64)
    }

    fn truncate(&mut self, new_size: u64) -> BackendResult<()> {
        self.ensure_open()?;
        let mut data = self.data.write();
        let size = data.len() as u64;
        if new_size > size {
            return Err(BackendError::InvalidTruncate {
                requested: new_size,
                size,
            });
        }
        data.truncate(new_size as usize);
        Ok(())
    }

    fn close(&mut self) -> BackendResult<()> {
        self.closed = true;
        Ok(())
    }
}
