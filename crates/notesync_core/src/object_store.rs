//! Named key-value object stores.
//!
//! An [`ObjectStore`] is one append-only record log plus an in-memory index
//! from key to the offset of its latest record. The index is rebuilt by
//! replaying the log at open. Each put or delete appends exactly one record
//! and flushes it before returning, so every operation is atomic within its
//! store. A write that fails at any step is cut back off the log; an error
//! from `put` or `delete` means the record is gone, also after a restart.

use crate::error::{StorageError, StorageResult};
use crate::record::{scan_log, StoreRecord};
use notesync_storage::StorageBackend;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy)]
struct IndexEntry {
    offset: u64,
    len: usize,
}

#[derive(Debug, Default)]
struct LogState {
    index: BTreeMap<i64, IndexEntry>,
    next_sequence: u64,
    /// Bytes held by superseded records and tombstones.
    dead_bytes: u64,
}

/// Size accounting for one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of live keys.
    pub live_records: usize,
    /// Total log size in bytes.
    pub log_bytes: u64,
    /// Bytes held by superseded records and tombstones.
    pub dead_bytes: u64,
}

impl StoreStats {
    /// Fraction of the log that compaction would reclaim.
    #[must_use]
    pub fn dead_ratio(&self) -> f64 {
        if self.log_bytes == 0 {
            0.0
        } else {
            self.dead_bytes as f64 / self.log_bytes as f64
        }
    }
}

/// A single named store of `i64` keys to opaque byte values.
pub struct ObjectStore {
    name: String,
    backend: Mutex<Box<dyn StorageBackend>>,
    state: RwLock<LogState>,
    sync_on_write: bool,
}

impl std::fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStore")
            .field("name", &self.name)
            .field("live_records", &self.len())
            .finish()
    }
}

impl ObjectStore {
    /// Opens a store over `backend`, replaying its log.
    ///
    /// A torn tail record is cut off; any other malformed record fails.
    ///
    /// # Errors
    ///
    /// Fails on backend I/O error or log corruption.
    pub fn open(
        name: impl Into<String>,
        mut backend: Box<dyn StorageBackend>,
        sync_on_write: bool,
    ) -> StorageResult<Self> {
        let name = name.into();
        let log = backend.read_all()?;
        let state = replay(&name, &log)?;

        let valid_len = state.1;
        if valid_len < log.len() as u64 {
            tracing::warn!(
                store = %name,
                discarded = log.len() as u64 - valid_len,
                "dropping torn tail record"
            );
            backend.truncate(valid_len)?;
        }

        tracing::debug!(store = %name, live = state.0.index.len(), "object store opened");

        Ok(Self {
            name,
            backend: Mutex::new(backend),
            state: RwLock::new(state.0),
            sync_on_write,
        })
    }

    /// Returns the store name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Inserts or replaces the value for `key`.
    ///
    /// # Errors
    ///
    /// Fails if the record cannot be appended or made durable.
    pub fn put(&self, key: i64, payload: Vec<u8>) -> StorageResult<()> {
        let mut backend = self.backend.lock();
        let mut state = self.state.write();

        let record = StoreRecord::put(key, payload, state.next_sequence);
        let len = record.encoded_size();
        let offset = self.append_durable(backend.as_mut(), &record)?;

        state.next_sequence += 1;
        if let Some(previous) = state.index.insert(key, IndexEntry { offset, len }) {
            state.dead_bytes += previous.len as u64;
        }
        Ok(())
    }

    /// Returns the value for `key`, if present.
    ///
    /// # Errors
    ///
    /// Fails if the record cannot be read back.
    pub fn get(&self, key: i64) -> StorageResult<Option<Vec<u8>>> {
        let backend = self.backend.lock();
        let state = self.state.read();
        match state.index.get(&key) {
            Some(entry) => Ok(Some(self.read_entry(backend.as_ref(), *entry)?.payload)),
            None => Ok(None),
        }
    }

    /// Returns every live `(key, value)` pair in key order.
    ///
    /// # Errors
    ///
    /// Fails if any record cannot be read back.
    pub fn get_all(&self) -> StorageResult<Vec<(i64, Vec<u8>)>> {
        let backend = self.backend.lock();
        let state = self.state.read();
        state
            .index
            .iter()
            .map(|(key, entry)| {
                let record = self.read_entry(backend.as_ref(), *entry)?;
                Ok((*key, record.payload))
            })
            .collect()
    }

    /// Removes `key`. Returns whether it was present.
    ///
    /// Deleting an absent key writes nothing.
    ///
    /// # Errors
    ///
    /// Fails if the tombstone cannot be appended or made durable.
    pub fn delete(&self, key: i64) -> StorageResult<bool> {
        let mut backend = self.backend.lock();
        let mut state = self.state.write();

        let Some(previous) = state.index.get(&key).copied() else {
            return Ok(false);
        };

        let record = StoreRecord::tombstone(key, state.next_sequence);
        self.append_durable(backend.as_mut(), &record)?;

        state.next_sequence += 1;
        state.index.remove(&key);
        state.dead_bytes += (previous.len + record.encoded_size()) as u64;
        Ok(true)
    }

    /// Removes `key` only if its current value equals `expected`.
    ///
    /// Returns whether the key was removed. The comparison and the removal
    /// happen under one lock.
    ///
    /// # Errors
    ///
    /// Fails if the current value cannot be read or the tombstone written.
    pub fn delete_if(&self, key: i64, expected: &[u8]) -> StorageResult<bool> {
        let mut backend = self.backend.lock();
        let mut state = self.state.write();

        let Some(previous) = state.index.get(&key).copied() else {
            return Ok(false);
        };
        if self.read_entry(backend.as_ref(), previous)?.payload != expected {
            return Ok(false);
        }

        let record = StoreRecord::tombstone(key, state.next_sequence);
        self.append_durable(backend.as_mut(), &record)?;

        state.next_sequence += 1;
        state.index.remove(&key);
        state.dead_bytes += (previous.len + record.encoded_size()) as u64;
        Ok(true)
    }

    /// Returns whether `key` is live.
    #[must_use]
    pub fn contains(&self, key: i64) -> bool {
        self.state.read().index.contains_key(&key)
    }

    /// Returns the number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().index.len()
    }

    /// Returns whether the store has no live keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the largest live key.
    #[must_use]
    pub fn max_key(&self) -> Option<i64> {
        self.state.read().index.keys().next_back().copied()
    }

    /// Returns size accounting for the store.
    ///
    /// # Errors
    ///
    /// Fails if the backend size cannot be read.
    pub fn stats(&self) -> StorageResult<StoreStats> {
        let backend = self.backend.lock();
        let state = self.state.read();
        Ok(StoreStats {
            live_records: state.index.len(),
            log_bytes: backend.size()?,
            dead_bytes: state.dead_bytes,
        })
    }

    /// Rewrites the log so it holds only live records.
    ///
    /// `install` receives the compacted log bytes and must return a backend
    /// already holding exactly those bytes; it replaces the current backend.
    /// Returns the stats after compaction.
    ///
    /// # Errors
    ///
    /// Fails if the live records cannot be read or `install` fails. On
    /// failure the current backend is kept.
    pub fn compact<F>(&self, install: F) -> StorageResult<StoreStats>
    where
        F: FnOnce(&[u8]) -> StorageResult<Box<dyn StorageBackend>>,
    {
        let mut backend = self.backend.lock();
        let mut state = self.state.write();

        let mut log = Vec::new();
        for (sequence, (key, entry)) in state.index.iter().enumerate() {
            let record = self.read_entry(backend.as_ref(), *entry)?;
            log.extend_from_slice(&StoreRecord::put(*key, record.payload, sequence as u64).encode());
        }

        let replacement = install(&log)?;
        let (new_state, _) = replay(&self.name, &log)?;

        let mut old = std::mem::replace(&mut *backend, replacement);
        if let Err(err) = old.close() {
            tracing::warn!(store = %self.name, error = %err, "closing pre-compaction log failed");
        }
        *state = new_state;

        Ok(StoreStats {
            live_records: state.index.len(),
            log_bytes: log.len() as u64,
            dead_bytes: 0,
        })
    }

    /// Syncs the log to durable media.
    ///
    /// # Errors
    ///
    /// Fails if the backend sync fails.
    pub fn sync(&self) -> StorageResult<()> {
        self.backend.lock().sync()?;
        Ok(())
    }

    /// Syncs and closes the backend. Later operations fail.
    ///
    /// # Errors
    ///
    /// Fails if the final sync fails.
    pub fn close(&self) -> StorageResult<()> {
        self.backend.lock().close()?;
        Ok(())
    }

    fn append_durable(
        &self,
        backend: &mut dyn StorageBackend,
        record: &StoreRecord,
    ) -> StorageResult<u64> {
        let start = backend.size()?;
        let written = backend.append(&record.encode()).and_then(|offset| {
            if self.sync_on_write {
                backend.sync()?;
            } else {
                backend.flush()?;
            }
            Ok(offset)
        });

        match written {
            Ok(offset) => Ok(offset),
            Err(err) => {
                // A failed write must not reappear at the next replay.
                let rollback = match backend.size() {
                    Ok(size) if size > start => backend.truncate(start),
                    Ok(_) => Ok(()),
                    Err(size_err) => Err(size_err),
                };
                if let Err(rollback_err) = rollback {
                    tracing::error!(
                        store = %self.name,
                        error = %rollback_err,
                        "failed to roll back partial write"
                    );
                }
                Err(err.into())
            }
        }
    }

    fn read_entry(
        &self,
        backend: &dyn StorageBackend,
        entry: IndexEntry,
    ) -> StorageResult<StoreRecord> {
        let data = backend.read_at(entry.offset, entry.len)?;
        StoreRecord::decode(&data).map_err(|err| {
            StorageError::corrupted(&self.name, format!("offset {}: {err}", entry.offset))
        })
    }
}

/// Rebuilds store state from a log; returns it with the valid log length.
fn replay(name: &str, log: &[u8]) -> StorageResult<(LogState, u64)> {
    let scan = scan_log(log).map_err(|err| match err {
        StorageError::ChecksumMismatch { .. } => err,
        other => StorageError::corrupted(name, other.to_string()),
    })?;

    let mut state = LogState::default();
    for (offset, record) in scan.records {
        let len = record.encoded_size();
        state.next_sequence = state.next_sequence.max(record.sequence + 1);

        let previous = if record.is_tombstone() {
            state.dead_bytes += len as u64;
            state.index.remove(&record.key)
        } else {
            state.index.insert(record.key, IndexEntry { offset, len })
        };
        if let Some(previous) = previous {
            state.dead_bytes += previous.len as u64;
        }
    }

    Ok((state, scan.valid_len))
}
