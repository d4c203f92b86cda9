//! The sync queue: notes whose latest local write is not yet delivered.

use crate::codec::{decode_note, encode_note};
use crate::database::Database;
use crate::error::StorageResult;
use crate::migration::SYNC_QUEUE_STORE;
use crate::note::{Note, NoteId};
use crate::object_store::ObjectStore;
use std::sync::Arc;

/// Durable set of pending deliveries, one entry per note id.
///
/// Enqueuing an id that is already pending replaces its payload, so
/// repeated edits collapse into the latest version.
#[derive(Debug, Clone)]
pub struct SyncQueue {
    store: Arc<ObjectStore>,
}

impl SyncQueue {
    /// Binds to the `sync_queue` store of `db`.
    ///
    /// # Errors
    ///
    /// Fails if the database is closed.
    pub fn open(db: &Database) -> StorageResult<Self> {
        Ok(Self {
            store: db.store(SYNC_QUEUE_STORE)?,
        })
    }

    /// Marks `note` as pending, replacing any earlier payload for its id.
    ///
    /// # Errors
    ///
    /// Fails if the write cannot be made durable.
    pub fn enqueue(&self, note: &Note) -> StorageResult<()> {
        self.store.put(note.id.as_i64(), encode_note(note)?)?;
        tracing::debug!(id = %note.id, "note queued for sync");
        Ok(())
    }

    /// Removes the entry for `id` unconditionally.
    ///
    /// # Errors
    ///
    /// Fails if the delete cannot be made durable.
    pub fn dequeue(&self, id: NoteId) -> StorageResult<bool> {
        self.store.delete(id.as_i64())
    }

    /// Removes the entry for `delivered.id` only if the pending payload is
    /// still `delivered`.
    ///
    /// Returns `false` when the note was edited again after delivery began;
    /// the newer payload stays pending.
    ///
    /// # Errors
    ///
    /// Fails on read error or if the delete cannot be made durable.
    pub fn acknowledge(&self, delivered: &Note) -> StorageResult<bool> {
        let removed = self
            .store
            .delete_if(delivered.id.as_i64(), &encode_note(delivered)?)?;
        if !removed {
            tracing::debug!(id = %delivered.id, "pending entry changed during delivery; kept");
        }
        Ok(removed)
    }

    /// All pending notes, in id order.
    ///
    /// # Errors
    ///
    /// Fails on read error or a malformed payload.
    pub fn list_pending(&self) -> StorageResult<Vec<Note>> {
        self.store
            .get_all()?
            .into_iter()
            .map(|(_, bytes)| decode_note(&bytes))
            .collect()
    }

    /// Returns whether `id` is pending.
    #[must_use]
    pub fn contains(&self, id: NoteId) -> bool {
        self.store.contains(id.as_i64())
    }

    /// Number of pending entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Returns whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::note::now_timestamp;

    fn note(id: i64, content: &str) -> Note {
        Note::new(NoteId::new(id), Some("t".into()), content, now_timestamp())
    }

    #[test]
    fn edits_collapse_to_one_entry() {
        let db = Database::open_in_memory().unwrap();
        let queue = SyncQueue::open(&db).unwrap();

        queue.enqueue(&note(1, "v1")).unwrap();
        queue.enqueue(&note(1, "v2")).unwrap();

        let pending = queue.list_pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].content, "v2");
    }

    #[test]
    fn dequeue_removes() {
        let db = Database::open_in_memory().unwrap();
        let queue = SyncQueue::open(&db).unwrap();
        queue.enqueue(&note(1, "v1")).unwrap();

        assert!(queue.dequeue(NoteId::new(1)).unwrap());
        assert!(!queue.contains(NoteId::new(1)));
        assert!(!queue.dequeue(NoteId::new(1)).unwrap());
    }

    #[test]
    fn acknowledge_matches_payload() {
        let db = Database::open_in_memory().unwrap();
        let queue = SyncQueue::open(&db).unwrap();
        let delivered = note(1, "v1");
        queue.enqueue(&delivered).unwrap();

        assert!(queue.acknowledge(&delivered).unwrap());
        assert!(queue.is_empty());
    }

    #[test]
    fn acknowledge_keeps_newer_edit() {
        let db = Database::open_in_memory().unwrap();
        let queue = SyncQueue::open(&db).unwrap();
        let delivered = note(1, "v1");
        queue.enqueue(&delivered).unwrap();
        queue.enqueue(&note(1, "v2")).unwrap();

        assert!(!queue.acknowledge(&delivered).unwrap());
        assert_eq!(queue.list_pending().unwrap()[0].content, "v2");
    }
}
