//! The durable note store.

use crate::codec::{decode_note, encode_note};
use crate::database::Database;
use crate::error::{StorageError, StorageResult};
use crate::migration::NOTES_STORE;
use crate::note::{Note, NoteId};
use crate::object_store::ObjectStore;
use std::sync::Arc;

/// Authoritative local collection of notes, keyed by id.
///
/// Operations block on store I/O; async callers go through
/// [`crate::NoteRepository`].
#[derive(Debug, Clone)]
pub struct NoteStore {
    store: Arc<ObjectStore>,
}

impl NoteStore {
    /// Binds to the `notes` store of `db`.
    ///
    /// # Errors
    ///
    /// Fails if the database is closed.
    pub fn open(db: &Database) -> StorageResult<Self> {
        Ok(Self {
            store: db.store(NOTES_STORE)?,
        })
    }

    /// Inserts or replaces `note` by id.
    ///
    /// # Errors
    ///
    /// Fails if the write cannot be made durable.
    pub fn put(&self, note: &Note) -> StorageResult<()> {
        self.store.put(note.id.as_i64(), encode_note(note)?)?;
        tracing::debug!(id = %note.id, "note stored");
        Ok(())
    }

    /// Returns the note with `id`.
    ///
    /// # Errors
    ///
    /// Fails on read error or a malformed payload.
    pub fn get(&self, id: NoteId) -> StorageResult<Option<Note>> {
        match self.store.get(id.as_i64())? {
            Some(bytes) => self.decode(id.as_i64(), &bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Returns every stored note, in id order.
    ///
    /// # Errors
    ///
    /// Fails on read error or a malformed payload.
    pub fn get_all(&self) -> StorageResult<Vec<Note>> {
        self.store
            .get_all()?
            .into_iter()
            .map(|(key, bytes)| self.decode(key, &bytes))
            .collect()
    }

    /// Removes the note with `id`. Removing an absent note succeeds.
    ///
    /// Returns whether a note was removed.
    ///
    /// # Errors
    ///
    /// Fails if the delete cannot be made durable.
    pub fn delete(&self, id: NoteId) -> StorageResult<bool> {
        let removed = self.store.delete(id.as_i64())?;
        tracing::debug!(%id, removed, "note deleted");
        Ok(removed)
    }

    /// Number of stored notes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Returns whether no notes are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Largest stored id.
    #[must_use]
    pub fn max_id(&self) -> Option<NoteId> {
        self.store.max_key().map(NoteId::new)
    }

    fn decode(&self, key: i64, bytes: &[u8]) -> StorageResult<Note> {
        let note = decode_note(bytes)?;
        if note.id.as_i64() != key {
            return Err(StorageError::corrupted(
                self.store.name(),
                format!("key {key} holds note {}", note.id),
            ));
        }
        Ok(note)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::note::now_timestamp;

    fn note(id: i64, content: &str) -> Note {
        Note::new(NoteId::new(id), None, content, now_timestamp())
    }

    #[test]
    fn put_get_delete() {
        let db = Database::open_in_memory().unwrap();
        let store = NoteStore::open(&db).unwrap();

        store.put(&note(1, "one")).unwrap();
        assert_eq!(store.get(NoteId::new(1)).unwrap().unwrap().content, "one");
        assert!(store.get(NoteId::new(2)).unwrap().is_none());

        assert!(store.delete(NoteId::new(1)).unwrap());
        assert!(!store.delete(NoteId::new(1)).unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn last_write_wins() {
        let db = Database::open_in_memory().unwrap();
        let store = NoteStore::open(&db).unwrap();

        store.put(&note(1, "first")).unwrap();
        store.put(&note(1, "second")).unwrap();

        let all = store.get_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].content, "second");
    }

    #[test]
    fn max_id_tracks_largest_key() {
        let db = Database::open_in_memory().unwrap();
        let store = NoteStore::open(&db).unwrap();
        assert_eq!(store.max_id(), None);

        store.put(&note(30, "a")).unwrap();
        store.put(&note(10, "b")).unwrap();
        assert_eq!(store.max_id(), Some(NoteId::new(30)));
    }

    #[test]
    fn mismatched_key_is_corruption() {
        let db = Database::open_in_memory().unwrap();
        let raw = db.store(NOTES_STORE).unwrap();
        raw.put(5, encode_note(&note(6, "x")).unwrap()).unwrap();

        let store = NoteStore::open(&db).unwrap();
        let err = store.get(NoteId::new(5)).unwrap_err();
        assert!(matches!(err, StorageError::Corrupted { .. }));
    }
}
