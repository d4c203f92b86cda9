//! Async facade over the note store and the sync queue.

use crate::database::Database;
use crate::error::{StorageError, StorageResult};
use crate::note::{now_timestamp, IdGenerator, Note, NoteDraft, NoteId};
use crate::note_store::NoteStore;
use crate::sync_queue::SyncQueue;
use std::cmp::Reverse;
use std::sync::Arc;
use tokio::sync::Mutex;

struct Inner {
    db: Arc<Database>,
    notes: NoteStore,
    queue: SyncQueue,
    ids: IdGenerator,
    /// Serializes every mutation of either store.
    write_gate: Mutex<()>,
}

/// Note repository: every save is written durably, then queued for sync.
///
/// Store I/O runs on the blocking pool. Mutations (`save`, `remove`,
/// `acknowledge`) take one shared async lock, so a save never interleaves
/// with another save or with the sync engine's acknowledgement.
///
/// Cloning is cheap; clones share the same stores and lock.
#[derive(Clone)]
pub struct NoteRepository {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for NoteRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoteRepository")
            .field("notes", &self.inner.notes.len())
            .field("pending", &self.inner.queue.len())
            .finish()
    }
}

impl NoteRepository {
    /// Creates a repository over an open database.
    ///
    /// # Errors
    ///
    /// Fails if the database is closed.
    pub fn new(db: Arc<Database>) -> StorageResult<Self> {
        let notes = NoteStore::open(&db)?;
        let queue = SyncQueue::open(&db)?;
        let ids = IdGenerator::starting_after(notes.max_id().map_or(0, NoteId::as_i64));
        Ok(Self {
            inner: Arc::new(Inner {
                db,
                notes,
                queue,
                ids,
                write_gate: Mutex::new(()),
            }),
        })
    }

    /// The underlying database.
    #[must_use]
    pub fn database(&self) -> &Arc<Database> {
        &self.inner.db
    }

    /// Saves a draft and queues it for sync.
    ///
    /// A draft without an id gets a fresh one; a draft without a timestamp is
    /// stamped now. Returns the note as stored.
    ///
    /// # Errors
    ///
    /// Any store failure. If the note reached the note store but not the
    /// queue, the error is [`StorageError::NotQueued`] and the note is
    /// readable locally.
    pub async fn save(&self, draft: NoteDraft) -> StorageResult<Note> {
        let _gate = self.inner.write_gate.lock().await;

        let id = match draft.id {
            Some(id) => {
                self.inner.ids.observe(id);
                id
            }
            None => self.inner.ids.next(),
        };
        let note = Note::new(
            id,
            draft.title,
            draft.content,
            draft.timestamp.unwrap_or_else(now_timestamp),
        );

        self.run_blocking(move |inner| {
            inner.notes.put(&note)?;
            if let Err(err) = inner.queue.enqueue(&note) {
                tracing::warn!(id = %note.id, error = %err, "note saved locally but not queued");
                return Err(StorageError::NotQueued {
                    id: note.id,
                    source: Box::new(err),
                });
            }
            Ok(note)
        })
        .await
    }

    /// Every note, newest first. Equal timestamps order by id, descending.
    ///
    /// # Errors
    ///
    /// Fails on read error.
    pub async fn load_all(&self) -> StorageResult<Vec<Note>> {
        let mut notes = self.run_blocking(|inner| inner.notes.get_all()).await?;
        notes.sort_by_key(|note| Reverse((note.timestamp, note.id)));
        Ok(notes)
    }

    /// The note with `id`, if stored.
    ///
    /// # Errors
    ///
    /// Fails on read error.
    pub async fn get(&self, id: NoteId) -> StorageResult<Option<Note>> {
        self.run_blocking(move |inner| inner.notes.get(id)).await
    }

    /// Deletes the note locally and drops any pending delivery.
    ///
    /// Returns whether the note existed. Nothing is sent to the remote side.
    ///
    /// # Errors
    ///
    /// Fails if either delete cannot be made durable.
    pub async fn remove(&self, id: NoteId) -> StorageResult<bool> {
        let _gate = self.inner.write_gate.lock().await;
        self.run_blocking(move |inner| {
            let existed = inner.notes.delete(id)?;
            inner.queue.dequeue(id)?;
            Ok(existed)
        })
        .await
    }

    /// Notes awaiting delivery, in id order.
    ///
    /// # Errors
    ///
    /// Fails on read error.
    pub async fn pending(&self) -> StorageResult<Vec<Note>> {
        self.run_blocking(|inner| inner.queue.list_pending()).await
    }

    /// Number of notes awaiting delivery.
    ///
    /// # Errors
    ///
    /// Fails if the database is closed.
    pub async fn pending_count(&self) -> StorageResult<usize> {
        self.run_blocking(|inner| Ok(inner.queue.len())).await
    }

    /// Clears the pending entry for a delivered note, unless it was edited
    /// since. See [`SyncQueue::acknowledge`].
    ///
    /// # Errors
    ///
    /// Fails if the delete cannot be made durable.
    pub async fn acknowledge(&self, delivered: &Note) -> StorageResult<bool> {
        let _gate = self.inner.write_gate.lock().await;
        let delivered = delivered.clone();
        self.run_blocking(move |inner| inner.queue.acknowledge(&delivered))
            .await
    }

    async fn run_blocking<T, F>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Inner) -> StorageResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            if !inner.db.is_open() {
                return Err(StorageError::DatabaseClosed);
            }
            f(&inner)
        })
        .await
        .map_err(|err| StorageError::task_aborted(err.to_string()))?
    }
}
