//! Client context: one object owning the database, engine and edit state.

use crate::config::SyncConfig;
use crate::connectivity::Connectivity;
use crate::error::{SyncError, SyncResult};
use crate::http::{HttpTransport, ReqwestClient};
use crate::scheduler::AutoSync;
use crate::state::{SyncEngine, SyncOutcome};
use crate::transport::SyncTransport;
use notesync_core::{Database, Note, NoteDraft, NoteId, NoteRepository};
use parking_lot::Mutex;
use std::sync::Arc;

/// Result of [`NotesClient::submit`].
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    /// The note as stored.
    pub note: Note,
    /// The sync run that followed, if the device was online.
    pub sync: Option<SyncOutcome>,
}

/// Application context for a notes client.
///
/// Owns the database, the repository, the sync engine, the connectivity
/// signal, the auto-sync task and the id of the note being edited.
pub struct NotesClient<T: SyncTransport + 'static = HttpTransport<ReqwestClient>> {
    db: Arc<Database>,
    repo: NoteRepository,
    engine: Arc<SyncEngine<T>>,
    auto_sync: AutoSync,
    editing: Mutex<Option<NoteId>>,
}

impl<T: SyncTransport + 'static> std::fmt::Debug for NotesClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotesClient")
            .field("db", &self.db)
            .field("engine", &self.engine)
            .field("editing", &*self.editing.lock())
            .finish()
    }
}

impl NotesClient {
    /// Opens a client delivering over HTTP as configured.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Fails if the repository or the HTTP client cannot be created.
    pub fn open_http(
        db: Database,
        config: &SyncConfig,
        connectivity: Connectivity,
    ) -> SyncResult<Self> {
        let transport = HttpTransport::from_config(config)?;
        Self::open(db, transport, connectivity, config)
    }
}

impl<T: SyncTransport + 'static> NotesClient<T> {
    /// Opens a client over `db` delivering through `transport`, and starts
    /// the auto-sync task.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Fails if the database is closed.
    pub fn open(
        db: Database,
        transport: T,
        connectivity: Connectivity,
        config: &SyncConfig,
    ) -> SyncResult<Self> {
        let db = Arc::new(db);
        let repo = NoteRepository::new(Arc::clone(&db))?;
        let engine = Arc::new(SyncEngine::new(transport, repo.clone(), connectivity));
        let auto_sync = AutoSync::spawn(Arc::clone(&engine), config.settle_delay);
        Ok(Self {
            db,
            repo,
            engine,
            auto_sync,
            editing: Mutex::new(None),
        })
    }

    /// The repository.
    pub fn repository(&self) -> &NoteRepository {
        &self.repo
    }

    /// The sync engine.
    pub fn engine(&self) -> &Arc<SyncEngine<T>> {
        &self.engine
    }

    /// The connectivity signal.
    pub fn connectivity(&self) -> &Connectivity {
        self.engine.connectivity()
    }

    /// Id of the note being edited, if any.
    pub fn editing(&self) -> Option<NoteId> {
        *self.editing.lock()
    }

    /// Starts editing `id`; the next [`submit`](Self::submit) updates it.
    ///
    /// # Errors
    ///
    /// `NoteNotFound` if no such note exists.
    pub async fn begin_edit(&self, id: NoteId) -> SyncResult<Note> {
        let note = self
            .repo
            .get(id)
            .await?
            .ok_or(SyncError::NoteNotFound { id })?;
        *self.editing.lock() = Some(id);
        Ok(note)
    }

    /// Abandons the current edit.
    pub fn cancel_edit(&self) {
        *self.editing.lock() = None;
    }

    /// Saves a note from form input, then syncs if online.
    ///
    /// Title and content are trimmed; a blank title is stored as none. The
    /// note being edited is updated, otherwise a new note is created. The
    /// edit state is cleared once the note is stored.
    ///
    /// A failed sync does not fail the submit; the note stays queued.
    ///
    /// # Errors
    ///
    /// `EmptyNote` when both fields are blank, or the save error.
    pub async fn submit(&self, title: &str, content: &str) -> SyncResult<SubmitOutcome> {
        let title = title.trim();
        let content = content.trim();
        if title.is_empty() && content.is_empty() {
            return Err(SyncError::EmptyNote);
        }

        let mut draft = NoteDraft::new(content);
        if !title.is_empty() {
            draft = draft.with_title(title);
        }
        if let Some(id) = self.editing() {
            draft = draft.with_id(id);
        }

        let note = self.repo.save(draft).await.inspect_err(|err| {
            if err.is_saved_locally() {
                tracing::warn!(error = %err, "saved locally, will sync later");
            }
        })?;
        self.cancel_edit();

        let sync = if self.connectivity().is_online() {
            match self.engine.sync_all().await {
                Ok(outcome) => Some(outcome),
                Err(err) => {
                    tracing::error!(error = %err, "sync after save failed");
                    None
                }
            }
        } else {
            None
        };

        Ok(SubmitOutcome { note, sync })
    }

    /// Deletes a note locally. Nothing is sent to the remote side.
    ///
    /// # Errors
    ///
    /// Fails if either store cannot be updated.
    pub async fn delete(&self, id: NoteId) -> SyncResult<bool> {
        let existed = self.repo.remove(id).await?;
        let mut editing = self.editing.lock();
        if *editing == Some(id) {
            *editing = None;
        }
        Ok(existed)
    }

    /// Every note, newest first.
    ///
    /// # Errors
    ///
    /// Fails on read error.
    pub async fn notes(&self) -> SyncResult<Vec<Note>> {
        Ok(self.repo.load_all().await?)
    }

    /// Runs a sync now.
    ///
    /// # Errors
    ///
    /// Fails only if the queue cannot be read.
    pub async fn sync_now(&self) -> SyncResult<SyncOutcome> {
        self.engine.sync_all().await
    }

    /// Stops auto-sync and closes the database.
    ///
    /// # Errors
    ///
    /// Fails if a store cannot be closed cleanly.
    pub fn close(&self) -> SyncResult<()> {
        self.auto_sync.stop();
        self.db.close()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    fn client(online: bool) -> NotesClient<Arc<MockTransport>> {
        client_with(Arc::new(MockTransport::new()), online)
    }

    fn client_with(transport: Arc<MockTransport>, online: bool) -> NotesClient<Arc<MockTransport>> {
        NotesClient::open(
            Database::open_in_memory().unwrap(),
            transport,
            Connectivity::new(online),
            &SyncConfig::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn blank_submission_is_rejected() {
        let client = client(false);
        let err = client.submit("  ", "\n").await.unwrap_err();
        assert!(matches!(err, SyncError::EmptyNote));
        assert!(client.notes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn submit_trims_and_drops_blank_title() {
        let client = client(false);
        let outcome = client.submit("   ", "  body  ").await.unwrap();
        assert_eq!(outcome.note.title, None);
        assert_eq!(outcome.note.content, "body");
        assert!(outcome.sync.is_none());
    }

    #[tokio::test]
    async fn online_submit_syncs_immediately() {
        let transport = Arc::new(MockTransport::new());
        let client = client_with(Arc::clone(&transport), true);

        let outcome = client.submit("T", "C").await.unwrap();
        assert_eq!(outcome.sync.unwrap().succeeded(), 1);
        assert_eq!(transport.calls(), 1);
        assert_eq!(client.repository().pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn edit_session_updates_in_place() {
        let client = client(false);
        let original = client.submit("Title", "first").await.unwrap().note;

        let loaded = client.begin_edit(original.id).await.unwrap();
        assert_eq!(loaded, original);
        assert_eq!(client.editing(), Some(original.id));

        let updated = client.submit("Title", "second").await.unwrap().note;
        assert_eq!(updated.id, original.id);
        assert_eq!(client.editing(), None);

        let notes = client.notes().await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].content, "second");
    }

    #[tokio::test]
    async fn cancel_edit_creates_new_note() {
        let client = client(false);
        let original = client.submit("", "first").await.unwrap().note;
        client.begin_edit(original.id).await.unwrap();
        client.cancel_edit();

        let other = client.submit("", "second").await.unwrap().note;
        assert_ne!(other.id, original.id);
        assert_eq!(client.notes().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn editing_missing_note_fails() {
        let client = client(false);
        let err = client.begin_edit(NoteId::new(404)).await.unwrap_err();
        assert!(matches!(err, SyncError::NoteNotFound { .. }));
        assert_eq!(client.editing(), None);
    }

    #[tokio::test]
    async fn delete_clears_edit_state() {
        let client = client(false);
        let note = client.submit("x", "y").await.unwrap().note;
        client.begin_edit(note.id).await.unwrap();

        assert!(client.delete(note.id).await.unwrap());
        assert_eq!(client.editing(), None);
        assert_eq!(client.repository().pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn close_rejects_further_use() {
        let client = client(false);
        client.close().unwrap();
        let err = client.notes().await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::Storage(notesync_core::StorageError::DatabaseClosed)
        ));
    }
}
