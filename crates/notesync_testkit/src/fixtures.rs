//! Test fixtures and database helpers.

use crate::fault::{FaultSwitch, FaultyBackend};
use notesync_core::{
    Config, Database, FileBackend, NoteRepository, StorageBackend, NOTES_STORE, SYNC_QUEUE_STORE,
};
use notesync_storage::InMemoryBackend;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// A test database with automatic cleanup.
pub struct TestDatabase {
    /// The database instance.
    pub db: Arc<Database>,
    /// Keeps the directory of a file database alive.
    temp_dir: Option<TempDir>,
}

impl TestDatabase {
    /// Creates an in-memory test database.
    pub fn memory() -> Self {
        Self {
            db: Arc::new(Database::open_in_memory().expect("Failed to open in-memory database")),
            temp_dir: None,
        }
    }

    /// Creates a file-based test database in a fresh temp directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Database::open(&temp_dir.path().join("notes.db"))
            .expect("Failed to open file database");
        Self {
            db: Arc::new(db),
            temp_dir: Some(temp_dir),
        }
    }

    /// Creates an in-memory database whose sync queue fails writes while
    /// the returned switch is on.
    pub fn with_faulty_queue() -> (Self, FaultSwitch) {
        let switch = FaultSwitch::new();
        let mut backends: HashMap<String, Box<dyn StorageBackend>> = HashMap::new();
        backends.insert(
            SYNC_QUEUE_STORE.to_string(),
            Box::new(FaultyBackend::new(InMemoryBackend::new(), switch.clone())),
        );
        let db = Database::open_with_backends(Config::default(), backends)
            .expect("Failed to open faulty database");
        (
            Self {
                db: Arc::new(db),
                temp_dir: None,
            },
            switch,
        )
    }

    /// Creates a file database whose notes log misbehaves as the returned
    /// switch says.
    ///
    /// The database is created on disk first, so [`TestDatabase::reopen`]
    /// afterwards replays the logs without any fault injection.
    pub fn file_with_faulty_notes() -> (Self, FaultSwitch) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("notes.db");
        Database::open(&path)
            .expect("Failed to create file database")
            .close()
            .expect("Failed to close file database");

        let log_path = |name: &str| path.join("stores").join(format!("{name}.log"));
        let switch = FaultSwitch::new();
        let notes = FileBackend::open(&log_path(NOTES_STORE)).expect("Failed to open notes log");
        let queue =
            FileBackend::open(&log_path(SYNC_QUEUE_STORE)).expect("Failed to open queue log");

        let mut backends: HashMap<String, Box<dyn StorageBackend>> = HashMap::new();
        backends.insert(
            NOTES_STORE.to_string(),
            Box::new(FaultyBackend::new(notes, switch.clone())),
        );
        backends.insert(SYNC_QUEUE_STORE.to_string(), Box::new(queue));
        let db = Database::open_with_backends(Config::default(), backends)
            .expect("Failed to open faulty database");
        (
            Self {
                db: Arc::new(db),
                temp_dir: Some(temp_dir),
            },
            switch,
        )
    }

    /// Returns the database path if file-based, None if in-memory.
    pub fn path(&self) -> Option<PathBuf> {
        self.temp_dir.as_ref().map(|d| d.path().join("notes.db"))
    }

    /// Creates a repository over this database.
    pub fn repository(&self) -> NoteRepository {
        NoteRepository::new(Arc::clone(&self.db)).expect("Failed to create repository")
    }

    /// Closes the database and opens it again from disk, simulating a
    /// process restart.
    ///
    /// Every other handle to the database (repositories, engines) must be
    /// dropped first, otherwise the directory lock is still held.
    pub fn reopen(self) -> Self {
        let path = self.path().expect("Only file databases can be reopened");
        let Self { db, temp_dir } = self;
        db.close().expect("Failed to close database");
        drop(db);

        let db = Database::open(&path).expect("Failed to reopen database");
        Self {
            db: Arc::new(db),
            temp_dir,
        }
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Runs a test with a temporary in-memory database.
pub fn with_temp_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database) -> R,
{
    let test_db = TestDatabase::memory();
    f(&test_db.db)
}
