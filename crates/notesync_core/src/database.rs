//! Database handle: directory, manifest, migrations and object stores.

use crate::config::Config;
use crate::dir::DatabaseDir;
use crate::error::{StorageError, StorageResult};
use crate::manifest::Manifest;
use crate::migration::{MigrationManager, MigrationReport, SchemaVersion};
use crate::object_store::{ObjectStore, StoreStats};
use notesync_storage::{FileBackend, InMemoryBackend, StorageBackend};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// An open notesync database.
///
/// A database is a set of named [`ObjectStore`]s plus a manifest recording
/// the schema version. Opening runs any pending migrations, so a database
/// returned by `open*` always has the `notes` and `sync_queue` stores.
///
/// ```rust,ignore
/// use notesync_core::Database;
///
/// let db = Database::open(Path::new("notes_db"))?;
/// let notes = db.store("notes")?;
/// db.close()?;
/// ```
pub struct Database {
    config: Config,
    /// `None` for in-memory databases.
    dir: Option<DatabaseDir>,
    manifest: RwLock<Manifest>,
    stores: RwLock<BTreeMap<String, Arc<ObjectStore>>>,
    migration: MigrationReport,
    is_open: AtomicBool,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path())
            .field("schema_version", &self.schema_version())
            .field("stores", &self.store_names())
            .field("is_open", &self.is_open())
            .finish()
    }
}

impl Database {
    /// Opens or creates a database directory with default configuration.
    ///
    /// # Errors
    ///
    /// See [`Database::open_with_config`].
    pub fn open(path: &Path) -> StorageResult<Self> {
        Self::open_with_config(path, Config::default())
    }

    /// Opens or creates a database directory.
    ///
    /// Acquires the directory lock, loads the manifest, runs pending
    /// migrations, opens every store log and compacts stores whose
    /// superseded bytes pass the configured threshold.
    ///
    /// # Errors
    ///
    /// - `DatabaseLocked` if another handle has the directory open
    /// - `InvalidFormat` for an incompatible manifest
    /// - `SchemaTooNew` if the schema is newer than this build
    /// - `ChecksumMismatch` or `Corrupted` for a damaged store log
    pub fn open_with_config(path: &Path, config: Config) -> StorageResult<Self> {
        let dir = DatabaseDir::open(path, config.create_if_missing)?;

        let mut manifest = match dir.load_manifest()? {
            Some(manifest) => {
                if manifest.format_version.0 != config.format_version.0 {
                    return Err(StorageError::invalid_format(format!(
                        "incompatible format version {}.{} (expected {}.x)",
                        manifest.format_version.0,
                        manifest.format_version.1,
                        config.format_version.0
                    )));
                }
                manifest
            }
            None => Manifest::new(config.format_version),
        };

        let migration = MigrationManager::with_defaults().run(&mut manifest)?;
        if migration.changed() {
            for name in &migration.dropped_stores {
                dir.remove_store_log(name)?;
            }
            dir.save_manifest(&manifest)?;
        }

        let mut stores = BTreeMap::new();
        for name in &manifest.stores {
            let backend = FileBackend::open_with_create_dirs(&dir.store_log_path(name))?;
            let store = ObjectStore::open(name.clone(), Box::new(backend), config.sync_on_write)?;
            stores.insert(name.clone(), Arc::new(store));
        }

        tracing::info!(
            path = %path.display(),
            schema_version = manifest.schema_version,
            stores = stores.len(),
            "database opened"
        );

        let db = Self {
            config,
            dir: Some(dir),
            manifest: RwLock::new(manifest),
            stores: RwLock::new(stores),
            migration,
            is_open: AtomicBool::new(true),
        };
        db.compact_if_needed()?;
        Ok(db)
    }

    /// Opens a fresh in-memory database.
    ///
    /// # Errors
    ///
    /// Fails only if a migration fails.
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::open_with_backends(Config::default(), HashMap::new())
    }

    /// Opens an in-memory database over caller-supplied store backends.
    ///
    /// Stores named in `backends` replay the given backend; any other store
    /// created by migrations starts on an empty [`InMemoryBackend`]. Useful
    /// for fault injection and for reopening captured store bytes.
    ///
    /// # Errors
    ///
    /// Fails if a migration fails or a supplied backend cannot be replayed.
    pub fn open_with_backends(
        config: Config,
        mut backends: HashMap<String, Box<dyn StorageBackend>>,
    ) -> StorageResult<Self> {
        let mut manifest = Manifest::new(config.format_version);
        let migration = MigrationManager::with_defaults().run(&mut manifest)?;

        let mut stores = BTreeMap::new();
        for name in &manifest.stores {
            let backend = backends
                .remove(name)
                .unwrap_or_else(|| Box::new(InMemoryBackend::new()));
            let store = ObjectStore::open(name.clone(), backend, config.sync_on_write)?;
            stores.insert(name.clone(), Arc::new(store));
        }

        Ok(Self {
            config,
            dir: None,
            manifest: RwLock::new(manifest),
            stores: RwLock::new(stores),
            migration,
            is_open: AtomicBool::new(true),
        })
    }

    /// Returns the store named `name`.
    ///
    /// # Errors
    ///
    /// `DatabaseClosed` after [`Database::close`], `StoreNotFound` for an
    /// unknown name.
    pub fn store(&self, name: &str) -> StorageResult<Arc<ObjectStore>> {
        self.ensure_open()?;
        self.stores
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::StoreNotFound {
                name: name.to_string(),
            })
    }

    /// Names of all stores, sorted.
    #[must_use]
    pub fn store_names(&self) -> Vec<String> {
        self.stores.read().keys().cloned().collect()
    }

    /// Current schema version.
    #[must_use]
    pub fn schema_version(&self) -> SchemaVersion {
        self.manifest.read().schema_version
    }

    /// Migrations applied while opening this handle.
    #[must_use]
    pub fn migration_report(&self) -> &MigrationReport {
        &self.migration
    }

    /// Database directory, or `None` when in memory.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(DatabaseDir::path)
    }

    /// Returns whether the database accepts operations.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.is_open.load(Ordering::Acquire)
    }

    /// Size accounting for store `name`.
    ///
    /// # Errors
    ///
    /// Fails if the store is unknown or its size cannot be read.
    pub fn store_stats(&self, name: &str) -> StorageResult<StoreStats> {
        self.store(name)?.stats()
    }

    /// Rewrites store `name` so its log holds only live records.
    ///
    /// File-backed stores are rewritten to a temp file that is renamed over
    /// the old log.
    ///
    /// # Errors
    ///
    /// Fails on I/O error; the previous log stays in use on failure.
    pub fn compact_store(&self, name: &str) -> StorageResult<StoreStats> {
        let store = self.store(name)?;
        let before = store.stats()?;
        let after = match &self.dir {
            Some(dir) => store.compact(|log| {
                let path = dir.replace_store_log(name, log)?;
                Ok(Box::new(FileBackend::open(&path)?) as Box<dyn StorageBackend>)
            })?,
            None => store.compact(|log| {
                Ok(Box::new(InMemoryBackend::with_data(log.to_vec())) as Box<dyn StorageBackend>)
            })?,
        };
        tracing::info!(
            store = name,
            before_bytes = before.log_bytes,
            after_bytes = after.log_bytes,
            "compacted object store"
        );
        Ok(after)
    }

    /// Syncs every store to durable media.
    ///
    /// # Errors
    ///
    /// Fails if the database is closed or a sync fails.
    pub fn sync(&self) -> StorageResult<()> {
        self.ensure_open()?;
        for store in self.stores.read().values() {
            store.sync()?;
        }
        Ok(())
    }

    /// Syncs and closes every store. Later operations fail with
    /// `DatabaseClosed`. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Reports the first store that fails to close; the remaining stores are
    /// still closed.
    pub fn close(&self) -> StorageResult<()> {
        if !self.is_open.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        let mut first_error = None;
        for store in self.stores.read().values() {
            if let Err(err) = store.close() {
                tracing::error!(store = store.name(), error = %err, "failed to close store");
                first_error.get_or_insert(err);
            }
        }
        tracing::debug!("database closed");
        first_error.map_or(Ok(()), Err)
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(StorageError::DatabaseClosed)
        }
    }

    fn compact_if_needed(&self) -> StorageResult<()> {
        for name in self.store_names() {
            let stats = self.store_stats(&name)?;
            if stats.dead_bytes > 0
                && stats.log_bytes >= self.config.compaction_min_bytes
                && stats.dead_ratio() >= self.config.compaction_ratio
            {
                self.compact_store(&name)?;
            }
        }
        Ok(())
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!(error = %err, "closing database on drop failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::{NOTES_STORE, SYNC_QUEUE_STORE};
    use tempfile::tempdir;

    #[test]
    fn in_memory_has_both_stores() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.store_names(), vec![NOTES_STORE, SYNC_QUEUE_STORE]);
        assert_eq!(db.schema_version(), 2);
        assert!(db.path().is_none());
    }

    #[test]
    fn unknown_store() {
        let db = Database::open_in_memory().unwrap();
        let err = db.store("attachments").unwrap_err();
        assert!(matches!(err, StorageError::StoreNotFound { .. }));
    }

    #[test]
    fn data_survives_reopen() {
        let temp = tempdir().unwrap();
        {
            let db = Database::open(temp.path()).unwrap();
            assert_eq!(db.migration_report().applied.len(), 2);
            db.store(NOTES_STORE).unwrap().put(1, b"hello".to_vec()).unwrap();
            db.close().unwrap();
        }

        let db = Database::open(temp.path()).unwrap();
        assert!(!db.migration_report().changed());
        assert_eq!(
            db.store(NOTES_STORE).unwrap().get(1).unwrap(),
            Some(b"hello".to_vec())
        );
    }

    #[test]
    fn newer_schema_refuses_to_open() {
        let temp = tempdir().unwrap();
        drop(Database::open(temp.path()).unwrap());

        let dir = DatabaseDir::open(temp.path(), false).unwrap();
        let mut manifest = dir.load_manifest().unwrap().unwrap();
        manifest.schema_version = 9;
        dir.save_manifest(&manifest).unwrap();
        drop(dir);

        let err = Database::open(temp.path()).unwrap_err();
        assert!(matches!(err, StorageError::SchemaTooNew { found: 9, .. }));
    }

    #[test]
    fn incompatible_format_is_rejected() {
        let temp = tempdir().unwrap();
        drop(Database::open(temp.path()).unwrap());

        let config = Config {
            format_version: (2, 0),
            ..Config::default()
        };
        let err = Database::open_with_config(temp.path(), config).unwrap_err();
        assert!(matches!(err, StorageError::InvalidFormat { .. }));
    }

    #[test]
    fn second_handle_is_locked_out() {
        let temp = tempdir().unwrap();
        let _db = Database::open(temp.path()).unwrap();
        let err = Database::open(temp.path()).unwrap_err();
        assert!(matches!(err, StorageError::DatabaseLocked));
    }

    #[test]
    fn closed_database_rejects_operations() {
        let db = Database::open_in_memory().unwrap();
        db.close().unwrap();
        assert!(!db.is_open());
        assert!(matches!(db.store(NOTES_STORE), Err(StorageError::DatabaseClosed)));
        db.close().unwrap();
    }

    #[test]
    fn compaction_on_disk_keeps_live_records() {
        let temp = tempdir().unwrap();
        let db = Database::open(temp.path()).unwrap();
        let notes = db.store(NOTES_STORE).unwrap();
        for round in 0..20u8 {
            notes.put(1, vec![round; 32]).unwrap();
        }
        notes.put(2, b"keep".to_vec()).unwrap();

        let before = db.store_stats(NOTES_STORE).unwrap();
        let after = db.compact_store(NOTES_STORE).unwrap();
        assert!(after.log_bytes < before.log_bytes);
        assert_eq!(after.live_records, 2);

        let notes = db.store(NOTES_STORE).unwrap();
        assert_eq!(notes.get(1).unwrap(), Some(vec![19; 32]));
        notes.put(3, b"after".to_vec()).unwrap();
        db.close().unwrap();
        drop(db);

        let db = Database::open(temp.path()).unwrap();
        let notes = db.store(NOTES_STORE).unwrap();
        assert_eq!(notes.len(), 3);
        assert_eq!(notes.get(2).unwrap(), Some(b"keep".to_vec()));
    }

    #[test]
    fn open_compacts_stores_past_threshold() {
        let temp = tempdir().unwrap();
        let config = Config::default().compaction_min_bytes(0).compaction_ratio(0.5);
        {
            let db = Database::open_with_config(temp.path(), config.clone()).unwrap();
            let notes = db.store(NOTES_STORE).unwrap();
            for round in 0..10u8 {
                notes.put(7, vec![round; 16]).unwrap();
            }
        }

        let db = Database::open_with_config(temp.path(), config).unwrap();
        let stats = db.store_stats(NOTES_STORE).unwrap();
        assert_eq!(stats.dead_bytes, 0);
        assert_eq!(stats.live_records, 1);
    }

    #[test]
    fn supplied_backend_is_replayed() {
        let mut captured = Vec::new();
        {
            let db = Database::open_in_memory().unwrap();
            let notes = db.store(NOTES_STORE).unwrap();
            notes.put(5, b"x".to_vec()).unwrap();
            notes
                .compact(|log| {
                    captured = log.to_vec();
                    Ok(Box::new(InMemoryBackend::with_data(log.to_vec())) as Box<dyn StorageBackend>)
                })
                .unwrap();
        }

        let mut backends: HashMap<String, Box<dyn StorageBackend>> = HashMap::new();
        backends.insert(NOTES_STORE.to_string(), Box::new(InMemoryBackend::with_data(captured)));
        let db = Database::open_with_backends(Config::default(), backends).unwrap();
        assert_eq!(db.store(NOTES_STORE).unwrap().get(5).unwrap(), Some(b"x".to_vec()));
    }
}
