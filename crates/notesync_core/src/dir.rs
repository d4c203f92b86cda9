//! Database directory layout and locking.
//!
//! ```text
//! <db_path>/
//! ├─ MANIFEST              # schema version and store list
//! ├─ LOCK                  # advisory lock, single process
//! └─ stores/
//!    ├─ notes.log          # one record log per object store
//!    └─ sync_queue.log
//! ```

use crate::error::{StorageError, StorageResult};
use crate::manifest::Manifest;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const MANIFEST_FILE: &str = "MANIFEST";
const MANIFEST_TEMP: &str = "MANIFEST.tmp";
const LOCK_FILE: &str = "LOCK";
const STORES_DIR: &str = "stores";

/// An opened database directory.
///
/// Holds an exclusive lock on `LOCK` for as long as it lives, so at most
/// one `DatabaseDir` exists per directory across processes.
#[derive(Debug)]
pub struct DatabaseDir {
    path: PathBuf,
    _lock_file: File,
}

impl DatabaseDir {
    /// Opens a database directory, creating it when `create_if_missing`.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseLocked` if another handle holds the lock, and
    /// `InvalidFormat` if the path is missing or is not a directory.
    pub fn open(path: &Path, create_if_missing: bool) -> StorageResult<Self> {
        if !path.exists() {
            if !create_if_missing {
                return Err(StorageError::invalid_format(format!(
                    "database directory does not exist: {}",
                    path.display()
                )));
            }
            fs::create_dir_all(path)?;
        }
        if !path.is_dir() {
            return Err(StorageError::invalid_format(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::DatabaseLocked);
        }

        fs::create_dir_all(path.join(STORES_DIR))?;

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Root directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the manifest file.
    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.path.join(MANIFEST_FILE)
    }

    /// Path of the log backing store `name`.
    #[must_use]
    pub fn store_log_path(&self, name: &str) -> PathBuf {
        self.path.join(STORES_DIR).join(format!("{name}.log"))
    }

    /// Loads the manifest, or `None` for a new database.
    ///
    /// # Errors
    ///
    /// Fails on I/O error or a malformed manifest.
    pub fn load_manifest(&self) -> StorageResult<Option<Manifest>> {
        let path = self.manifest_path();
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read(&path)?;
        if data.is_empty() {
            return Ok(None);
        }
        Manifest::decode(&data).map(Some)
    }

    /// Writes the manifest with write-then-rename.
    ///
    /// # Errors
    ///
    /// Fails on I/O error.
    pub fn save_manifest(&self, manifest: &Manifest) -> StorageResult<()> {
        let temp_path = self.path.join(MANIFEST_TEMP);
        write_synced(&temp_path, &manifest.encode()?)?;
        fs::rename(&temp_path, self.manifest_path())?;
        sync_dir(&self.path)
    }

    /// Atomically replaces the log of store `name` with `contents`.
    ///
    /// Returns the path of the installed log.
    ///
    /// # Errors
    ///
    /// Fails on I/O error. The previous log is intact on failure.
    pub fn replace_store_log(&self, name: &str, contents: &[u8]) -> StorageResult<PathBuf> {
        let target = self.store_log_path(name);
        let temp = self.path.join(STORES_DIR).join(format!("{name}.log.tmp"));
        write_synced(&temp, contents)?;
        fs::rename(&temp, &target)?;
        sync_dir(&self.path.join(STORES_DIR))?;
        Ok(target)
    }

    /// Removes the log of store `name`, if present.
    ///
    /// # Errors
    ///
    /// Fails on I/O error.
    pub fn remove_store_log(&self, name: &str) -> StorageResult<()> {
        let path = self.store_log_path(name);
        if path.exists() {
            fs::remove_file(&path)?;
            sync_dir(&self.path.join(STORES_DIR))?;
        }
        Ok(())
    }
}

fn write_synced(path: &Path, data: &[u8]) -> StorageResult<()> {
    let mut file = File::create(path)?;
    file.write_all(data)?;
    file.sync_all()?;
    Ok(())
}

#[cfg(unix)]
fn sync_dir(path: &Path) -> StorageResult<()> {
    File::open(path)?.sync_all()?;
    Ok(())
}

// NTFS journals metadata; directories cannot be opened for fsync there.
#[cfg(not(unix))]
fn sync_dir(_path: &Path) -> StorageResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn creates_layout() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("db");
        let dir = DatabaseDir::open(&path, true).unwrap();

        assert!(path.join(LOCK_FILE).exists());
        assert!(path.join(STORES_DIR).is_dir());
        assert_eq!(
            dir.store_log_path("notes"),
            path.join("stores").join("notes.log")
        );
    }

    #[test]
    fn missing_directory_without_create() {
        let temp = tempdir().unwrap();
        let result = DatabaseDir::open(&temp.path().join("nope"), false);
        assert!(matches!(result, Err(StorageError::InvalidFormat { .. })));
    }

    #[test]
    fn second_open_is_locked_out() {
        let temp = tempdir().unwrap();
        let _first = DatabaseDir::open(temp.path(), true).unwrap();
        let second = DatabaseDir::open(temp.path(), true);
        assert!(matches!(second, Err(StorageError::DatabaseLocked)));
    }

    #[test]
    fn lock_released_on_drop() {
        let temp = tempdir().unwrap();
        drop(DatabaseDir::open(temp.path(), true).unwrap());
        assert!(DatabaseDir::open(temp.path(), true).is_ok());
    }

    #[test]
    fn manifest_round_trip() {
        let temp = tempdir().unwrap();
        let dir = DatabaseDir::open(temp.path(), true).unwrap();
        assert!(dir.load_manifest().unwrap().is_none());

        let mut manifest = Manifest::default();
        manifest.schema_version = 2;
        manifest.stores.insert("notes".into());
        dir.save_manifest(&manifest).unwrap();

        assert_eq!(dir.load_manifest().unwrap(), Some(manifest));
        assert!(!temp.path().join(MANIFEST_TEMP).exists());
    }

    #[test]
    fn replace_store_log_swaps_contents() {
        let temp = tempdir().unwrap();
        let dir = DatabaseDir::open(temp.path(), true).unwrap();
        fs::write(dir.store_log_path("notes"), b"old contents").unwrap();

        let path = dir.replace_store_log("notes", b"new").unwrap();
        assert_eq!(fs::read(path).unwrap(), b"new");

        dir.remove_store_log("notes").unwrap();
        assert!(!dir.store_log_path("notes").exists());
    }
}
