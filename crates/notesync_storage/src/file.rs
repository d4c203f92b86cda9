//! File-based storage backend.

use crate::backend::StorageBackend;
use crate::error::{BackendError, BackendResult};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A byte log stored in a single OS file.
///
/// `flush` hands buffered bytes to the OS; `sync` calls `File::sync_all`.
/// The file handle sits behind a mutex so reads (which seek) and appends
/// never interleave.
///
/// Appends always write at the tracked size. A write that fails partway is
/// cut back off the file, so the next append never lands behind stray bytes.
///
/// ```no_run
/// use notesync_storage::{FileBackend, StorageBackend};
/// use std::path::Path;
///
/// let mut backend = FileBackend::open(Path::new("notes.log")).unwrap();
/// backend.append(b"payload").unwrap();
/// backend.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    file: Mutex<Option<File>>,
    size: u64,
    /// Set when a failed append could not be rolled back.
    stale_tail: bool,
}

impl FileBackend {
    /// Opens the file at `path`, creating it if absent.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be opened or its metadata read.
    pub fn open(path: &Path) -> BackendResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(Some(file)),
            size,
            stale_tail: false,
        })
    }

    /// Like [`FileBackend::open`], creating missing parent directories first.
    ///
    /// # Errors
    ///
    /// Fails if a directory or the file cannot be created.
    pub fn open_with_create_dirs(path: &Path) -> BackendResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Returns the path of the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_file<T>(&self, f: impl FnOnce(&mut File) -> std::io::Result<T>) -> BackendResult<T> {
        let mut guard = self.file.lock();
        let file = guard.as_mut().ok_or(BackendError::Closed)?;
        Ok(f(file)?)
    }
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> BackendResult<Vec<u8>> {
        let end = offset.saturating_add(len as u64);
        if end > self.size {
            return Err(BackendError::ReadPastEnd {
                offset,
                len,
                size: self.size,
            });
        }

        self.with_file(|file| {
            let mut buffer = vec![0u8; len];
            if len > 0 {
                file.seek(SeekFrom::Start(offset))?;
                file.read_exact(&mut buffer)?;
            }
            Ok(buffer)
        })
    }

    fn append(&mut self, data: &[u8]) -> BackendResult<u64> {
        let offset = self.size;
        if data.is_empty() {
            self.with_file(|_| Ok(()))?;
            return Ok(offset);
        }

        let stale_tail = self.stale_tail;
        let written = self.with_file(|file| {
            if stale_tail {
                file.set_len(offset)?;
            }
            file.seek(SeekFrom::Start(offset))?;
            match file.write_all(data) {
                Ok(()) => Ok(Ok(())),
                Err(err) => {
                    let rolled_back = file.set_len(offset).is_ok();
                    Ok(Err((err, rolled_back)))
                }
            }
        })?;

        match written {
            Ok(()) => {
                self.stale_tail = false;
                self.size += data.len() as u64;
                Ok(offset)
            }
            Err((err, rolled_back)) => {
                self.stale_tail = !rolled_back;
                Err(err.into())
            }
        }
    }

    fn flush(&mut self) -> BackendResult<()> {
        self.with_file(|file| file.flush())
    }

    fn sync(&mut self) -> BackendResult<()> {
        self.with_file(|file| file.sync_all())
    }

    fn size(&self) -> BackendResult<u64> {
        self.with_file(|_| Ok(()))?;
        Ok(self.size)
    }

    fn truncate(&mut self, new_size: u64) -> BackendResult<()> {
        if new_size > self.size {
            return Err(BackendError::InvalidTruncate {
                requested: new_size,
                size: self.size,
            });
        }

        self.with_file(|file| {
            file.set_len(new_size)?;
            file.sync_all()
        })?;
        self.size = new_size;
        self.stale_tail = false;
        Ok(())
    }

    fn close(&mut self) -> BackendResult<()> {
        let mut guard = self.file.lock();
        if let Some(file) = guard.take() {
            file.sync_all()?;
        }
        Ok(())
    }
}
