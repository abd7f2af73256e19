//! Persisted delegate records.
//!
//! ADD and DEL run in separate processes, so the delegate list resolved at ADD
//! time is written to disk and read back by DEL. [`FileStore`] keeps one file
//! per container inside a directory. Writes go to a temporary file in the same
//! directory which is renamed over the destination once complete, so a reader
//! sees either the previous record or the new one, never a partial write.

use std::fs;
use std::io::{self, Write};
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use thiserror::Error;
use tracing::debug;

/// Tracing target for the delegate store.
const STORE_TARGET: &str = "multinet::store";

/// Characters escaped in record file names.
///
/// Path separators and `.` are escaped so an identifier can never name a
/// parent directory or a hidden temporary file; `%` is escaped so the
/// encoding stays unambiguous.
const FILENAME_ESCAPES: &AsciiSet = &CONTROLS
    .add(b'/')
    .add(b'\\')
    .add(b':')
    .add(b'%')
    .add(b'.')
    .add(b' ');

/// Errors raised by the delegate store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// No record exists for the container.
    #[error("no delegate record for container '{container_id}'")]
    NotFound {
        /// Container identifier.
        container_id: String,
    },

    /// The container identifier cannot name a record.
    #[error("container identifier must not be empty")]
    EmptyId,

    /// Reading or writing the record failed.
    #[error("delegate record I/O failed at {path}: {source}")]
    Io {
        /// Record or directory path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
}

impl StoreError {
    fn io(path: &Utf8Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source: Arc::new(source),
        }
    }
}

/// Durable mapping from container identifier to a serialised delegate list.
pub trait DelegateStore {
    /// Stores `record` for `container_id`, replacing any previous record.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the record cannot be written.
    fn save(&self, container_id: &str, record: &[u8]) -> Result<(), StoreError>;

    /// Loads the record for `container_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no record exists, or another
    /// [`StoreError`] if it cannot be read.
    fn load(&self, container_id: &str) -> Result<Vec<u8>, StoreError>;

    /// Removes the record for `container_id`. Removing a missing record
    /// succeeds.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the record exists but cannot be removed.
    fn remove(&self, container_id: &str) -> Result<(), StoreError>;
}

impl<T: DelegateStore + ?Sized> DelegateStore for &T {
    fn save(&self, container_id: &str, record: &[u8]) -> Result<(), StoreError> {
        (**self).save(container_id, record)
    }

    fn load(&self, container_id: &str) -> Result<Vec<u8>, StoreError> {
        (**self).load(container_id)
    }

    fn remove(&self, container_id: &str) -> Result<(), StoreError> {
        (**self).remove(container_id)
    }
}

/// Directory-backed [`DelegateStore`].
///
/// # Example
///
/// ```
/// use multinet::store::{DelegateStore, FileStore, StoreError};
///
/// let dir = tempfile::tempdir().expect("temp dir");
/// let path = camino::Utf8Path::from_path(dir.path()).expect("utf-8 path");
/// let store = FileStore::new(path);
///
/// store.save("c0ffee", b"[]").expect("save");
/// assert_eq!(store.load("c0ffee").expect("load"), b"[]");
/// store.remove("c0ffee").expect("remove");
/// assert!(matches!(store.load("c0ffee"), Err(StoreError::NotFound { .. })));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStore {
    dir: Utf8PathBuf,
}

impl FileStore {
    /// Creates a store rooted at `dir`; the directory is created on first
    /// save.
    #[must_use]
    pub fn new(dir: impl Into<Utf8PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the record for `container_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EmptyId`] for an empty identifier.
    pub fn record_path(&self, container_id: &str) -> Result<Utf8PathBuf, StoreError> {
        if container_id.is_empty() {
            return Err(StoreError::EmptyId);
        }
        let file_name = utf8_percent_encode(container_id, FILENAME_ESCAPES).to_string();
        Ok(self.dir.join(file_name))
    }
}

impl DelegateStore for FileStore {
    fn save(&self, container_id: &str, record: &[u8]) -> Result<(), StoreError> {
        let path = self.record_path(container_id)?;
        fs::create_dir_all(&self.dir).map_err(|err| StoreError::io(&self.dir, err))?;

        // The temporary file is deleted on drop if any step below fails.
        let mut staged =
            tempfile::NamedTempFile::new_in(&self.dir).map_err(|err| StoreError::io(&path, err))?;
        staged
            .write_all(record)
            .and_then(|()| staged.as_file().sync_all())
            .map_err(|err| StoreError::io(&path, err))?;
        staged
            .persist(&path)
            .map_err(|err| StoreError::io(&path, err.error))?;

        debug!(
            target: STORE_TARGET,
            container_id,
            path = %path,
            bytes = record.len(),
            "saved delegate record"
        );
        Ok(())
    }

    fn load(&self, container_id: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.record_path(container_id)?;
        fs::read(&path).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound {
                container_id: container_id.to_owned(),
            },
            _ => StoreError::io(&path, err),
        })
    }

    fn remove(&self, container_id: &str) -> Result<(), StoreError> {
        let path = self.record_path(container_id)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(
                    target: STORE_TARGET,
                    container_id,
                    path = %path,
                    "removed delegate record"
                );
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StoreError::io(&path, err)),
        }
    }
}
