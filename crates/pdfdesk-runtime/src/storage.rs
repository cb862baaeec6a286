#![forbid(unsafe_code)]

//! Persistent key-value storage for settings caches.
//!
//! A [`StorageBackend`] maps string keys to JSON-encoded string values, the
//! same shape as browser local/session storage. Two backends ship here:
//!
//! - [`MemoryStorage`]: lives as long as the process (session-style).
//! - [`FileStorage`]: a single JSON object file on disk (local-style).
//!
//! [`StoredValue`] layers an [`Observable`] on top: it starts from the
//! stored value (or a default) and writes every change back.
//!
//! # Failure Modes
//!
//! - **Corrupt entry**: a stored value that does not decode as `T` is
//!   ignored with a warning and the default is used instead.
//! - **Write failure**: the in-memory value still changes; the error is
//!   logged and kept for [`StoredValue::take_error`].

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

use crate::reactive::{Observable, Subscription};

/// Errors from a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("storage JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// String-keyed, string-valued storage.
///
/// Methods take `&self`; backends use interior mutability so one backend can
/// be shared (`Rc<dyn StorageBackend>`) by many stored values.
pub trait StorageBackend {
    fn get(&self, key: &str) -> StorageResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;
    /// Returns whether the key existed.
    fn remove(&self, key: &str) -> StorageResult<bool>;
    /// All keys, sorted.
    fn keys(&self) -> StorageResult<Vec<String>>;
    fn clear(&self) -> StorageResult<()>;
}

// ============================================================================
// MemoryStorage
// ============================================================================

/// In-process storage, dropped with the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RefCell<BTreeMap<String, String>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl StorageBackend for MemoryStorage {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.entries
            .borrow_mut()
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        Ok(self.entries.borrow_mut().remove(key).is_some())
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.entries.borrow().keys().cloned().collect())
    }

    fn clear(&self) -> StorageResult<()> {
        self.entries.borrow_mut().clear();
        Ok(())
    }
}

// ============================================================================
// FileStorage
// ============================================================================

/// Storage persisted as one JSON object (`{"key": "value", ...}`).
///
/// The whole file is read on [`open`](Self::open) and rewritten on every
/// mutation. Each write goes to a sibling `.tmp` file that is then renamed
/// over the original, so a crash mid-write leaves the previous contents.
/// A mutation whose write fails is rolled back in memory as well.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: RefCell<BTreeMap<String, String>>,
}

impl FileStorage {
    /// Open (or lazily create) the storage file at `path`. A missing file
    /// is an empty store; the file is written on the first mutation.
    pub fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        let entries: BTreeMap<String, String> = match fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => BTreeMap::new(),
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(StorageError::Io { path, source }),
        };
        debug!(path = %path.display(), entries = entries.len(), "file storage opened");
        Ok(Self {
            path,
            entries: RefCell::new(entries),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> StorageResult<()> {
        let json = serde_json::to_string_pretty(&*self.entries.borrow())?;
        let tmp = tmp_path(&self.path);
        let io_err = |source| StorageError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(&tmp, json).map_err(io_err)?;
        if let Err(source) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(io_err(source));
        }
        Ok(())
    }

    /// Undo an in-memory change whose write failed, so memory keeps matching
    /// the file.
    fn restore(&self, key: &str, previous: Option<String>) {
        let mut entries = self.entries.borrow_mut();
        match previous {
            Some(value) => {
                entries.insert(key.to_owned(), value);
            }
            None => {
                entries.remove(key);
            }
        }
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

impl StorageBackend for FileStorage {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let previous = self
            .entries
            .borrow_mut()
            .insert(key.to_owned(), value.to_owned());
        if let Err(err) = self.persist() {
            self.restore(key, previous);
            return Err(err);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        let Some(previous) = self.entries.borrow_mut().remove(key) else {
            return Ok(false);
        };
        if let Err(err) = self.persist() {
            self.restore(key, Some(previous));
            return Err(err);
        }
        Ok(true)
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.entries.borrow().keys().cloned().collect())
    }

    fn clear(&self) -> StorageResult<()> {
        let previous = std::mem::take(&mut *self.entries.borrow_mut());
        if let Err(err) = self.persist() {
            *self.entries.borrow_mut() = previous;
            return Err(err);
        }
        Ok(())
    }
}

// ============================================================================
// StoredValue
// ============================================================================

/// An observable value mirrored into a storage backend under one key.
///
/// Values that serialize to JSON `null` (such as `None`) remove the key.
pub struct StoredValue<T> {
    key: Rc<str>,
    value: Observable<T>,
    last_error: Rc<RefCell<Option<StorageError>>>,
    _writer: Subscription,
}

impl<T> StoredValue<T>
where
    T: Serialize + DeserializeOwned + Clone + PartialEq + 'static,
{
    pub fn new(backend: Rc<dyn StorageBackend>, key: impl Into<String>, default: T) -> Self {
        let key: Rc<str> = key.into().into();
        let initial = read_initial(backend.as_ref(), &key).unwrap_or(default);
        let value = Observable::new(initial);
        let last_error = Rc::new(RefCell::new(None));

        let writer = {
            let key = Rc::clone(&key);
            let last_error = Rc::clone(&last_error);
            value.subscribe(move |current: &T| {
                if let Err(err) = write_back(backend.as_ref(), &key, current) {
                    warn!(key = %key, error = %err, "failed to persist stored value");
                    *last_error.borrow_mut() = Some(err);
                }
            })
        };

        Self {
            key,
            value,
            last_error,
            _writer: writer,
        }
    }

    #[must_use]
    pub fn get(&self) -> T {
        self.value.get()
    }

    /// Change the value; it is written back if it differs.
    pub fn set(&self, value: T) {
        self.value.set(value);
    }

    pub fn update(&self, f: impl FnOnce(&mut T)) {
        self.value.update(f);
    }

    #[must_use]
    pub fn observable(&self) -> &Observable<T> {
        &self.value
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The most recent write error, cleared by this call.
    pub fn take_error(&self) -> Option<StorageError> {
        self.last_error.borrow_mut().take()
    }
}

impl<T: fmt::Debug> fmt::Debug for StoredValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredValue")
            .field("key", &self.key)
            .field("value", &self.value)
            .finish_non_exhaustive()
    }
}

fn read_initial<T: DeserializeOwned>(backend: &dyn StorageBackend, key: &str) -> Option<T> {
    let raw = match backend.get(key) {
        Ok(raw) => raw?,
        Err(err) => {
            warn!(key, error = %err, "failed to read stored value; using default");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(key, error = %err, "stored value does not decode; using default");
            None
        }
    }
}

fn write_back<T: Serialize>(backend: &dyn StorageBackend, key: &str, value: &T) -> StorageResult<()> {
    let json = serde_json::to_value(value)?;
    if json.is_null() {
        backend.remove(key)?;
    } else {
        backend.set(key, &json.to_string())?;
    }
    Ok(())
}
