// File-backed JSON store
// Whole-document read / rewrite with an in-process writer lock and atomic replace

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Store {path:?} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to serialize store {path:?}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to get app data directory")]
    AppDataDir,
}

pub type StorageResult<T> = Result<T, StorageError>;

impl StorageError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn is_corrupt(&self) -> bool {
        matches!(self, StorageError::Corrupt { .. })
    }
}

/// A JSON document persisted at an injected path.
///
/// The document is always read and written whole. An absent file, a blank
/// file and an empty-object placeholder (`{}`) all load as `T::default()`.
/// Writers in this process are serialized; writers in other processes are not.
pub struct JsonStore<T> {
    path: PathBuf,
    write_lock: Mutex<()>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonStore<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
            _marker: PhantomData,
        }
    }

    /// Get the store path
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read the whole document
    pub fn load(&self) -> StorageResult<T> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
            Err(e) => return Err(StorageError::io(&self.path, e)),
        };

        if raw.trim().is_empty() {
            return Ok(T::default());
        }

        let value: serde_json::Value = serde_json::from_str(&raw).map_err(|source| StorageError::Corrupt {
            path: self.path.clone(),
            source,
        })?;

        if matches!(&value, serde_json::Value::Object(map) if map.is_empty()) {
            return Ok(T::default());
        }

        serde_json::from_value(value).map_err(|source| StorageError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    /// Replace the whole document
    pub fn save(&self, value: &T) -> StorageResult<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.write_unlocked(value)
    }

    /// Read, modify in memory and rewrite the document under the writer lock
    pub fn update<F, R>(&self, f: F) -> StorageResult<R>
    where
        F: FnOnce(&mut T) -> R,
    {
        let _guard = self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut value = self.load()?;
        let result = f(&mut value);
        self.write_unlocked(&value)?;
        Ok(result)
    }

    fn write_unlocked(&self, value: &T) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
            }
        }

        let json = serde_json::to_vec_pretty(value).map_err(|source| StorageError::Serialize {
            path: self.path.clone(),
            source,
        })?;

        // Write beside the target, then rename over it
        let tmp_path = self.path.with_extension("json.tmp");
        {
            let mut file = std::fs::File::create(&tmp_path).map_err(|e| StorageError::io(&tmp_path, e))?;
            file.write_all(&json).map_err(|e| StorageError::io(&tmp_path, e))?;
            file.sync_all().map_err(|e| StorageError::io(&tmp_path, e))?;
        }
        std::fs::rename(&tmp_path, &self.path).map_err(|e| StorageError::io(&self.path, e))?;

        Ok(())
    }
}
