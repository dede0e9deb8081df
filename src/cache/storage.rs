//! Storage Backend Module
//!
//! String key-value stores that cache cells persist into.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{CacheError, Result};

// == Update ==
/// What an [`Storage::update`] closure decided to do with a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    /// Leave the stored value as it is
    Keep,
    /// Replace the stored value
    Set(String),
    /// Delete the key
    Remove,
}

/// Read-modify-write step run by [`Storage::update`] under the backend's lock.
///
/// It sees the current value of the key and must not call back into the
/// same storage.
pub type Updater<'a> = Box<dyn FnOnce(Option<&str>) -> Result<Update> + 'a>;

// == Storage Trait ==
/// Pluggable key-value backend holding serialized cache keys.
pub trait Storage: Send + Sync + fmt::Debug {
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    fn set_item(&self, key: &str, value: String) -> Result<()>;

    /// Removes `key`; absent keys are not an error.
    fn remove_item(&self, key: &str) -> Result<()>;

    /// Removes every key in the backend.
    fn clear(&self) -> Result<()>;

    fn keys(&self) -> Result<Vec<String>>;

    /// Atomically reads `key` and applies the decision of `apply`.
    ///
    /// No other operation on the backend interleaves with the read and the
    /// write. An error from `apply` leaves the key untouched.
    fn update(&self, key: &str, apply: Updater<'_>) -> Result<()>;
}

// == Memory Storage ==
/// In-memory backend. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    items: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.items.lock().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: String) -> Result<()> {
        self.items.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.items.lock().remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.items.lock().clear();
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.items.lock().keys().cloned().collect())
    }

    fn update(&self, key: &str, apply: Updater<'_>) -> Result<()> {
        let mut items = self.items.lock();
        match apply(items.get(key).map(String::as_str))? {
            Update::Keep => {}
            Update::Set(value) => {
                items.insert(key.to_string(), value);
            }
            Update::Remove => {
                items.remove(key);
            }
        }
        Ok(())
    }
}

// == File Storage ==
/// Persistent backend kept in a single JSON file.
///
/// The whole map is loaded on open and rewritten after every mutation.
pub struct FileStorage {
    path: PathBuf,
    items: Mutex<BTreeMap<String, String>>,
}

impl FileStorage {
    // == Constructor ==
    /// Opens (or prepares to create) the store at `path`.
    ///
    /// # Errors
    /// Fails if the file exists but cannot be read or is not a JSON string map.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let items = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&raw).map_err(|err| CacheError::Corrupt {
                    key: path.display().to_string(),
                    reason: err.to_string(),
                })?
            }
        } else {
            BTreeMap::new()
        };

        debug!("Opened file storage at {} with {} keys", path.display(), items.len());

        Ok(Self {
            path,
            items: Mutex::new(items),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the map to a uniquely named temp file in the target directory,
    /// then renames it into place.
    fn persist(&self, items: &BTreeMap<String, String>) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer(&mut tmp, items)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|err| CacheError::from(err.error))?;
        Ok(())
    }
}

impl fmt::Debug for FileStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileStorage").field("path", &self.path).finish()
    }
}

impl Storage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.items.lock().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: String) -> Result<()> {
        let mut items = self.items.lock();
        items.insert(key.to_string(), value);
        self.persist(&items)
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        let mut items = self.items.lock();
        if items.remove(key).is_some() {
            self.persist(&items)?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut items = self.items.lock();
        items.clear();
        self.persist(&items)
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.items.lock().keys().cloned().collect())
    }

    fn update(&self, key: &str, apply: Updater<'_>) -> Result<()> {
        let mut items = self.items.lock();
        match apply(items.get(key).map(String::as_str))? {
            Update::Keep => Ok(()),
            Update::Set(value) => {
                items.insert(key.to_string(), value);
                self.persist(&items)
            }
            Update::Remove => {
                if items.remove(key).is_some() {
                    self.persist(&items)?;
                }
                Ok(())
            }
        }
    }
}
