//! Host Module
//!
//! The set of storage backends and the clock a process makes available.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::clock::{Clock, SystemClock};
use crate::cache::storage::{FileStorage, MemoryStorage, Storage};
use crate::error::{CacheError, Result};

/// Error text for a persistent backend the host does not provide.
pub const NO_HOST_STORAGE: &str = "window is not defined";

/// File name of the persistent store inside a storage directory.
pub const LOCAL_STORAGE_FILE: &str = "local_storage.json";

// == Storage Kind ==
/// Which backend a cache cell writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageKind {
    #[serde(rename = "memory")]
    Memory,
    /// Persistent store surviving restarts
    #[serde(rename = "localStorage")]
    Local,
    /// Store scoped to the lifetime of the host
    #[serde(rename = "sessionStorage")]
    Session,
}

impl StorageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKind::Memory => "memory",
            StorageKind::Local => "localStorage",
            StorageKind::Session => "sessionStorage",
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageKind {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "memory" => Ok(StorageKind::Memory),
            "localStorage" | "local" => Ok(StorageKind::Local),
            "sessionStorage" | "session" => Ok(StorageKind::Session),
            other => Err(CacheError::Configuration(format!(
                "Unknown storage kind: {}",
                other
            ))),
        }
    }
}

// == Host ==
/// Storage backends and clock available to cache cells.
///
/// The memory store always exists. Persistent stores exist only when attached;
/// asking for a missing one fails rather than falling back to another backend.
#[derive(Debug, Clone)]
pub struct Host {
    memory: MemoryStorage,
    local: Option<Arc<dyn Storage>>,
    session: Option<Arc<dyn Storage>>,
    clock: Arc<dyn Clock>,
}

impl Default for Host {
    fn default() -> Self {
        Self::headless()
    }
}

impl Host {
    // == Constructors ==
    /// Host with only the in-memory backend and the system clock.
    pub fn headless() -> Self {
        Self {
            memory: MemoryStorage::new(),
            local: None,
            session: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Host whose persistent store lives in `dir` and whose session store is
    /// a fresh in-memory map.
    pub fn persistent(dir: impl AsRef<Path>) -> Result<Self> {
        let local = FileStorage::open(dir.as_ref().join(LOCAL_STORAGE_FILE))?;
        Ok(Self::headless()
            .with_local(Arc::new(local))
            .with_session(Arc::new(MemoryStorage::new())))
    }

    pub fn with_local(mut self, storage: Arc<dyn Storage>) -> Self {
        self.local = Some(storage);
        self
    }

    pub fn with_session(mut self, storage: Arc<dyn Storage>) -> Self {
        self.session = Some(storage);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    // == Accessors ==
    /// Resolves a backend.
    ///
    /// # Errors
    /// [`CacheError::Configuration`] if `kind` is a persistent store the host
    /// does not provide.
    pub fn storage(&self, kind: StorageKind) -> Result<Arc<dyn Storage>> {
        let found = match kind {
            StorageKind::Memory => Some(Arc::new(self.memory.clone()) as Arc<dyn Storage>),
            StorageKind::Local => self.local.clone(),
            StorageKind::Session => self.session.clone(),
        };
        found.ok_or_else(|| CacheError::Configuration(NO_HOST_STORAGE.to_string()))
    }

    pub fn memory(&self) -> &MemoryStorage {
        &self.memory
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Returns every backend the host provides.
    pub fn storages(&self) -> Vec<Arc<dyn Storage>> {
        let mut all: Vec<Arc<dyn Storage>> = vec![Arc::new(self.memory.clone())];
        all.extend(self.local.iter().cloned());
        all.extend(self.session.iter().cloned());
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_kind_parse() {
        assert_eq!("memory".parse::<StorageKind>().unwrap(), StorageKind::Memory);
        assert_eq!("localStorage".parse::<StorageKind>().unwrap(), StorageKind::Local);
        assert_eq!("sessionStorage".parse::<StorageKind>().unwrap(), StorageKind::Session);
        assert!("disk".parse::<StorageKind>().is_err());
    }

    #[test]
    fn test_storage_kind_serde_names() {
        let json = serde_json::to_string(&StorageKind::Local).unwrap();
        assert_eq!(json, "\"localStorage\"");
        let kind: StorageKind = serde_json::from_str("\"sessionStorage\"").unwrap();
        assert_eq!(kind, StorageKind::Session);
    }

    #[test]
    fn test_headless_rejects_persistent_kinds() {
        let host = Host::headless();
        assert!(host.storage(StorageKind::Memory).is_ok());

        for kind in [StorageKind::Local, StorageKind::Session] {
            let err = host.storage(kind).unwrap_err();
            assert!(matches!(&err, CacheError::Configuration(msg) if msg == NO_HOST_STORAGE));
        }
        assert_eq!(host.storages().len(), 1);
    }

    #[test]
    fn test_memory_backend_shared_by_host() {
        let host = Host::headless();
        let a = host.storage(StorageKind::Memory).unwrap();
        let b = host.storage(StorageKind::Memory).unwrap();
        a.set_item("k", "v".to_string()).unwrap();
        assert_eq!(b.get_item("k").unwrap().as_deref(), Some("v"));
        assert_eq!(host.memory().len(), 1);
    }

    #[test]
    fn test_persistent_host_provides_all_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let host = Host::persistent(dir.path()).unwrap();
        let local = host.storage(StorageKind::Local).unwrap();
        local.set_item("k", "v".to_string()).unwrap();

        assert!(host.storage(StorageKind::Session).is_ok());
        assert!(dir.path().join(LOCAL_STORAGE_FILE).exists());
        assert_eq!(host.storages().len(), 3);
    }
}
