//! Cache Cell Module
//!
//! Versioned, expiring slot over one storage key.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::cache::clock::Clock;
use crate::cache::entry::VersionedEntry;
use crate::cache::host::{Host, StorageKind};
use crate::cache::storage::{Storage, Update};
use crate::error::{CacheError, Result};

// == Cache Cell ==
/// One `(cache_key, version)` slot in a storage backend.
///
/// A storage key holds a JSON object of `version -> entry`, so cells with the
/// same key and different versions coexist. A cell only ever accepts entries
/// written with its own `expire_time_ms`: changing the expiration policy for a
/// key invalidates what was stored under the old one.
#[derive(Debug, Clone)]
pub struct CacheCell {
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    cache_key: String,
    version: String,
    expire_time_ms: u64,
}

impl CacheCell {
    // == Constructors ==
    pub fn new(
        storage: Arc<dyn Storage>,
        clock: Arc<dyn Clock>,
        cache_key: impl Into<String>,
        version: impl Into<String>,
        expire_time_ms: u64,
    ) -> Self {
        Self {
            storage,
            clock,
            cache_key: cache_key.into(),
            version: version.into(),
            expire_time_ms,
        }
    }

    /// Creates a cell on one of the host's backends.
    ///
    /// # Errors
    /// [`CacheError::Configuration`] if the host lacks the requested backend.
    pub fn open(
        host: &Host,
        kind: StorageKind,
        cache_key: impl Into<String>,
        version: impl Into<String>,
        expire_time_ms: u64,
    ) -> Result<Self> {
        Ok(Self::new(
            host.storage(kind)?,
            host.clock(),
            cache_key,
            version,
            expire_time_ms,
        ))
    }

    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn expire_time_ms(&self) -> u64 {
        self.expire_time_ms
    }

    // == Set ==
    /// Stores `data` under this version, keeping other versions of the key.
    pub fn set<T: Serialize + ?Sized>(&self, data: &T) -> Result<()> {
        let entry = serde_json::to_value(VersionedEntry::new(
            serde_json::to_value(data)?,
            self.expire_time_ms,
            self.clock.now_ms(),
        ))?;
        update_key(self.storage.as_ref(), &self.cache_key, |raw| {
            let mut versions = self.parse_versions(raw)?.unwrap_or_default();
            versions.insert(self.version.clone(), entry);
            Ok(written(versions))
        })
    }

    // == Get ==
    /// Returns this version's data if present, written under the same expiration
    /// policy, and not expired. Stale entries are evicted on the way.
    pub fn get<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        match self.get_raw()? {
            Some(data) => Ok(Some(serde_json::from_value(data)?)),
            None => Ok(None),
        }
    }

    /// Like [`CacheCell::get`] but without decoding the payload.
    ///
    /// A `null` version slot or an empty stored string counts as a miss.
    pub fn get_raw(&self) -> Result<Option<Value>> {
        let now = self.clock.now_ms();
        let mut found = None;

        update_key(self.storage.as_ref(), &self.cache_key, |raw| {
            let Some(mut versions) = self.parse_versions(raw)? else {
                return Ok(Update::Keep);
            };
            let raw_entry = match versions.get(&self.version) {
                None | Some(Value::Null) => return Ok(Update::Keep),
                Some(slot) => slot.clone(),
            };
            let entry: VersionedEntry =
                serde_json::from_value(raw_entry).map_err(|err| self.corrupt(err.to_string()))?;

            if entry.expire_time_ms != self.expire_time_ms {
                debug!(
                    "Evicting '{}'@{}: written with expireTime={} but read with {}",
                    self.cache_key, self.version, entry.expire_time_ms, self.expire_time_ms
                );
            } else if entry.is_expired(now) {
                debug!("Evicting expired '{}'@{}", self.cache_key, self.version);
            } else {
                found = Some(entry.data);
                return Ok(Update::Keep);
            }

            versions.remove(&self.version);
            Ok(written(versions))
        })?;

        Ok(found)
    }

    // == Remove ==
    /// Deletes this version only; the key goes away with its last version.
    pub fn remove(&self) -> Result<()> {
        update_key(self.storage.as_ref(), &self.cache_key, |raw| {
            let Some(mut versions) = self.parse_versions(raw)? else {
                return Ok(Update::Keep);
            };
            if versions.remove(&self.version).is_none() {
                return Ok(Update::Keep);
            }
            Ok(written(versions))
        })
    }

    /// Deletes the key with every version.
    pub fn remove_all(&self) -> Result<()> {
        self.storage.remove_item(&self.cache_key)
    }

    /// Clears the entire backend, all keys and versions.
    pub fn clear(&self) -> Result<()> {
        self.storage.clear()
    }

    // == Helpers ==
    fn parse_versions(&self, raw: Option<&str>) -> Result<Option<Map<String, Value>>> {
        let Some(raw) = raw.filter(|raw| !raw.trim().is_empty()) else {
            return Ok(None);
        };
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(versions)) => Ok(Some(versions)),
            Ok(Value::Null) => Ok(None),
            Ok(_) => Err(self.corrupt("stored value is not a version map".to_string())),
            Err(err) => Err(self.corrupt(err.to_string())),
        }
    }

    fn corrupt(&self, reason: String) -> CacheError {
        CacheError::Corrupt {
            key: self.cache_key.clone(),
            reason,
        }
    }
}

/// Runs `apply` as one atomic step on `key`.
fn update_key<F>(storage: &dyn Storage, key: &str, apply: F) -> Result<()>
where
    F: FnOnce(Option<&str>) -> Result<Update>,
{
    storage.update(key, Box::new(apply))
}

fn written(versions: Map<String, Value>) -> Update {
    if versions.is_empty() {
        Update::Remove
    } else {
        Update::Set(Value::Object(versions).to_string())
    }
}

// == Sweep Expired ==
/// Removes every expired version entry from `storage`.
///
/// Keys whose value is not a version map are left untouched. Keys left with
/// no versions are deleted. Returns the number of entries removed.
pub fn sweep_expired(storage: &dyn Storage, now_ms: u64) -> Result<usize> {
    let mut removed = 0;

    for key in storage.keys()? {
        update_key(storage, &key, |raw| {
            let Some(Ok(Value::Object(mut versions))) = raw.map(serde_json::from_str::<Value>) else {
                return Ok(Update::Keep);
            };

            let expired: Vec<String> = versions
                .iter()
                .filter(|(_, slot)| {
                    serde_json::from_value::<VersionedEntry>((*slot).clone())
                        .map(|entry| entry.is_expired(now_ms))
                        .unwrap_or(false)
                })
                .map(|(version, _)| version.clone())
                .collect();
            if expired.is_empty() {
                return Ok(Update::Keep);
            }

            for version in &expired {
                versions.remove(version);
            }
            removed += expired.len();
            Ok(written(versions))
        })?;
    }

    Ok(removed)
}
