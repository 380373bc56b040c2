use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use flatgit_types::{Clock, SystemClock};

use crate::error::{KvError, KvResult};
use crate::traits::{KeyValueStore, ObjectMeta, VersionEntry, VersionId, VersionedStore};

#[derive(Clone, Debug)]
struct Version {
    id: VersionId,
    /// `None` marks a delete marker.
    data: Option<Vec<u8>>,
    last_modified: DateTime<Utc>,
}

impl Version {
    fn entry(&self, key: &str) -> VersionEntry {
        VersionEntry {
            key: key.to_string(),
            version_id: self.id.clone(),
            last_modified: self.last_modified,
            size: self.data.as_ref().map_or(0, |d| d.len() as u64),
            is_delete_marker: self.data.is_none(),
        }
    }

    fn meta(&self, key: &str) -> Option<ObjectMeta> {
        self.data.as_ref().map(|d| ObjectMeta {
            key: key.to_string(),
            size: d.len() as u64,
            last_modified: self.last_modified,
        })
    }
}

#[derive(Default)]
struct Inner {
    /// Versions per key, oldest first.
    keys: BTreeMap<String, Vec<Version>>,
    next_version: u64,
    last_stamp: Option<DateTime<Utc>>,
}

/// In-memory, versioned key-value store.
///
/// Every mutation happens under one mutex, which makes conditional writes
/// atomic. Timestamps come from an injectable clock and are forced to be
/// strictly increasing, so ordering by `(last_modified, version)` is total.
/// Intended for tests and embedding.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    /// Create an empty store stamped by the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store stamped by `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            clock,
        }
    }

    /// Number of live (non-deleted) keys.
    pub fn len(&self) -> usize {
        self.lock()
            .keys
            .values()
            .filter(|versions| current(versions).is_some())
            .count()
    }

    /// Returns `true` if no live key exists.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All live keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.lock()
            .keys
            .iter()
            .filter(|(_, versions)| current(versions).is_some())
            .map(|(key, _)| key.clone())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("memory store lock poisoned")
    }

    /// Append a version (or delete marker) to `key`.
    fn push(&self, inner: &mut Inner, key: &str, data: Option<Vec<u8>>) -> KvResult<Version> {
        if key.is_empty() {
            return Err(KvError::InvalidKey(key.to_string()));
        }
        let mut stamp = self.clock.now();
        if let Some(last) = inner.last_stamp {
            if stamp <= last {
                stamp = last + Duration::microseconds(1);
            }
        }
        inner.last_stamp = Some(stamp);
        inner.next_version += 1;
        let version = Version {
            id: VersionId::new(format!("{:020}", inner.next_version)),
            data,
            last_modified: stamp,
        };
        inner
            .keys
            .entry(key.to_string())
            .or_default()
            .push(version.clone());
        Ok(version)
    }
}

fn current(versions: &[Version]) -> Option<&Version> {
    versions.last().filter(|v| v.data.is_some())
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("keys", &self.len())
            .finish()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> KvResult<Option<Vec<u8>>> {
        let inner = self.lock();
        Ok(inner
            .keys
            .get(key)
            .and_then(|versions| current(versions))
            .and_then(|v| v.data.clone()))
    }

    fn head(&self, key: &str) -> KvResult<Option<ObjectMeta>> {
        let inner = self.lock();
        Ok(inner
            .keys
            .get(key)
            .and_then(|versions| current(versions))
            .and_then(|v| v.meta(key)))
    }

    fn put(&self, key: &str, value: &[u8]) -> KvResult<ObjectMeta> {
        let mut inner = self.lock();
        let version = self.push(&mut inner, key, Some(value.to_vec()))?;
        version
            .meta(key)
            .ok_or_else(|| KvError::Backend("put produced a delete marker".into()))
    }

    fn delete(&self, key: &str) -> KvResult<()> {
        let mut inner = self.lock();
        let live = inner
            .keys
            .get(key)
            .map_or(false, |versions| current(versions).is_some());
        if live {
            self.push(&mut inner, key, None)?;
        }
        Ok(())
    }

    fn list(&self, prefix: &str) -> KvResult<Vec<ObjectMeta>> {
        let inner = self.lock();
        Ok(inner
            .keys
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .filter_map(|(key, versions)| current(versions).and_then(|v| v.meta(key)))
            .collect())
    }

    fn compare_and_put(&self, key: &str, expected: Option<&[u8]>, value: &[u8]) -> KvResult<bool> {
        let mut inner = self.lock();
        let matches = inner
            .keys
            .get(key)
            .and_then(|versions| current(versions))
            .and_then(|v| v.data.as_deref())
            == expected;
        if !matches {
            return Ok(false);
        }
        self.push(&mut inner, key, Some(value.to_vec()))?;
        Ok(true)
    }

    fn compare_and_delete(&self, key: &str, expected: &[u8]) -> KvResult<bool> {
        let mut inner = self.lock();
        let matches = inner
            .keys
            .get(key)
            .and_then(|versions| current(versions))
            .and_then(|v| v.data.as_deref())
            == Some(expected);
        if !matches {
            return Ok(false);
        }
        self.push(&mut inner, key, None)?;
        Ok(true)
    }
}

impl VersionedStore for MemoryStore {
    fn put_versioned(&self, key: &str, value: &[u8]) -> KvResult<VersionEntry> {
        let mut inner = self.lock();
        let version = self.push(&mut inner, key, Some(value.to_vec()))?;
        Ok(version.entry(key))
    }

    fn list_versions(&self, prefix: &str) -> KvResult<Vec<VersionEntry>> {
        let inner = self.lock();
        Ok(inner
            .keys
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .flat_map(|(key, versions)| versions.iter().map(move |v| v.entry(key)))
            .collect())
    }

    fn delete_version(&self, key: &str, version: &VersionId) -> KvResult<()> {
        let mut inner = self.lock();
        let emptied = match inner.keys.get_mut(key) {
            Some(versions) => {
                versions.retain(|v| &v.id != version);
                versions.is_empty()
            }
            None => false,
        };
        if emptied {
            inner.keys.remove(key);
        }
        Ok(())
    }
}
