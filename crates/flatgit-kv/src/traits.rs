use std::fmt;
use std::io::Read;

use chrono::{DateTime, Utc};

use crate::error::KvResult;

/// Listing/head metadata for a stored key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectMeta {
    pub key: String,
    pub size: u64,
    /// Timestamp assigned by the storage service, not by the caller.
    pub last_modified: DateTime<Utc>,
}

/// Opaque version identifier assigned by a versioned store.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VersionId(String);

impl VersionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One entry of a version listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionEntry {
    pub key: String,
    pub version_id: VersionId,
    pub last_modified: DateTime<Utc>,
    pub size: u64,
    /// Soft-delete marker left by a plain delete on a versioned key.
    pub is_delete_marker: bool,
}

/// A flat, eventually-consistent key-value object storage service.
///
/// Implementations must be safe to share across threads. Nothing here
/// promises read-after-write consistency across keys; callers that need
/// ordering across keys take a lock first.
pub trait KeyValueStore: Send + Sync + fmt::Debug {
    /// Fetch the full value of `key`, or `None` if absent.
    fn get(&self, key: &str) -> KvResult<Option<Vec<u8>>>;

    /// Metadata of `key` without its payload.
    fn head(&self, key: &str) -> KvResult<Option<ObjectMeta>>;

    /// Whether `key` currently exists.
    fn exists(&self, key: &str) -> KvResult<bool> {
        Ok(self.head(key)?.is_some())
    }

    /// Store `value` under `key`, replacing any previous value.
    fn put(&self, key: &str, value: &[u8]) -> KvResult<ObjectMeta>;

    /// Store the contents of `reader` under `key`.
    ///
    /// The default buffers the reader; backends that can stream should
    /// override it.
    fn put_reader(&self, key: &str, reader: &mut dyn Read) -> KvResult<ObjectMeta> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        self.put(key, &buf)
    }

    /// Remove `key`. Deleting an absent key is not an error.
    fn delete(&self, key: &str) -> KvResult<()>;

    /// All current keys starting with `prefix`, in ascending key order.
    fn list(&self, prefix: &str) -> KvResult<Vec<ObjectMeta>>;

    /// Write `value` only if the current value equals `expected`
    /// (`None` meaning the key must be absent). Returns whether it wrote.
    ///
    /// The default is read-then-write, so it is only advisory; backends with
    /// conditional writes override it to make the check atomic.
    fn compare_and_put(&self, key: &str, expected: Option<&[u8]>, value: &[u8]) -> KvResult<bool> {
        let current = self.get(key)?;
        if current.as_deref() != expected {
            return Ok(false);
        }
        self.put(key, value)?;
        Ok(true)
    }

    /// Delete `key` only if its current value equals `expected`.
    fn compare_and_delete(&self, key: &str, expected: &[u8]) -> KvResult<bool> {
        match self.get(key)? {
            Some(current) if current == expected => {
                self.delete(key)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// A storage service with native per-key object versioning.
///
/// A plain [`KeyValueStore::delete`] on a versioned store leaves a delete
/// marker rather than removing history.
pub trait VersionedStore: KeyValueStore {
    /// Store a new version of `key` and return the entry the service assigned.
    fn put_versioned(&self, key: &str, value: &[u8]) -> KvResult<VersionEntry>;

    /// Every version, delete markers included, of every key starting with
    /// `prefix`. Order is unspecified.
    fn list_versions(&self, prefix: &str) -> KvResult<Vec<VersionEntry>>;

    /// Permanently remove one version. Removing an unknown version is not an
    /// error.
    fn delete_version(&self, key: &str, version: &VersionId) -> KvResult<()>;
}
