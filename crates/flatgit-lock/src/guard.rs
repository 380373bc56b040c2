use std::fmt;
use std::sync::Arc;

use flatgit_kv::{KeyValueStore, KvResult, VersionId, VersionedStore};
use tracing::{debug, warn};

use crate::error::LockResult;

/// The marker a waiter placed in the store.
pub(crate) enum Marker {
    /// One version of the shared lock key.
    Version {
        store: Arc<dyn VersionedStore>,
        key: String,
        version_id: VersionId,
    },
    /// A key of its own under the lock's marker prefix.
    Key { store: Arc<dyn KeyValueStore>, key: String },
}

impl Marker {
    pub(crate) fn remove(&self) -> KvResult<()> {
        match self {
            Self::Version { store, key, version_id } => store.delete_version(key, version_id),
            Self::Key { store, key } => store.delete(key),
        }
    }

    /// Remove after a failed acquisition; the original error wins.
    pub(crate) fn discard(self, lock: &str) {
        if let Err(e) = self.remove() {
            warn!(lock, error = %e, "failed to remove lock marker");
        }
    }
}

impl fmt::Debug for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Version { key, version_id, .. } => f
                .debug_struct("Version")
                .field("key", key)
                .field("version_id", version_id)
                .finish(),
            Self::Key { key, .. } => f.debug_struct("Key").field("key", key).finish(),
        }
    }
}

/// A held lock. Dropping the guard releases it; call [`release`] to see
/// release errors instead of having them logged.
///
/// [`release`]: LockGuard::release
#[must_use = "the lock is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct LockGuard {
    name: String,
    marker: Option<Marker>,
    attempts: u32,
}

impl LockGuard {
    pub(crate) fn new(name: &str, marker: Marker, attempts: u32) -> Self {
        Self {
            name: name.to_string(),
            marker: Some(marker),
            attempts,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of polls it took to acquire the lock; 1 means uncontended.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn release(mut self) -> LockResult<()> {
        match self.marker.take() {
            Some(marker) => {
                marker.remove()?;
                debug!(lock = %self.name, "released lock");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(marker) = self.marker.take() {
            match marker.remove() {
                Ok(()) => debug!(lock = %self.name, "released lock on drop"),
                Err(e) => warn!(lock = %self.name, error = %e, "failed to release lock"),
            }
        }
    }
}
