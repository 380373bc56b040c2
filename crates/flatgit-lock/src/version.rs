use std::fmt;
use std::sync::Arc;

use flatgit_kv::{VersionEntry, VersionedStore};
use flatgit_types::KeyLayout;
use tracing::{debug, info};

use crate::error::LockResult;
use crate::guard::{LockGuard, Marker};
use crate::options::LockOptions;
use crate::traits::{validate_lock_name, wait_for_turn, LockStrategy};

/// Lock ordered by the versions of a single key.
///
/// Every waiter writes an empty version of `locks/<name>`; the waiter whose
/// version is oldest holds the lock. Releasing deletes that one version, so
/// the key itself only disappears once nobody is queued.
pub struct VersionLock {
    store: Arc<dyn VersionedStore>,
    layout: KeyLayout,
    options: LockOptions,
}

impl VersionLock {
    pub fn new(store: Arc<dyn VersionedStore>, layout: KeyLayout) -> Self {
        Self {
            store,
            layout,
            options: LockOptions::default(),
        }
    }

    pub fn with_options(mut self, options: LockOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &LockOptions {
        &self.options
    }

    /// Live versions of `key`, oldest first.
    fn queue(&self, key: &str) -> LockResult<Vec<VersionEntry>> {
        let mut versions: Vec<VersionEntry> = self
            .store
            .list_versions(key)?
            .into_iter()
            .filter(|entry| entry.key == key && !entry.is_delete_marker)
            .collect();
        versions.sort_by(|a, b| (a.last_modified, &a.version_id).cmp(&(b.last_modified, &b.version_id)));
        Ok(versions)
    }
}

impl LockStrategy for VersionLock {
    fn acquire(&self, name: &str) -> LockResult<LockGuard> {
        validate_lock_name(name)?;
        let key = self.layout.lock_key(name);
        let ours = self.store.put_versioned(&key, b"")?;
        debug!(lock = name, version = %ours.version_id, "queued for lock");

        let waited = wait_for_turn(name, &self.options, || {
            let queue = self.queue(&key)?;
            Ok(queue.first().is_some_and(|head| head.version_id == ours.version_id))
        });

        let marker = Marker::Version {
            store: self.store.clone(),
            key,
            version_id: ours.version_id,
        };
        match waited {
            Ok(attempts) => {
                info!(lock = name, attempts, "acquired lock");
                Ok(LockGuard::new(name, marker, attempts))
            }
            Err(e) => {
                marker.discard(name);
                Err(e)
            }
        }
    }
}

impl fmt::Debug for VersionLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionLock")
            .field("prefix", &self.layout.prefix())
            .field("options", &self.options)
            .finish()
    }
}
