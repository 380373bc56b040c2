use std::fmt;
use std::sync::Arc;

use flatgit_kv::Backend;
use flatgit_lock::{critical_section, LockError, LockStrategy, TimestampLock, VersionLock};
use flatgit_pack::PackSet;
use flatgit_refs::{branch_ref, validate_ref_name, BucketRefStore, RefStore, RefValue, HEAD};
use flatgit_store::{BucketObjectStore, CachedObjectStore, ObjectIds, ObjectStore};
use flatgit_types::{KeyLayout, ObjectId, StoredObject, DEFAULT_PREFIX};
use tracing::{debug, info};

use crate::config::{LockConfig, LockKind, RepoConfig};
use crate::error::{RepoError, RepoResult};
use crate::update::{RefUpdate, RefUpdateOutcome, UpdateStatus};

/// Symbolic hops [`Repository::resolve_ref`] follows.
pub const DEFAULT_SYMREF_DEPTH: usize = 5;

/// Lock name guarding [`Repository::update_refs`].
pub const REFS_LOCK: &str = "refs";

/// A git repository stored in a flat key-value service.
///
/// Bundles the object store, ref store and lock strategy that share one
/// storage location and key prefix.
pub struct Repository {
    objects: Box<dyn ObjectStore>,
    refs: Box<dyn RefStore>,
    lock: Arc<dyn LockStrategy>,
    default_branch: String,
}

impl Repository {
    /// Open (and if needed initialize) the repository `config` describes.
    pub fn open(config: &RepoConfig) -> RepoResult<Self> {
        config.validate()?;
        let location = config.parsed_location()?;
        let backend = flatgit_kv::open(&location)?;
        let prefix = config
            .prefix
            .as_deref()
            .or(location.prefix.as_deref())
            .unwrap_or(DEFAULT_PREFIX);
        let layout = KeyLayout::new(prefix);
        let kv = backend.kv();

        let packs = PackSet::new(kv.clone(), layout.clone()).with_freshness(config.pack.freshness());
        let bucket = BucketObjectStore::new(kv.clone(), layout.clone())
            .with_pack_set(packs)
            .with_pack_threshold(config.pack.threshold)
            .with_compression_level(config.pack.compression_level);
        let objects: Box<dyn ObjectStore> = if config.cache.enabled {
            Box::new(CachedObjectStore::with_capacity(bucket, config.cache.capacity))
        } else {
            Box::new(bucket)
        };
        let refs = BucketRefStore::new(kv, layout.clone());
        let lock = build_lock(&config.lock, &backend, &layout)?;

        info!(location = %location, prefix = layout.prefix(), lock = ?lock, "opened repository");
        Self::from_parts(objects, Box::new(refs), lock, &config.default_branch)
    }

    /// Assemble a repository from already-built components.
    ///
    /// Writes `HEAD -> refs/heads/<default_branch>` if `HEAD` is missing.
    /// An existing `HEAD`, including one written by a racing initializer,
    /// is left alone.
    pub fn from_parts(
        objects: Box<dyn ObjectStore>,
        refs: Box<dyn RefStore>,
        lock: Arc<dyn LockStrategy>,
        default_branch: &str,
    ) -> RepoResult<Self> {
        let repo = Self {
            objects,
            refs,
            lock,
            default_branch: default_branch.to_string(),
        };
        if repo.refs.read(HEAD)?.is_none() {
            let target = RefValue::Symbolic(branch_ref(default_branch));
            if repo.refs.add_if_absent(HEAD, &target)? {
                info!(head = %target, "initialized HEAD");
            }
        }
        Ok(repo)
    }

    pub fn default_branch(&self) -> &str {
        &self.default_branch
    }

    /// Lock strategy shared by this repository's writers.
    pub fn lock(&self) -> &Arc<dyn LockStrategy> {
        &self.lock
    }

    // ---- Objects ----

    pub fn put_object(&self, object: &StoredObject) -> RepoResult<ObjectId> {
        Ok(self.objects.put(object)?)
    }

    /// Fetch an object; a missing id is an error of kind `NotFound`.
    pub fn get_object(&self, id: &ObjectId) -> RepoResult<StoredObject> {
        Ok(self.objects.get(id)?)
    }

    pub fn contains_object(&self, id: &ObjectId) -> RepoResult<bool> {
        Ok(self.objects.contains(id)?)
    }

    /// Ids of all loose objects.
    pub fn object_ids(&self) -> RepoResult<ObjectIds> {
        Ok(self.objects.ids()?)
    }

    /// Ids of objects reachable only through packs.
    pub fn packed_object_ids(&self) -> RepoResult<Vec<ObjectId>> {
        Ok(self.objects.packed_ids()?)
    }

    /// Store many objects, as one pack when the batch is large enough.
    pub fn put_objects(&self, objects: &[StoredObject]) -> RepoResult<Vec<ObjectId>> {
        let ids = self.objects.put_batch(objects)?;
        debug!(count = ids.len(), "stored object batch");
        Ok(ids)
    }

    // ---- Refs ----

    pub fn read_ref(&self, name: &str) -> RepoResult<Option<RefValue>> {
        Ok(self.refs.read(name)?)
    }

    pub fn head(&self) -> RepoResult<Option<RefValue>> {
        self.read_ref(HEAD)
    }

    /// Follow `name` to an object id through at most
    /// [`DEFAULT_SYMREF_DEPTH`] symbolic hops.
    ///
    /// `Ok(None)` if some ref along the way does not exist, e.g. `HEAD` of
    /// an empty repository.
    pub fn resolve_ref(&self, name: &str) -> RepoResult<Option<ObjectId>> {
        self.resolve_ref_with_depth(name, DEFAULT_SYMREF_DEPTH)
    }

    pub fn resolve_ref_with_depth(&self, name: &str, depth: usize) -> RepoResult<Option<ObjectId>> {
        let mut current = name.to_string();
        let mut hops = 0;
        loop {
            match self.refs.read(&current)? {
                None => return Ok(None),
                Some(RefValue::Direct(id)) => return Ok(Some(id)),
                Some(RefValue::Symbolic(target)) => {
                    if hops == depth {
                        return Err(RepoError::SymrefDepth {
                            name: name.to_string(),
                            depth,
                        });
                    }
                    hops += 1;
                    current = target;
                }
            }
        }
    }

    /// Compare-and-swap `name` from `expected` to `new`.
    ///
    /// Fails with a `Conflict` error when the ref holds something else.
    pub fn set_ref(&self, name: &str, expected: Option<&RefValue>, new: &RefValue) -> RepoResult<()> {
        if self.refs.compare_and_swap(name, expected, new)? {
            Ok(())
        } else {
            Err(RepoError::Conflict { name: name.to_string() })
        }
    }

    /// Delete `name` if it still has `expected`; `None` deletes regardless.
    pub fn delete_ref(&self, name: &str, expected: Option<&RefValue>) -> RepoResult<()> {
        if self.refs.remove_if_equals(name, expected)? {
            Ok(())
        } else {
            Err(RepoError::Conflict { name: name.to_string() })
        }
    }

    pub fn set_symbolic_ref(&self, name: &str, target: &str) -> RepoResult<()> {
        Ok(self.refs.set_symbolic(name, target)?)
    }

    pub fn ref_names(&self) -> RepoResult<Vec<String>> {
        Ok(self.refs.names()?)
    }

    /// Every ref with its value, `HEAD` included.
    pub fn list_refs(&self) -> RepoResult<Vec<(String, RefValue)>> {
        Ok(self.refs.list()?)
    }

    /// Apply several conditional ref updates while holding the `refs` lock.
    ///
    /// Each update stands alone: a rejected one does not stop the others.
    /// Names are validated before the lock is taken; a storage error aborts
    /// the remaining updates.
    pub fn update_refs(&self, updates: &[RefUpdate]) -> RepoResult<Vec<RefUpdateOutcome>> {
        for update in updates {
            validate_ref_name(&update.name)?;
        }
        critical_section(self.lock.as_ref(), REFS_LOCK, || {
            let mut outcomes = Vec::with_capacity(updates.len());
            for update in updates {
                let applied = self.apply(update)?;
                let status = if applied {
                    UpdateStatus::Applied
                } else {
                    UpdateStatus::Rejected
                };
                debug!(name = %update.name, ?status, "ref update");
                outcomes.push(RefUpdateOutcome {
                    name: update.name.clone(),
                    status,
                });
            }
            Ok(outcomes)
        })
    }

    fn apply(&self, update: &RefUpdate) -> RepoResult<bool> {
        let name = update.name.as_str();
        let expected = update.expected.as_ref();
        let applied = match (&update.new, expected) {
            (Some(new), _) => self.refs.compare_and_swap(name, expected, new)?,
            (None, Some(_)) => self.refs.remove_if_equals(name, expected)?,
            // Deleting a ref that must not exist is a no-op check.
            (None, None) => self.refs.read(name)?.is_none(),
        };
        Ok(applied)
    }
}

fn build_lock(config: &LockConfig, backend: &Backend, layout: &KeyLayout) -> RepoResult<Arc<dyn LockStrategy>> {
    let options = config.options();
    let lock: Arc<dyn LockStrategy> = match (config.strategy, backend.versioned()) {
        (LockKind::Version, None) => return Err(LockError::Unsupported.into()),
        (LockKind::Version | LockKind::Auto, Some(store)) => {
            Arc::new(VersionLock::new(store, layout.clone()).with_options(options))
        }
        (LockKind::Timestamp, _) | (LockKind::Auto, None) => Arc::new(
            TimestampLock::new(backend.kv(), layout.clone())
                .with_options(options)
                .with_clock_policy(config.clock_policy()),
        ),
    };
    Ok(lock)
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("default_branch", &self.default_branch)
            .field("lock", &self.lock)
            .finish_non_exhaustive()
    }
}
