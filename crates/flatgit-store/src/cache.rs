use flatgit_types::{ObjectId, ObjectKind, StoredObject};
use quick_cache::sync::Cache;

use crate::error::StoreResult;
use crate::traits::{ObjectIds, ObjectStore};

/// Entries kept when no capacity is configured.
pub const DEFAULT_CACHE_CAPACITY: usize = 4096;

/// Read-through cache in front of another store.
///
/// Blobs are never cached: they are the bulk of a repository by count and
/// size, while trees and commits are what gets looked up repeatedly.
pub struct CachedObjectStore<S> {
    inner: S,
    cache: Cache<ObjectId, StoredObject>,
}

impl<S: ObjectStore> CachedObjectStore<S> {
    pub fn new(inner: S) -> Self {
        Self::with_capacity(inner, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(inner: S, capacity: usize) -> Self {
        Self {
            inner,
            cache: Cache::new(capacity.max(1)),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Number of cached objects.
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    fn remember(&self, id: ObjectId, object: &StoredObject) {
        if object.kind != ObjectKind::Blob {
            self.cache.insert(id, object.clone());
        }
    }
}

impl<S: ObjectStore> ObjectStore for CachedObjectStore<S> {
    fn put(&self, object: &StoredObject) -> StoreResult<ObjectId> {
        let id = self.inner.put(object)?;
        self.remember(id, object);
        Ok(id)
    }

    fn get(&self, id: &ObjectId) -> StoreResult<StoredObject> {
        if let Some(object) = self.cache.get(id) {
            return Ok(object);
        }
        let object = self.inner.get(id)?;
        self.remember(*id, &object);
        Ok(object)
    }

    fn contains(&self, id: &ObjectId) -> StoreResult<bool> {
        if self.cache.get(id).is_some() {
            return Ok(true);
        }
        self.inner.contains(id)
    }

    fn ids(&self) -> StoreResult<ObjectIds> {
        self.inner.ids()
    }

    fn put_batch(&self, objects: &[StoredObject]) -> StoreResult<Vec<ObjectId>> {
        self.inner.put_batch(objects)
    }

    fn packed_ids(&self) -> StoreResult<Vec<ObjectId>> {
        self.inner.packed_ids()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::bucket::BucketObjectStore;
    use crate::error::StoreError;
    use flatgit_kv::{KeyValueStore, MemoryStore};
    use flatgit_types::KeyLayout;

    fn cached() -> (Arc<MemoryStore>, CachedObjectStore<BucketObjectStore>) {
        let kv = Arc::new(MemoryStore::new());
        let inner = BucketObjectStore::new(kv.clone(), KeyLayout::default());
        (kv, CachedObjectStore::with_capacity(inner, 16))
    }

    #[test]
    fn trees_are_served_from_cache() {
        let (kv, store) = cached();
        let tree = StoredObject::new(ObjectKind::Tree, b"100644 a\0".to_vec());
        let id = store.put(&tree).unwrap();
        kv.delete(&store.inner().layout().loose_object_key(&id)).unwrap();

        assert_eq!(store.get(&id).unwrap(), tree);
        assert!(store.contains(&id).unwrap());
        assert_eq!(store.cached_len(), 1);
    }

    #[test]
    fn blobs_are_never_cached() {
        let (kv, store) = cached();
        let blob = StoredObject::blob("large content");
        let id = store.put(&blob).unwrap();
        assert_eq!(store.get(&id).unwrap(), blob);
        assert_eq!(store.cached_len(), 0);

        kv.delete(&store.inner().layout().loose_object_key(&id)).unwrap();
        assert!(matches!(store.get(&id), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn misses_fill_the_cache() {
        let (kv, store) = cached();
        let commit = StoredObject::new(ObjectKind::Commit, b"tree t\n".to_vec());
        let id = store.inner().put(&commit).unwrap();
        assert_eq!(store.cached_len(), 0);

        store.get(&id).unwrap();
        assert_eq!(store.cached_len(), 1);
        kv.delete(&store.inner().layout().loose_object_key(&id)).unwrap();
        assert_eq!(store.get(&id).unwrap(), commit);
    }

    #[test]
    fn capacity_is_bounded() {
        let (_, store) = cached();
        for i in 0..200 {
            let tree = StoredObject::new(ObjectKind::Tree, format!("entry {i}").into_bytes());
            store.put(&tree).unwrap();
        }
        assert!(store.cached_len() <= 16 * 2, "cache grew to {}", store.cached_len());
    }
}
