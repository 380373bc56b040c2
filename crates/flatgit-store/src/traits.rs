use flatgit_types::{KeyLayout, ObjectId, StoredObject};

use crate::error::StoreResult;

/// Content-addressed object store.
///
/// All implementations must satisfy these invariants:
/// - Objects are immutable once written; rewriting the same content under
///   the same id is harmless.
/// - The store never interprets payloads.
/// - Transport errors are propagated, never retried.
pub trait ObjectStore: Send + Sync {
    /// Store an object and return its id.
    fn put(&self, object: &StoredObject) -> StoreResult<ObjectId>;

    /// Fetch an object, checking loose storage before packs.
    ///
    /// Returns `NotFound` if absent everywhere and `Corrupt` if the stored
    /// bytes do not decode to an object with this id.
    fn get(&self, id: &ObjectId) -> StoreResult<StoredObject>;

    /// Existence check without fetching the payload.
    ///
    /// Advisory: another writer may change the answer immediately.
    fn contains(&self, id: &ObjectId) -> StoreResult<bool>;

    /// Ids of all loose objects.
    ///
    /// Each call takes a fresh listing, so the sequence can be restarted by
    /// calling again.
    fn ids(&self) -> StoreResult<ObjectIds>;

    /// Store many objects and return their ids in input order.
    ///
    /// Default implementation calls `put()` for each object.
    fn put_batch(&self, objects: &[StoredObject]) -> StoreResult<Vec<ObjectId>> {
        objects.iter().map(|object| self.put(object)).collect()
    }

    /// Ids listed by currently visible pack indices.
    fn packed_ids(&self) -> StoreResult<Vec<ObjectId>> {
        Ok(Vec::new())
    }
}

/// Lazy sequence of loose object ids parsed from a key listing.
///
/// Keys in the object namespace that are not loose-object keys are skipped.
#[derive(Debug)]
pub struct ObjectIds {
    keys: std::vec::IntoIter<String>,
    layout: KeyLayout,
}

impl ObjectIds {
    pub fn new(keys: Vec<String>, layout: KeyLayout) -> Self {
        Self {
            keys: keys.into_iter(),
            layout,
        }
    }
}

impl Iterator for ObjectIds {
    type Item = ObjectId;

    fn next(&mut self) -> Option<ObjectId> {
        let layout = &self.layout;
        self.keys.by_ref().find_map(|key| layout.parse_loose_object_key(&key))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, self.keys.size_hint().1)
    }
}
