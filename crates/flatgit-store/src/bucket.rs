use std::sync::Arc;

use flatgit_kv::KeyValueStore;
use flatgit_pack::{PackBuilder, PackError, PackSet, DEFAULT_COMPRESSION_LEVEL};
use flatgit_types::{KeyLayout, ObjectId, PackId, StoredObject};

use crate::error::{StoreError, StoreResult};
use crate::loose;
use crate::traits::{ObjectIds, ObjectStore};

/// Batches at least this large are uploaded as one pack.
pub const DEFAULT_PACK_THRESHOLD: usize = 16;

/// Object store over a flat key-value service.
///
/// Single objects are written loose under `objects/xx/...`; large batches
/// become packs. Reads check the loose key first and fall back to the packs
/// whose index lists the id.
pub struct BucketObjectStore {
    kv: Arc<dyn KeyValueStore>,
    layout: KeyLayout,
    packs: PackSet,
    pack_threshold: usize,
    compression_level: i32,
}

impl BucketObjectStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, layout: KeyLayout) -> Self {
        let packs = PackSet::new(kv.clone(), layout.clone());
        Self {
            kv,
            layout,
            packs,
            pack_threshold: DEFAULT_PACK_THRESHOLD,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }

    /// Replace the pack set, e.g. to configure its freshness window or clock.
    pub fn with_pack_set(mut self, packs: PackSet) -> Self {
        self.packs = packs;
        self
    }

    /// Minimum batch size written as a pack. Zero disables packing.
    pub fn with_pack_threshold(mut self, threshold: usize) -> Self {
        self.pack_threshold = threshold;
        self
    }

    pub fn with_compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }

    pub fn layout(&self) -> &KeyLayout {
        &self.layout
    }

    pub fn pack_set(&self) -> &PackSet {
        &self.packs
    }

    /// Write `objects` as a single pack regardless of the threshold.
    ///
    /// Returns the pack id and the object ids in input order.
    pub fn write_pack(&self, objects: &[StoredObject]) -> StoreResult<(PackId, Vec<ObjectId>)> {
        let mut builder = PackBuilder::with_level(self.compression_level);
        let ids: Vec<ObjectId> = objects.iter().map(|object| builder.add(object)).collect();
        let index = builder
            .build()
            .and_then(|built| built.upload(self.kv.as_ref(), &self.layout))
            .map_err(pack_error)?;
        let pack_id = index.pack_id;
        self.packs.register(index);
        Ok((pack_id, ids))
    }

    fn read_packed(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>> {
        self.packs.read_object(id).map_err(|e| match e {
            PackError::Storage(e) => StoreError::Storage(e),
            other => StoreError::Corrupt {
                id: *id,
                reason: other.to_string(),
            },
        })
    }
}

fn pack_error(error: PackError) -> StoreError {
    match error {
        PackError::Storage(e) => StoreError::Storage(e),
        other => StoreError::Pack(other),
    }
}

impl ObjectStore for BucketObjectStore {
    fn put(&self, object: &StoredObject) -> StoreResult<ObjectId> {
        let id = object.compute_id();
        let encoded = loose::encode(object)?;
        self.kv.put(&self.layout.loose_object_key(&id), &encoded)?;
        tracing::debug!(%id, kind = %object.kind, size = object.size(), "stored loose object");
        Ok(id)
    }

    fn get(&self, id: &ObjectId) -> StoreResult<StoredObject> {
        if let Some(bytes) = self.kv.get(&self.layout.loose_object_key(id))? {
            return loose::decode(id, &bytes);
        }
        self.read_packed(id)?.ok_or(StoreError::NotFound(*id))
    }

    fn contains(&self, id: &ObjectId) -> StoreResult<bool> {
        if self.kv.exists(&self.layout.loose_object_key(id))? {
            return Ok(true);
        }
        self.packs.contains(id).map_err(pack_error)
    }

    fn ids(&self) -> StoreResult<ObjectIds> {
        let keys = self
            .kv
            .list(&self.layout.objects_prefix())?
            .into_iter()
            .map(|meta| meta.key)
            .collect();
        Ok(ObjectIds::new(keys, self.layout.clone()))
    }

    fn put_batch(&self, objects: &[StoredObject]) -> StoreResult<Vec<ObjectId>> {
        if self.pack_threshold > 0 && objects.len() >= self.pack_threshold {
            let (_, ids) = self.write_pack(objects)?;
            return Ok(ids);
        }
        objects.iter().map(|object| self.put(object)).collect()
    }

    fn packed_ids(&self) -> StoreResult<Vec<ObjectId>> {
        self.packs.object_ids().map_err(pack_error)
    }
}

impl std::fmt::Debug for BucketObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketObjectStore")
            .field("kv", &self.kv)
            .field("prefix", &self.layout.prefix())
            .field("pack_threshold", &self.pack_threshold)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flatgit_kv::{DirectoryStore, MemoryStore};
    use flatgit_types::{ObjectKind, PackPart};

    fn store() -> (Arc<MemoryStore>, BucketObjectStore) {
        let kv = Arc::new(MemoryStore::new());
        let store = BucketObjectStore::new(kv.clone(), KeyLayout::default());
        (kv, store)
    }

    fn blobs(n: usize) -> Vec<StoredObject> {
        (0..n).map(|i| StoredObject::blob(format!("blob {i}"))).collect()
    }

    #[test]
    fn put_get_roundtrip() {
        let (_, store) = store();
        let object = StoredObject::new(ObjectKind::Commit, b"tree x\n\nmsg\n".to_vec());
        let id = store.put(&object).unwrap();
        assert_eq!(id, object.compute_id());
        assert_eq!(store.get(&id).unwrap(), object);
        assert!(store.contains(&id).unwrap());
    }

    #[test]
    fn missing_object_is_not_found() {
        let (_, store) = store();
        let id = ObjectId::digest(b"nothing");
        assert!(matches!(store.get(&id), Err(StoreError::NotFound(missing)) if missing == id));
        assert!(!store.contains(&id).unwrap());
    }

    #[test]
    fn loose_key_layout() {
        let kv = Arc::new(MemoryStore::new());
        let store = BucketObjectStore::new(kv.clone(), KeyLayout::new(""));
        let id = store.put(&StoredObject::blob("x")).unwrap();
        let hex = id.to_hex();
        assert_eq!(kv.keys(), vec![format!("objects/{}/{}", &hex[..2], &hex[2..])]);
    }

    #[test]
    fn double_put_is_idempotent() {
        let (_, store) = store();
        let object = StoredObject::blob("twice");
        let a = store.put(&object).unwrap();
        let b = store.put(&object).unwrap();
        assert_eq!(a, b);
        assert_eq!(store.ids().unwrap().collect::<Vec<_>>(), vec![a]);
    }

    #[test]
    fn ids_skip_foreign_keys_and_restart() {
        let (kv, store) = store();
        let ids: Vec<ObjectId> = blobs(3).iter().map(|o| store.put(o).unwrap()).collect();
        kv.put(".git/objects/info/packs", b"").unwrap();
        kv.put(".git/objects/ab/short", b"").unwrap();

        let mut listed: Vec<ObjectId> = store.ids().unwrap().collect();
        listed.sort();
        let mut expected = ids.clone();
        expected.sort();
        assert_eq!(listed, expected);

        let extra = store.put(&StoredObject::blob("later")).unwrap();
        assert_eq!(store.ids().unwrap().count(), 4);
        assert!(store.ids().unwrap().any(|id| id == extra));
    }

    #[test]
    fn corrupt_loose_object() {
        let (kv, store) = store();
        let id = store.put(&StoredObject::blob("fine")).unwrap();
        kv.put(&store.layout().loose_object_key(&id), b"garbage").unwrap();
        assert!(matches!(store.get(&id), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn small_batches_go_loose() {
        let (kv, store) = store();
        let objects = blobs(DEFAULT_PACK_THRESHOLD - 1);
        let ids = store.put_batch(&objects).unwrap();
        assert_eq!(ids.len(), objects.len());
        assert!(kv.list(&store.layout().pack_prefix()).unwrap().is_empty());
        assert_eq!(store.ids().unwrap().count(), objects.len());
    }

    #[test]
    fn large_batches_become_a_pack() {
        let (kv, store) = store();
        let objects = blobs(DEFAULT_PACK_THRESHOLD);
        let ids = store.put_batch(&objects).unwrap();
        let expected: Vec<ObjectId> = objects.iter().map(StoredObject::compute_id).collect();
        assert_eq!(ids, expected);

        // Nothing loose, one data key and one index key.
        assert_eq!(store.ids().unwrap().count(), 0);
        let pack_keys = kv.list(&store.layout().pack_prefix()).unwrap();
        assert_eq!(pack_keys.len(), 2);

        for (object, id) in objects.iter().zip(&ids) {
            assert!(store.contains(id).unwrap());
            assert_eq!(&store.get(id).unwrap(), object);
        }
        let mut packed = store.packed_ids().unwrap();
        packed.sort();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(packed, sorted);
    }

    #[test]
    fn packs_written_elsewhere_become_visible_after_invalidate() {
        let kv = Arc::new(MemoryStore::new());
        let reader = BucketObjectStore::new(kv.clone(), KeyLayout::default());
        let writer = BucketObjectStore::new(kv.clone(), KeyLayout::default());
        let object = StoredObject::blob("from another process");
        let id = object.compute_id();

        assert!(!reader.contains(&id).unwrap());
        writer.write_pack(&[object.clone()]).unwrap();
        assert!(!reader.contains(&id).unwrap(), "listing is cached");
        reader.pack_set().invalidate();
        assert_eq!(reader.get(&id).unwrap(), object);
    }

    #[test]
    fn corrupt_pack_data_reports_corrupt() {
        let (kv, store) = store();
        let object = StoredObject::blob("packed");
        let (pack_id, ids) = store.write_pack(&[object]).unwrap();
        kv.put(&store.layout().pack_key(&pack_id, PackPart::Data), b"FGPK junk").unwrap();
        assert!(matches!(store.get(&ids[0]), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn works_over_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let kv = Arc::new(DirectoryStore::open(dir.path()).unwrap());
        let store = BucketObjectStore::new(kv, KeyLayout::default());
        let object = StoredObject::blob("on disk");
        let id = store.put(&object).unwrap();
        let hex = id.to_hex();
        assert!(dir
            .path()
            .join(".git/objects")
            .join(&hex[..2])
            .join(&hex[2..])
            .is_file());
        assert_eq!(store.get(&id).unwrap(), object);
    }
}
