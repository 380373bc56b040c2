use std::sync::{Arc, Mutex};

use flatgit_kv::KeyValueStore;
use flatgit_types::{KeyLayout, ObjectId, PackId, PackPart, StoredObject};

use crate::error::{PackError, PackResult};
use crate::index::PackIndex;
use crate::reader::PackReader;

/// A pack living in storage, known by its downloaded index.
///
/// The data key is fetched on the first object read and kept for the life
/// of this value.
#[derive(Debug)]
pub struct RemotePack {
    index: PackIndex,
    data: Mutex<Option<Arc<PackReader>>>,
}

impl RemotePack {
    pub fn new(index: PackIndex) -> Self {
        Self {
            index,
            data: Mutex::new(None),
        }
    }

    pub fn id(&self) -> PackId {
        self.index.pack_id
    }

    pub fn index(&self) -> &PackIndex {
        &self.index
    }

    /// Whether the data key has been downloaded yet.
    pub fn is_loaded(&self) -> bool {
        self.data.lock().expect("pack data lock poisoned").is_some()
    }

    /// Read `id` from this pack, fetching the data key if needed.
    pub fn read_object(
        &self,
        id: &ObjectId,
        kv: &dyn KeyValueStore,
        layout: &KeyLayout,
    ) -> PackResult<Option<StoredObject>> {
        if !self.index.contains(id) {
            return Ok(None);
        }
        self.reader(kv, layout)?.read_object(id)
    }

    fn reader(&self, kv: &dyn KeyValueStore, layout: &KeyLayout) -> PackResult<Arc<PackReader>> {
        // Held across the fetch so concurrent readers download once.
        let mut slot = self.data.lock().expect("pack data lock poisoned");
        if let Some(reader) = slot.as_ref() {
            return Ok(reader.clone());
        }
        let id = self.id();
        let data = kv
            .get(&layout.pack_key(&id, PackPart::Data))?
            .ok_or(PackError::MissingData(id))?;
        tracing::debug!(pack = %id, bytes = data.len(), "fetched pack data");
        let reader = Arc::new(PackReader::from_bytes(data, self.index.clone())?);
        *slot = Some(reader.clone());
        Ok(reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::PackBuilder;
    use flatgit_kv::MemoryStore;

    #[test]
    fn data_is_fetched_lazily_once() {
        let kv = MemoryStore::new();
        let layout = KeyLayout::default();
        let object = StoredObject::blob("lazy");
        let mut builder = PackBuilder::new();
        let id = builder.add(&object);
        let index = builder.build().unwrap().upload(&kv, &layout).unwrap();

        let pack = RemotePack::new(index);
        assert!(!pack.is_loaded());
        assert_eq!(
            pack.read_object(&ObjectId::digest(b"other"), &kv, &layout).unwrap(),
            None
        );
        assert!(!pack.is_loaded());

        assert_eq!(pack.read_object(&id, &kv, &layout).unwrap(), Some(object.clone()));
        assert!(pack.is_loaded());

        // Served from memory even once the key is gone.
        kv.delete(&layout.pack_key(&pack.id(), PackPart::Data)).unwrap();
        assert_eq!(pack.read_object(&id, &kv, &layout).unwrap(), Some(object));
    }

    #[test]
    fn missing_data_key() {
        let kv = MemoryStore::new();
        let layout = KeyLayout::default();
        let mut builder = PackBuilder::new();
        let id = builder.add(&StoredObject::blob("orphan index"));
        let (_, index) = builder.finish_to_bytes().unwrap();
        let pack = RemotePack::new(index);
        assert!(matches!(
            pack.read_object(&id, &kv, &layout),
            Err(PackError::MissingData(p)) if p == pack.id()
        ));
    }
}
