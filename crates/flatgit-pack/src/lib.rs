//! Pack format for flatgit.
//!
//! A pack bundles many objects into two storage keys so that bulk uploads
//! cost two requests instead of one per object.
//!
//! # Architecture
//!
//! - **Pack data** (`.pack`): zstd-compressed entries in id order with a BLAKE3 trailer
//! - **Pack index** (`.idx`): fan-out table + sorted ids for O(log n) lookups
//! - **PackBuilder**: dedups, sorts and streams a pack into a scratch file
//! - **PackReader**: random-access reading using the index
//! - **RemotePack** / **PackSet**: packs in storage, with lazy data fetch and a
//!   time-boxed listing cache

pub mod builder;
pub mod entry;
pub mod error;
pub mod index;
pub mod manager;
pub mod reader;
pub mod remote;

pub use builder::{BuiltPack, PackBuilder, DEFAULT_COMPRESSION_LEVEL};
pub use entry::EntryHeader;
pub use error::{PackError, PackResult};
pub use index::PackIndex;
pub use manager::{PackSet, DEFAULT_FRESHNESS};
pub use reader::PackReader;
pub use remote::RemotePack;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use flatgit_kv::DirectoryStore;
    use flatgit_types::{KeyLayout, ObjectKind, StoredObject};

    #[test]
    fn pack_through_directory_store() {
        let dir = tempfile::tempdir().unwrap();
        let kv = Arc::new(DirectoryStore::open(dir.path()).unwrap());
        let layout = KeyLayout::default();

        let objects = vec![
            StoredObject::blob("readme"),
            StoredObject::new(ObjectKind::Tree, b"100644 README\0".to_vec()),
            StoredObject::new(ObjectKind::Commit, b"tree abc\n\ninitial\n".to_vec()),
        ];
        let mut builder = PackBuilder::new();
        for object in &objects {
            builder.add(object);
        }
        let id = builder.pack_id();
        builder.build().unwrap().upload(kv.as_ref(), &layout).unwrap();

        let pack_dir = dir.path().join(".git").join("objects").join("pack");
        assert!(pack_dir.join(format!("{id}.pack")).is_file());
        assert!(pack_dir.join(format!("{id}.idx")).is_file());

        let set = PackSet::new(kv, layout);
        for object in &objects {
            assert_eq!(set.read_object(&object.compute_id()).unwrap().as_ref(), Some(object));
        }
    }
}
