//! Loose-object encoding: zlib over `"<kind> <len>\0<payload>"`, the same
//! bytes git keeps under `.git/objects/xx/`.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use flatgit_types::{ObjectId, StoredObject};

use crate::error::{StoreError, StoreResult};

/// Compress the canonical serialization of `object`.
pub fn encode(object: &StoredObject) -> StoreResult<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&object.header())?;
    encoder.write_all(&object.data)?;
    Ok(encoder.finish()?)
}

/// Inflate and parse a loose object, checking it hashes back to `id`.
pub fn decode(id: &ObjectId, bytes: &[u8]) -> StoreResult<StoredObject> {
    let corrupt = |reason: String| StoreError::Corrupt { id: *id, reason };

    let mut canonical = Vec::new();
    ZlibDecoder::new(bytes)
        .read_to_end(&mut canonical)
        .map_err(|e| corrupt(format!("inflate failed: {e}")))?;
    let object = StoredObject::from_canonical_bytes(&canonical).map_err(|e| corrupt(e.to_string()))?;

    let actual = object.compute_id();
    if actual != *id {
        return Err(corrupt(format!("content hashes to {actual}")));
    }
    Ok(object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flatgit_types::ObjectKind;

    #[test]
    fn inflates_to_git_canonical_form() {
        let object = StoredObject::blob("hello world\n");
        let encoded = encode(&object).unwrap();

        let mut inflated = Vec::new();
        ZlibDecoder::new(encoded.as_slice()).read_to_end(&mut inflated).unwrap();
        assert_eq!(inflated, b"blob 12\0hello world\n");
    }

    #[test]
    fn decode_verifies_id() {
        let object = StoredObject::new(ObjectKind::Tree, b"entries".to_vec());
        let encoded = encode(&object).unwrap();
        assert_eq!(decode(&object.compute_id(), &encoded).unwrap(), object);

        let wrong = ObjectId::digest(b"elsewhere");
        assert!(matches!(
            decode(&wrong, &encoded),
            Err(StoreError::Corrupt { id, .. }) if id == wrong
        ));
    }

    #[test]
    fn decode_rejects_garbage() {
        let id = ObjectId::digest(b"x");
        assert!(matches!(decode(&id, b"not zlib"), Err(StoreError::Corrupt { .. })));

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"blob 99\0short").unwrap();
        let truncated = encoder.finish().unwrap();
        assert!(matches!(decode(&id, &truncated), Err(StoreError::Corrupt { .. })));
    }
}
