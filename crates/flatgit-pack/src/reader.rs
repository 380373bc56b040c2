use flatgit_types::{ObjectId, StoredObject};

use crate::entry::{EntryHeader, FORMAT_VERSION, PACK_HEADER_LEN, PACK_MAGIC, TRAILER_LEN};
use crate::error::{PackError, PackResult};
use crate::index::PackIndex;

/// Reads objects from pack data using its index for random access.
#[derive(Debug)]
pub struct PackReader {
    data: Vec<u8>,
    index: PackIndex,
}

impl PackReader {
    /// Validate `data` against `index` and wrap both.
    ///
    /// Checks magic, version, entry count and the BLAKE3 trailer, which must
    /// match both the data and the checksum the index recorded.
    pub fn from_bytes(data: Vec<u8>, index: PackIndex) -> PackResult<Self> {
        if data.len() < PACK_HEADER_LEN + TRAILER_LEN {
            return Err(PackError::CorruptEntry {
                offset: 0,
                reason: "pack data too short".into(),
            });
        }
        if &data[0..4] != PACK_MAGIC {
            return Err(PackError::InvalidMagic {
                expected: String::from_utf8_lossy(PACK_MAGIC).into(),
                actual: String::from_utf8_lossy(&data[0..4]).into(),
            });
        }
        let version = read_u32(&data[4..8]);
        if version != FORMAT_VERSION {
            return Err(PackError::UnsupportedVersion(version));
        }
        let count = read_u32(&data[8..12]) as usize;
        if count != index.object_count() {
            return Err(PackError::CorruptEntry {
                offset: 8,
                reason: format!("pack holds {count} entries, index lists {}", index.object_count()),
            });
        }

        let body_len = data.len() - TRAILER_LEN;
        let computed = blake3::hash(&data[..body_len]);
        if computed.as_bytes() != &data[body_len..] || computed.as_bytes() != &index.data_checksum {
            return Err(PackError::ChecksumMismatch);
        }

        Ok(Self { data, index })
    }

    /// Read an object by id, or `None` if this pack does not hold it.
    pub fn read_object(&self, id: &ObjectId) -> PackResult<Option<StoredObject>> {
        let Some((offset, expected_crc)) = self.index.lookup(id) else {
            return Ok(None);
        };
        let object = self.read_at_offset(id, offset, expected_crc)?;
        Ok(Some(object))
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.index.contains(id)
    }

    pub fn object_count(&self) -> usize {
        self.index.object_count()
    }

    pub fn index(&self) -> &PackIndex {
        &self.index
    }

    fn read_at_offset(&self, id: &ObjectId, offset: u64, expected_crc: u32) -> PackResult<StoredObject> {
        let body = &self.data[..self.data.len() - TRAILER_LEN];
        let start = usize::try_from(offset)
            .ok()
            .filter(|&start| start >= PACK_HEADER_LEN && start < body.len())
            .ok_or_else(|| PackError::CorruptEntry {
                offset,
                reason: "offset outside pack body".into(),
            })?;

        let (header, consumed) = EntryHeader::decode(&body[start..], offset)?;
        let payload_start = start + consumed;
        let payload_end = usize::try_from(header.compressed_size)
            .ok()
            .and_then(|len| payload_start.checked_add(len))
            .filter(|&end| end <= body.len())
            .ok_or_else(|| PackError::CorruptEntry {
                offset,
                reason: "compressed data extends beyond pack".into(),
            })?;
        let compressed = &body[payload_start..payload_end];

        if crc32fast::hash(compressed) != expected_crc {
            return Err(PackError::CrcMismatch { id: *id });
        }

        let decompressed =
            zstd::decode_all(compressed).map_err(|e| PackError::DecompressionFailed(e.to_string()))?;
        if decompressed.len() as u64 != header.size {
            return Err(PackError::CorruptEntry {
                offset,
                reason: format!("size mismatch: expected {}, got {}", header.size, decompressed.len()),
            });
        }

        let object = StoredObject::new(header.kind, decompressed);
        let actual = object.compute_id();
        if actual != *id {
            return Err(PackError::IdMismatch { expected: *id, actual });
        }
        Ok(object)
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[..4]);
    u32::from_be_bytes(raw)
}
