use flatgit_types::{ObjectId, PackId, OBJECT_ID_LEN};

use crate::entry::{FORMAT_VERSION, INDEX_MAGIC};
use crate::error::{PackError, PackResult};

/// Pack index for random-access lookups.
///
/// Layout:
/// - magic `FGIX`, u32 version
/// - fan-out table: 256 entries counting objects with first byte <= index
/// - sorted 20-byte id array
/// - CRC32 array (parallel, over compressed entry bytes)
/// - offset array (parallel, u64)
/// - pack id (20 bytes), then BLAKE3 checksum of the pack data (32 bytes)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackIndex {
    pub fan_out: [u32; 256],
    pub object_ids: Vec<ObjectId>,
    pub crc32s: Vec<u32>,
    pub offsets: Vec<u64>,
    pub pack_id: PackId,
    pub data_checksum: [u8; 32],
}

impl PackIndex {
    /// Build an index from (id, crc32, offset) entries.
    ///
    /// Entries need not be sorted; duplicates must already be removed.
    pub fn build(mut entries: Vec<(ObjectId, u32, u64)>, data_checksum: [u8; 32]) -> Self {
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut fan_out = [0u32; 256];
        let mut object_ids = Vec::with_capacity(entries.len());
        let mut crc32s = Vec::with_capacity(entries.len());
        let mut offsets = Vec::with_capacity(entries.len());

        for (id, crc, offset) in &entries {
            fan_out[id.as_bytes()[0] as usize] += 1;
            object_ids.push(*id);
            crc32s.push(*crc);
            offsets.push(*offset);
        }
        for slot in 1..256 {
            fan_out[slot] += fan_out[slot - 1];
        }

        let pack_id = PackId(ObjectId::digest_ids(&object_ids));
        Self {
            fan_out,
            object_ids,
            crc32s,
            offsets,
            pack_id,
            data_checksum,
        }
    }

    /// Look up an object's (offset, crc32) by id.
    pub fn lookup(&self, id: &ObjectId) -> Option<(u64, u32)> {
        let first_byte = id.as_bytes()[0] as usize;
        let start = if first_byte == 0 {
            0
        } else {
            self.fan_out[first_byte - 1] as usize
        };
        let end = self.fan_out[first_byte] as usize;

        let range = self.object_ids.get(start..end)?;
        let pos = range.binary_search(id).ok()?;
        let idx = start + pos;
        Some((self.offsets[idx], self.crc32s[idx]))
    }

    pub fn object_count(&self) -> usize {
        self.object_ids.len()
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.lookup(id).is_some()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let count = self.object_count();
        let mut buf = Vec::with_capacity(8 + 256 * 4 + count * (OBJECT_ID_LEN + 12) + OBJECT_ID_LEN + 32);
        buf.extend_from_slice(INDEX_MAGIC);
        buf.extend_from_slice(&FORMAT_VERSION.to_be_bytes());
        for &slot in &self.fan_out {
            buf.extend_from_slice(&slot.to_be_bytes());
        }
        for id in &self.object_ids {
            buf.extend_from_slice(id.as_bytes());
        }
        for &crc in &self.crc32s {
            buf.extend_from_slice(&crc.to_be_bytes());
        }
        for &offset in &self.offsets {
            buf.extend_from_slice(&offset.to_be_bytes());
        }
        buf.extend_from_slice(self.pack_id.0.as_bytes());
        buf.extend_from_slice(&self.data_checksum);
        buf
    }

    /// Parse and validate a serialized index.
    pub fn from_bytes(data: &[u8]) -> PackResult<Self> {
        let mut cursor = Cursor { data, pos: 0 };

        let magic = cursor.take(4).map_err(|_| PackError::IndexCorrupted("too short".into()))?;
        if magic != INDEX_MAGIC {
            return Err(PackError::InvalidMagic {
                expected: String::from_utf8_lossy(INDEX_MAGIC).into(),
                actual: String::from_utf8_lossy(magic).into(),
            });
        }
        let version = cursor.u32()?;
        if version != FORMAT_VERSION {
            return Err(PackError::UnsupportedVersion(version));
        }

        let mut fan_out = [0u32; 256];
        for slot in &mut fan_out {
            *slot = cursor.u32()?;
        }
        if fan_out.windows(2).any(|w| w[0] > w[1]) {
            return Err(PackError::IndexCorrupted("fan-out not monotone".into()));
        }

        let count = fan_out[255] as usize;
        let needed = count
            .checked_mul(OBJECT_ID_LEN + 4 + 8)
            .and_then(|n| n.checked_add(OBJECT_ID_LEN + 32))
            .ok_or_else(|| PackError::IndexCorrupted("object count overflow".into()))?;
        if data.len() - cursor.pos != needed {
            return Err(PackError::IndexCorrupted(format!(
                "expected {needed} bytes after fan-out, found {}",
                data.len() - cursor.pos
            )));
        }

        let mut object_ids = Vec::with_capacity(count);
        for _ in 0..count {
            object_ids.push(cursor.id()?);
        }
        if object_ids.windows(2).any(|w| w[0] >= w[1]) {
            return Err(PackError::IndexCorrupted("ids not strictly sorted".into()));
        }

        let mut crc32s = Vec::with_capacity(count);
        for _ in 0..count {
            crc32s.push(cursor.u32()?);
        }
        let mut offsets = Vec::with_capacity(count);
        for _ in 0..count {
            offsets.push(cursor.u64()?);
        }

        let pack_id = PackId(cursor.id()?);
        let mut data_checksum = [0u8; 32];
        data_checksum.copy_from_slice(cursor.take(32)?);

        let index = Self {
            fan_out,
            object_ids,
            crc32s,
            offsets,
            pack_id,
            data_checksum,
        };
        // The fan-out must agree with the ids it buckets.
        if index.object_ids.iter().any(|id| !index.contains(id)) {
            return Err(PackError::IndexCorrupted("fan-out disagrees with ids".into()));
        }
        Ok(index)
    }
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> PackResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| PackError::IndexCorrupted("truncated".into()))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u32(&mut self) -> PackResult<u32> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4)?);
        Ok(u32::from_be_bytes(raw))
    }

    fn u64(&mut self) -> PackResult<u64> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(u64::from_be_bytes(raw))
    }

    fn id(&mut self) -> PackResult<ObjectId> {
        let mut raw = [0u8; OBJECT_ID_LEN];
        raw.copy_from_slice(self.take(OBJECT_ID_LEN)?);
        Ok(ObjectId::from_raw(raw))
    }
}
