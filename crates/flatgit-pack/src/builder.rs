use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};

use flatgit_kv::KeyValueStore;
use flatgit_types::{KeyLayout, ObjectId, PackId, PackPart, StoredObject};

use crate::entry::{EntryHeader, FORMAT_VERSION, PACK_MAGIC};
use crate::error::{PackError, PackResult};
use crate::index::PackIndex;

/// zstd level used when none is configured.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Collects objects and serializes them as one pack.
///
/// Objects are deduplicated by id and written in ascending id order, so the
/// same set of objects always yields byte-identical output and the same
/// [`PackId`], whatever order they were added in.
#[derive(Debug)]
pub struct PackBuilder {
    objects: BTreeMap<ObjectId, StoredObject>,
    level: i32,
}

impl PackBuilder {
    pub fn new() -> Self {
        Self::with_level(DEFAULT_COMPRESSION_LEVEL)
    }

    pub fn with_level(level: i32) -> Self {
        Self {
            objects: BTreeMap::new(),
            level,
        }
    }

    /// Queue an object. Adding the same content twice keeps one copy.
    pub fn add(&mut self, object: &StoredObject) -> ObjectId {
        let id = object.compute_id();
        self.objects.entry(id).or_insert_with(|| object.clone());
        id
    }

    /// Number of distinct objects queued.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Id the pack will have once built.
    pub fn pack_id(&self) -> PackId {
        PackId(ObjectId::digest_ids(self.objects.keys()))
    }

    /// Stream the pack into an anonymous scratch file.
    ///
    /// The file is unlinked from the start and vanishes when the returned
    /// [`BuiltPack`] is dropped, whether or not it was uploaded.
    pub fn build(self) -> PackResult<BuiltPack> {
        let mut file = tempfile::tempfile()?;
        let (index, len) = self.write_to(&mut file)?;
        file.flush()?;
        Ok(BuiltPack { index, file, len })
    }

    /// Build pack bytes and index in memory.
    pub fn finish_to_bytes(self) -> PackResult<(Vec<u8>, PackIndex)> {
        let mut data = Vec::new();
        let (index, _) = self.write_to(&mut data)?;
        Ok((data, index))
    }

    fn write_to<W: Write>(&self, out: W) -> PackResult<(PackIndex, u64)> {
        if self.objects.is_empty() {
            return Err(PackError::Empty);
        }
        let mut out = HashingWriter::new(out);

        let mut header = Vec::with_capacity(12);
        header.extend_from_slice(PACK_MAGIC);
        header.extend_from_slice(&FORMAT_VERSION.to_be_bytes());
        header.extend_from_slice(&(self.objects.len() as u32).to_be_bytes());
        out.write_all(&header)?;

        let mut entries = Vec::with_capacity(self.objects.len());
        let mut entry_header = Vec::with_capacity(24);
        for (id, object) in &self.objects {
            let offset = out.written;
            let compressed = zstd::encode_all(object.data.as_slice(), self.level)
                .map_err(|e| PackError::CompressionFailed(e.to_string()))?;

            entry_header.clear();
            EntryHeader {
                kind: object.kind,
                size: object.data.len() as u64,
                compressed_size: compressed.len() as u64,
            }
            .encode(&mut entry_header);
            out.write_all(&entry_header)?;
            out.write_all(&compressed)?;

            entries.push((*id, crc32fast::hash(&compressed), offset));
        }

        let (mut inner, checksum, written) = out.finish();
        inner.write_all(&checksum)?;
        let len = written + checksum.len() as u64;

        Ok((PackIndex::build(entries, checksum), len))
    }
}

impl Default for PackBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A pack serialized to a scratch file, ready for upload.
#[derive(Debug)]
pub struct BuiltPack {
    index: PackIndex,
    file: File,
    len: u64,
}

impl BuiltPack {
    pub fn id(&self) -> PackId {
        self.index.pack_id
    }

    pub fn index(&self) -> &PackIndex {
        &self.index
    }

    /// Size of the pack data in bytes, trailer included.
    pub fn data_len(&self) -> u64 {
        self.len
    }

    /// Upload the data key, then the index key.
    ///
    /// Readers ignore a data key whose index is absent, so a failure between
    /// the two writes leaves nothing visible.
    pub fn upload(mut self, kv: &dyn KeyValueStore, layout: &KeyLayout) -> PackResult<PackIndex> {
        let id = self.id();
        self.file.seek(SeekFrom::Start(0))?;
        kv.put_reader(&layout.pack_key(&id, PackPart::Data), &mut self.file)?;
        kv.put(&layout.pack_key(&id, PackPart::Index), &self.index.to_bytes())?;
        tracing::info!(
            pack = %id,
            objects = self.index.object_count(),
            bytes = self.len,
            "uploaded pack"
        );
        Ok(self.index)
    }
}

/// Tracks the BLAKE3 digest and length of everything written through it.
struct HashingWriter<W> {
    inner: W,
    hasher: blake3::Hasher,
    written: u64,
}

impl<W: Write> HashingWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: blake3::Hasher::new(),
            written: 0,
        }
    }

    fn finish(self) -> (W, [u8; 32], u64) {
        (self.inner, *self.hasher.finalize().as_bytes(), self.written)
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
