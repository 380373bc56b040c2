use flatgit_types::ObjectKind;

use crate::error::{PackError, PackResult};

/// Magic bytes opening a pack data file.
pub const PACK_MAGIC: &[u8; 4] = b"FGPK";
/// Magic bytes opening a pack index file.
pub const INDEX_MAGIC: &[u8; 4] = b"FGIX";
/// Format version of both files.
pub const FORMAT_VERSION: u32 = 1;
/// Magic + version + entry count.
pub const PACK_HEADER_LEN: usize = 12;
/// BLAKE3 trailer length.
pub const TRAILER_LEN: usize = 32;

/// Per-entry header preceding the compressed payload.
///
/// Encoded as: kind byte (git type numbering), varint payload size, varint
/// compressed size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntryHeader {
    pub kind: ObjectKind,
    pub size: u64,
    pub compressed_size: u64,
}

impl EntryHeader {
    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(self.kind.type_number());
        encode_varint(buf, self.size);
        encode_varint(buf, self.compressed_size);
    }

    /// Decode a header starting at `data[0]`, which sits at pack `offset`.
    /// Returns the header and the number of bytes consumed.
    pub fn decode(data: &[u8], offset: u64) -> PackResult<(Self, usize)> {
        let corrupt = |reason: String| PackError::CorruptEntry { offset, reason };

        let type_byte = *data.first().ok_or_else(|| corrupt("offset beyond pack data".into()))?;
        let kind = ObjectKind::from_type_number(type_byte)
            .ok_or_else(|| corrupt(format!("unknown type byte: {type_byte}")))?;

        let mut pos = 1;
        let (size, consumed) = decode_varint(&data[pos..]).map_err(|r| corrupt(r.into()))?;
        pos += consumed;
        let (compressed_size, consumed) = decode_varint(&data[pos..]).map_err(|r| corrupt(r.into()))?;
        pos += consumed;

        Ok((
            Self {
                kind,
                size,
                compressed_size,
            },
            pos,
        ))
    }
}

/// Encode a u64 as a little-endian base-128 varint.
pub(crate) fn encode_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value > 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Decode a varint. Returns (value, bytes_consumed).
pub(crate) fn decode_varint(data: &[u8]) -> Result<(u64, usize), &'static str> {
    let mut value: u64 = 0;
    let mut shift = 0;
    for (i, &byte) in data.iter().enumerate() {
        if shift >= 64 {
            return Err("varint overflow");
        }
        value |= ((byte & 0x7F) as u64) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err("truncated varint")
}
