use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::error::TypeError;

/// Length of a raw object identifier in bytes.
pub const OBJECT_ID_LEN: usize = 20;

/// Length of a hex-encoded object identifier.
pub const OBJECT_ID_HEX_LEN: usize = OBJECT_ID_LEN * 2;

/// Content-addressed identifier for any stored object.
///
/// An `ObjectId` is the SHA-1 digest of an object's canonical serialization
/// (`"<kind> <len>\0<payload>"`), the same identifier git uses. Identical
/// content always produces the same `ObjectId`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId([u8; OBJECT_ID_LEN]);

impl ObjectId {
    /// Create an `ObjectId` from a pre-computed digest.
    pub const fn from_raw(raw: [u8; OBJECT_ID_LEN]) -> Self {
        Self(raw)
    }

    /// SHA-1 digest of arbitrary bytes.
    pub fn digest(data: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(data);
        Self::from_hasher(hasher)
    }

    /// SHA-1 over the concatenated raw bytes of `ids`, in iteration order.
    pub fn digest_ids<'a>(ids: impl IntoIterator<Item = &'a ObjectId>) -> Self {
        let mut hasher = Sha1::new();
        for id in ids {
            hasher.update(id.as_bytes());
        }
        Self::from_hasher(hasher)
    }

    fn from_hasher(hasher: Sha1) -> Self {
        let mut raw = [0u8; OBJECT_ID_LEN];
        raw.copy_from_slice(&hasher.finalize());
        Self(raw)
    }

    /// The null object ID (all zeros).
    pub const fn null() -> Self {
        Self([0u8; OBJECT_ID_LEN])
    }

    /// Returns `true` if this is the null object ID.
    pub fn is_null(&self) -> bool {
        self.0 == [0u8; OBJECT_ID_LEN]
    }

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; OBJECT_ID_LEN] {
        &self.0
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a 40-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        if bytes.len() != OBJECT_ID_LEN {
            return Err(TypeError::InvalidLength {
                expected: OBJECT_ID_LEN,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; OBJECT_ID_LEN];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.short_hex())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<[u8; OBJECT_ID_LEN]> for ObjectId {
    fn from(bytes: [u8; OBJECT_ID_LEN]) -> Self {
        Self(bytes)
    }
}

/// The kind of object stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    /// History node.
    Commit,
    /// Directory listing.
    Tree,
    /// Raw content.
    Blob,
    /// Annotated tag.
    Tag,
}

impl ObjectKind {
    /// The git type number, also used as the pack entry type byte.
    pub fn type_number(&self) -> u8 {
        match self {
            Self::Commit => 1,
            Self::Tree => 2,
            Self::Blob => 3,
            Self::Tag => 4,
        }
    }

    /// Parse from a git type number.
    pub fn from_type_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(Self::Commit),
            2 => Some(Self::Tree),
            3 => Some(Self::Blob),
            4 => Some(Self::Tag),
            _ => None,
        }
    }

    /// The name used in canonical object headers.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::Tree => "tree",
            Self::Blob => "blob",
            Self::Tag => "tag",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectKind {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "commit" => Ok(Self::Commit),
            "tree" => Ok(Self::Tree),
            "blob" => Ok(Self::Blob),
            "tag" => Ok(Self::Tag),
            other => Err(TypeError::UnknownKind(other.to_string())),
        }
    }
}

/// A stored object: kind tag plus opaque payload.
///
/// The store never interprets the payload; tree/commit/tag parsing belongs to
/// the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    /// The type of this object.
    pub kind: ObjectKind,
    /// The payload bytes.
    pub data: Vec<u8>,
}

impl StoredObject {
    /// Create a new stored object from kind and data.
    pub fn new(kind: ObjectKind, data: Vec<u8>) -> Self {
        Self { kind, data }
    }

    /// Shorthand for a blob object.
    pub fn blob(data: impl Into<Vec<u8>>) -> Self {
        Self::new(ObjectKind::Blob, data.into())
    }

    /// Payload size in bytes.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// The canonical header, `"<kind> <len>\0"`.
    pub fn header(&self) -> Vec<u8> {
        format!("{} {}\0", self.kind, self.data.len()).into_bytes()
    }

    /// Compute the content-addressed ID for this object.
    pub fn compute_id(&self) -> ObjectId {
        let mut hasher = Sha1::new();
        hasher.update(self.header());
        hasher.update(&self.data);
        ObjectId::from_hasher(hasher)
    }

    /// Canonical serialization: header followed by payload.
    pub fn to_canonical_bytes(&self) -> Vec<u8> {
        let mut buf = self.header();
        buf.extend_from_slice(&self.data);
        buf
    }

    /// Parse the canonical serialization back into an object.
    ///
    /// The declared length must match the payload exactly.
    pub fn from_canonical_bytes(bytes: &[u8]) -> Result<Self, TypeError> {
        let nul = bytes
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| TypeError::MalformedHeader("missing NUL terminator".into()))?;
        let header = std::str::from_utf8(&bytes[..nul])
            .map_err(|_| TypeError::MalformedHeader("header is not UTF-8".into()))?;
        let (kind, len) = header
            .split_once(' ')
            .ok_or_else(|| TypeError::MalformedHeader(format!("no size in {header:?}")))?;
        let kind: ObjectKind = kind.parse()?;
        let len: usize = len
            .parse()
            .map_err(|_| TypeError::MalformedHeader(format!("bad size {len:?}")))?;
        let data = &bytes[nul + 1..];
        if data.len() != len {
            return Err(TypeError::MalformedHeader(format!(
                "declared {len} bytes, found {}",
                data.len()
            )));
        }
        Ok(Self::new(kind, data.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_blob_has_git_id() {
        let obj = StoredObject::blob(Vec::new());
        assert_eq!(
            obj.compute_id().to_hex(),
            "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391"
        );
    }

    #[test]
    fn hello_blob_has_git_id() {
        // `printf 'hello world\n' | git hash-object --stdin`
        let obj = StoredObject::blob(b"hello world\n".to_vec());
        assert_eq!(
            obj.compute_id().to_hex(),
            "3b18e512dba79e4c8300dd08aeb37f8e728b8dad"
        );
    }

    #[test]
    fn kind_changes_id() {
        let blob = StoredObject::new(ObjectKind::Blob, b"same".to_vec());
        let tree = StoredObject::new(ObjectKind::Tree, b"same".to_vec());
        assert_ne!(blob.compute_id(), tree.compute_id());
    }

    #[test]
    fn canonical_bytes_parse_back() {
        let obj = StoredObject::new(ObjectKind::Commit, b"tree abc\n\nmsg\n".to_vec());
        let parsed = StoredObject::from_canonical_bytes(&obj.to_canonical_bytes()).unwrap();
        assert_eq!(parsed, obj);
    }

    #[test]
    fn canonical_rejects_length_mismatch() {
        let err = StoredObject::from_canonical_bytes(b"blob 10\0short").unwrap_err();
        assert!(matches!(err, TypeError::MalformedHeader(_)));
    }

    #[test]
    fn canonical_rejects_unknown_kind() {
        let err = StoredObject::from_canonical_bytes(b"widget 1\0x").unwrap_err();
        assert_eq!(err, TypeError::UnknownKind("widget".into()));
    }

    #[test]
    fn canonical_rejects_missing_nul() {
        assert!(StoredObject::from_canonical_bytes(b"blob 3 abc").is_err());
    }

    #[test]
    fn hex_roundtrip() {
        let id = StoredObject::blob(b"test".to_vec()).compute_id();
        let parsed: ObjectId = id.to_hex().parse().unwrap();
        assert_eq!(id, parsed);
        assert_eq!(id.to_hex().len(), OBJECT_ID_HEX_LEN);
    }

    #[test]
    fn from_hex_rejects_wrong_length() {
        let err = ObjectId::from_hex("abcd").unwrap_err();
        assert_eq!(
            err,
            TypeError::InvalidLength {
                expected: 20,
                actual: 2
            }
        );
    }

    #[test]
    fn from_hex_rejects_non_hex() {
        assert!(matches!(
            ObjectId::from_hex(&"zz".repeat(20)),
            Err(TypeError::InvalidHex(_))
        ));
    }

    #[test]
    fn null_is_all_zeros() {
        assert!(ObjectId::null().is_null());
        assert!(!ObjectId::digest(b"x").is_null());
    }

    #[test]
    fn type_numbers_follow_git() {
        for kind in [
            ObjectKind::Commit,
            ObjectKind::Tree,
            ObjectKind::Blob,
            ObjectKind::Tag,
        ] {
            assert_eq!(ObjectKind::from_type_number(kind.type_number()), Some(kind));
            assert_eq!(kind.as_str().parse::<ObjectKind>().unwrap(), kind);
        }
        assert_eq!(ObjectKind::Blob.type_number(), 3);
        assert!(ObjectKind::from_type_number(0).is_none());
        assert!(ObjectKind::from_type_number(7).is_none());
    }

    #[test]
    fn serde_roundtrip() {
        let id = ObjectId::digest(b"serde test");
        let json = serde_json::to_string(&id).unwrap();
        let parsed: ObjectId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn digest_ids_depends_on_order() {
        let a = ObjectId::digest(b"a");
        let b = ObjectId::digest(b"b");
        assert_eq!(ObjectId::digest_ids([&a, &b]), ObjectId::digest_ids(&[a, b]));
        assert_ne!(ObjectId::digest_ids([&a, &b]), ObjectId::digest_ids([&b, &a]));
    }

    #[test]
    fn ordering_is_bytewise() {
        assert!(ObjectId::from_raw([0; 20]) < ObjectId::from_raw([1; 20]));
    }
}
