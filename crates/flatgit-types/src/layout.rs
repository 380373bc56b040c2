//! Mapping between repository concepts and flat storage keys.
//!
//! The layout mirrors a `.git` directory, so a bucket copied onto an empty
//! directory is a valid git repository:
//!
//! - `<prefix>objects/aa/bbcc...` for loose objects
//! - `<prefix>objects/pack/pack-<id>.{pack,idx}` for packs
//! - `<prefix>refs/...` and `<prefix>HEAD` for refs
//! - `<prefix>locks/<name>` for lock markers

use std::fmt;

use crate::object::{ObjectId, OBJECT_ID_HEX_LEN};

/// Prefix used when none is configured.
pub const DEFAULT_PREFIX: &str = ".git";

const OBJECTS_DIR: &str = "objects/";
const PACK_DIR: &str = "objects/pack/";
const REFS_DIR: &str = "refs/";
const LOCKS_DIR: &str = "locks/";
const LOCK_SUFFIX: &str = ".lock";

/// Identity of a pack: SHA-1 over its sorted member ids.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackId(pub ObjectId);

impl fmt::Debug for PackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PackId({})", self.0.short_hex())
    }
}

impl fmt::Display for PackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pack-{}", self.0)
    }
}

/// The two companion keys making up a pack.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PackPart {
    Data,
    Index,
}

impl PackPart {
    fn extension(&self) -> &'static str {
        match self {
            Self::Data => ".pack",
            Self::Index => ".idx",
        }
    }
}

/// Normalize a repository prefix: trim whitespace and slashes, then
/// re-append a single trailing `/` unless the result is empty.
pub fn normalize_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/').trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}

/// Stateless key computation rooted at a normalized prefix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyLayout {
    prefix: String,
}

impl KeyLayout {
    /// Create a layout rooted at `prefix` (normalized).
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: normalize_prefix(prefix),
        }
    }

    /// The normalized prefix, empty or ending in `/`.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    // ---- objects ----

    /// Listing prefix for the loose-object namespace.
    pub fn objects_prefix(&self) -> String {
        format!("{}{OBJECTS_DIR}", self.prefix)
    }

    /// `<prefix>objects/<2 hex>/<38 hex>`.
    pub fn loose_object_key(&self, id: &ObjectId) -> String {
        let hex = id.to_hex();
        format!("{}{OBJECTS_DIR}{}/{}", self.prefix, &hex[..2], &hex[2..])
    }

    /// Recover the object id from a loose-object key.
    ///
    /// Keys sharing the namespace but of a different length (packs, stray
    /// files) yield `None`.
    pub fn parse_loose_object_key(&self, key: &str) -> Option<ObjectId> {
        let rest = key.strip_prefix(&self.prefix)?.strip_prefix(OBJECTS_DIR)?;
        if rest.len() != OBJECT_ID_HEX_LEN + 1 || rest.as_bytes()[2] != b'/' {
            return None;
        }
        let mut hex = String::with_capacity(OBJECT_ID_HEX_LEN);
        hex.push_str(&rest[..2]);
        hex.push_str(&rest[3..]);
        ObjectId::from_hex(&hex).ok()
    }

    // ---- packs ----

    /// Listing prefix for the pack namespace.
    pub fn pack_prefix(&self) -> String {
        format!("{}{PACK_DIR}", self.prefix)
    }

    /// `<prefix>objects/pack/pack-<hex>.pack` or `.idx`.
    pub fn pack_key(&self, id: &PackId, part: PackPart) -> String {
        format!("{}{PACK_DIR}{id}{}", self.prefix, part.extension())
    }

    /// Recover pack id and part from a pack key.
    pub fn parse_pack_key(&self, key: &str) -> Option<(PackId, PackPart)> {
        let name = key.strip_prefix(&self.prefix)?.strip_prefix(PACK_DIR)?;
        let name = name.strip_prefix("pack-")?;
        let (hex, part) = if let Some(hex) = name.strip_suffix(".pack") {
            (hex, PackPart::Data)
        } else if let Some(hex) = name.strip_suffix(".idx") {
            (hex, PackPart::Index)
        } else {
            return None;
        };
        let id = ObjectId::from_hex(hex).ok()?;
        Some((PackId(id), part))
    }

    // ---- refs ----

    /// Listing prefix for the `refs/` namespace.
    pub fn refs_prefix(&self) -> String {
        format!("{}{REFS_DIR}", self.prefix)
    }

    /// Key holding the ref `name` (e.g. `refs/heads/main` or `HEAD`).
    pub fn ref_key(&self, name: &str) -> String {
        format!("{}{name}", self.prefix)
    }

    /// Ref name for a key under the prefix.
    pub fn ref_name_from_key<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(&self.prefix).filter(|name| !name.is_empty())
    }

    // ---- locks ----

    /// Fixed marker key for a version-ordered lock.
    pub fn lock_key(&self, name: &str) -> String {
        format!("{}{LOCKS_DIR}{name}", self.prefix)
    }

    /// Listing prefix for timestamp-ordered markers of lock `name`.
    pub fn lock_marker_prefix(&self, name: &str) -> String {
        format!("{}{LOCKS_DIR}{name}/", self.prefix)
    }

    /// `<prefix>locks/<name>/<marker>.lock`.
    pub fn lock_marker_key(&self, name: &str, marker: &str) -> String {
        format!("{}{marker}{LOCK_SUFFIX}", self.lock_marker_prefix(name))
    }

    /// Whether `key` is a timestamp-lock marker of lock `name`.
    pub fn is_lock_marker_key(&self, name: &str, key: &str) -> bool {
        key.strip_prefix(&self.lock_marker_prefix(name))
            .map(|rest| rest.ends_with(LOCK_SUFFIX) && !rest.contains('/'))
            .unwrap_or(false)
    }
}

impl Default for KeyLayout {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(hex_prefix: &str) -> ObjectId {
        let mut hex = hex_prefix.to_string();
        while hex.len() < OBJECT_ID_HEX_LEN {
            hex.push('0');
        }
        ObjectId::from_hex(&hex).unwrap()
    }

    #[test]
    fn prefix_normalization() {
        assert_eq!(normalize_prefix(".git"), ".git/");
        assert_eq!(normalize_prefix("  /repos/a.git// "), "repos/a.git/");
        assert_eq!(normalize_prefix(""), "");
        assert_eq!(normalize_prefix(" / "), "");
    }

    #[test]
    fn loose_key_fans_out_on_first_byte() {
        let layout = KeyLayout::new("");
        let oid = id("aabbcc");
        let key = layout.loose_object_key(&oid);
        assert_eq!(key, format!("objects/aa/{}", &oid.to_hex()[2..]));
        assert_eq!(key.len(), "objects/".len() + 41);
    }

    #[test]
    fn loose_key_parses_back() {
        let layout = KeyLayout::default();
        let oid = id("1234abcd");
        let key = layout.loose_object_key(&oid);
        assert!(key.starts_with(".git/objects/12/34abcd"));
        assert_eq!(layout.parse_loose_object_key(&key), Some(oid));
    }

    #[test]
    fn loose_key_rejects_foreign_keys() {
        let layout = KeyLayout::default();
        assert_eq!(layout.parse_loose_object_key(".git/objects/info/packs"), None);
        assert_eq!(
            layout.parse_loose_object_key(&format!(".git/objects/pack/pack-{}.idx", id("ab"))),
            None
        );
        // Right length, wrong shape.
        let bogus = format!(".git/objects/{}", "a".repeat(41));
        assert_eq!(layout.parse_loose_object_key(&bogus), None);
        // Other prefix.
        assert_eq!(
            layout.parse_loose_object_key(&KeyLayout::new("other").loose_object_key(&id("ab"))),
            None
        );
    }

    #[test]
    fn pack_keys_roundtrip() {
        let layout = KeyLayout::default();
        let pack = PackId(id("cafe"));
        let data = layout.pack_key(&pack, PackPart::Data);
        let index = layout.pack_key(&pack, PackPart::Index);
        assert_eq!(data, format!(".git/objects/pack/pack-{}.pack", pack.0));
        assert_eq!(layout.parse_pack_key(&data), Some((pack, PackPart::Data)));
        assert_eq!(layout.parse_pack_key(&index), Some((pack, PackPart::Index)));
        assert_eq!(layout.parse_pack_key(".git/objects/pack/README"), None);
        assert_eq!(layout.parse_pack_key(".git/objects/pack/pack-xyz.pack"), None);
    }

    #[test]
    fn ref_keys() {
        let layout = KeyLayout::default();
        assert_eq!(layout.ref_key("refs/heads/main"), ".git/refs/heads/main");
        assert_eq!(layout.ref_key("HEAD"), ".git/HEAD");
        assert_eq!(layout.refs_prefix(), ".git/refs/");
        assert_eq!(
            layout.ref_name_from_key(".git/refs/tags/v1"),
            Some("refs/tags/v1")
        );
        assert_eq!(layout.ref_name_from_key("elsewhere/refs/x"), None);
    }

    #[test]
    fn lock_keys() {
        let layout = KeyLayout::new("repo");
        assert_eq!(layout.lock_key("refs"), "repo/locks/refs");
        let marker = layout.lock_marker_key("refs", "abc");
        assert_eq!(marker, "repo/locks/refs/abc.lock");
        assert!(layout.is_lock_marker_key("refs", &marker));
        assert!(!layout.is_lock_marker_key("refs", "repo/locks/refs/abc"));
        assert!(!layout.is_lock_marker_key("refs", "repo/locks/refs/sub/abc.lock"));
        assert!(!layout.is_lock_marker_key("other", &marker));
    }
}
