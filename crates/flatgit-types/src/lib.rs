//! Foundation types for flatgit.
//!
//! flatgit keeps a git repository in a flat, eventually-consistent key-value
//! object storage service. This crate holds the pieces every other crate
//! shares.
//!
//! # Key Types
//!
//! - [`ObjectId`] -- SHA-1 content address of an object
//! - [`ObjectKind`] / [`StoredObject`] -- type tag plus opaque payload
//! - [`KeyLayout`] -- pure mapping from objects, packs, refs and locks to keys
//! - [`Clock`] -- injectable wall clock ([`SystemClock`], [`ManualClock`])

pub mod clock;
pub mod error;
pub mod layout;
pub mod object;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::TypeError;
pub use layout::{normalize_prefix, KeyLayout, PackId, PackPart, DEFAULT_PREFIX};
pub use object::{ObjectId, ObjectKind, StoredObject, OBJECT_ID_HEX_LEN, OBJECT_ID_LEN};
