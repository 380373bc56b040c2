//! The storage-service contract flatgit is built on.
//!
//! Everything above this crate sees storage as a flat namespace of string
//! keys with whole-value get/put, prefix listing and, optionally, per-key
//! object versioning. No read-after-write consistency across keys is
//! assumed.
//!
//! # Backends
//!
//! - [`MemoryStore`] -- versioned, atomic conditional writes, injectable clock
//! - [`DirectoryStore`] -- one file per key under a local directory
//!
//! Backends are usually opened from a connection string via [`open`].

pub mod directory;
pub mod error;
pub mod location;
pub mod memory;
pub mod traits;

pub use directory::DirectoryStore;
pub use error::{KvError, KvResult};
pub use location::{open, Backend, Credentials, Location};
pub use memory::MemoryStore;
pub use traits::{KeyValueStore, ObjectMeta, VersionEntry, VersionId, VersionedStore};
