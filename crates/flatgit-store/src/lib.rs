//! Content-addressed object storage for flatgit.
//!
//! Objects are kept the way git keeps them under `.git/objects/`: loose
//! objects as zlib-compressed canonical bytes under a fan-out key, bulk
//! writes as packs. The backing storage is any [`flatgit_kv::KeyValueStore`].
//!
//! # Storage Backends
//!
//! All stores implement the [`ObjectStore`] trait:
//!
//! - [`BucketObjectStore`] -- loose + packed objects over a key-value service
//! - [`CachedObjectStore`] -- bounded read-through cache that skips blobs
//!
//! # Design Rules
//!
//! 1. Objects are immutable once written; re-uploads are harmless.
//! 2. Loose objects are never deleted, even once packed.
//! 3. A pack becomes visible only once its index key exists.
//! 4. The store never interprets payloads.
//! 5. Transport errors are propagated, never retried.

pub mod bucket;
pub mod cache;
pub mod error;
pub mod loose;
pub mod traits;

pub use bucket::{BucketObjectStore, DEFAULT_PACK_THRESHOLD};
pub use cache::{CachedObjectStore, DEFAULT_CACHE_CAPACITY};
pub use error::{StoreError, StoreResult};
pub use traits::{ObjectIds, ObjectStore};
