//! Repository facade for flatgit.
//!
//! A [`Repository`] is what the remote helper and embedding programs talk
//! to: one storage location, one key prefix, and the object store, ref
//! store and lock strategy built over it.
//!
//! # Key Types
//!
//! - [`Repository`] -- object and ref operations, multi-ref updates under a lock
//! - [`RepoConfig`] -- TOML-loadable settings for opening a repository
//! - [`RefUpdate`] / [`RefUpdateOutcome`] -- one entry of a batch ref update
//! - [`ErrorKind`] -- coarse error classification via [`RepoError::kind`]

pub mod config;
pub mod error;
pub mod repository;
pub mod update;

pub use config::{CacheConfig, LockConfig, LockKind, PackConfig, RepoConfig};
pub use error::{ErrorKind, RepoError, RepoResult};
pub use repository::{Repository, DEFAULT_SYMREF_DEPTH, REFS_LOCK};
pub use update::{RefUpdate, RefUpdateOutcome, UpdateStatus};

pub use flatgit_refs::RefValue;
pub use flatgit_types::{ObjectId, ObjectKind, StoredObject};
