//! Git-style references for flatgit.
//!
//! Refs are mutable, named pointers into the object store. Each ref is one
//! key under the repository prefix (`.git/refs/heads/main`, `.git/HEAD`)
//! holding git's loose-ref format, so a bucket written by flatgit looks like
//! a `.git` directory.
//!
//! # Architecture
//!
//! - **Direct refs** hold `<40 hex>\n` and point at an object.
//! - **Symbolic refs** hold `ref: <target>\n` and point at another ref;
//!   `HEAD` is usually one.
//! - Updates are compare-and-swap on a single key. Losing a race is an
//!   `Ok(false)`, not an error.
//!
//! # Modules
//!
//! - [`error`] -- Error types for ref operations
//! - [`types`] -- [`RefValue`] and its wire format
//! - [`traits`] -- The [`RefStore`] trait defining the storage interface
//! - [`names`] -- Ref name validation
//! - [`bucket`] -- [`BucketRefStore`] over a key-value service

pub mod bucket;
pub mod error;
pub mod names;
pub mod traits;
pub mod types;

pub use bucket::BucketRefStore;
pub use error::{RefError, RefResult};
pub use names::{branch_ref, validate_branch_name, validate_ref_name, HEAD, REFS_NAMESPACE};
pub use traits::RefStore;
pub use types::RefValue;
