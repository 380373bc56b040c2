//! Distributed locks for flatgit.
//!
//! The storage service has no lock primitive, so locks are built from
//! marker objects: every waiter writes a marker, lists the markers of the
//! lock, and holds the lock while its own marker sorts first. Releasing
//! deletes the marker.
//!
//! # Strategies
//!
//! All strategies implement [`LockStrategy`]:
//!
//! - [`VersionLock`] -- orders versions of one key; needs a
//!   [`flatgit_kv::VersionedStore`]
//! - [`TimestampLock`] -- orders per-waiter keys by service timestamp; works
//!   on any store
//!
//! # Key Types
//!
//! - [`LockGuard`] -- a held lock, released on drop
//! - [`LockOptions`] -- poll interval, timeout and attempt budget
//! - [`ClockPolicy`] -- whether to check service timestamps against local time
//!
//! Waiting is blocking. [`spawn_acquire`] moves it onto a thread for callers
//! that need to do something else meanwhile.

pub mod error;
pub mod guard;
pub mod options;
pub mod timestamp;
pub mod traits;
pub mod version;

pub use error::{LockError, LockResult};
pub use guard::LockGuard;
pub use options::{ClockPolicy, LockOptions, DEFAULT_POLL_INTERVAL};
pub use timestamp::TimestampLock;
pub use traits::{critical_section, spawn_acquire, LockStrategy};
pub use version::VersionLock;
