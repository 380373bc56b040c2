//! Error types for lock acquisition.

use std::time::Duration;

use flatgit_kv::KvError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    /// The waiter gave up; its marker has been removed.
    #[error("timed out waiting for lock {name} after {attempts} attempts")]
    Timeout { name: String, attempts: u32 },

    /// The service timestamp on our marker disagrees with the local clock.
    #[error("clock skew of {skew:?} exceeds the allowed {max_skew:?}")]
    ClockSkew { skew: Duration, max_skew: Duration },

    /// Lock names become key segments and may not contain `/`.
    #[error("invalid lock name: {0:?}")]
    InvalidName(String),

    /// The strategy needs object versioning and the store has none.
    #[error("storage does not support object versioning")]
    Unsupported,

    #[error(transparent)]
    Storage(#[from] KvError),
}

pub type LockResult<T> = std::result::Result<T, LockError>;
