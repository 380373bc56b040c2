//! Error types for reference operations.

use flatgit_kv::KvError;
use thiserror::Error;

/// Errors that can occur during reference operations.
#[derive(Debug, Error)]
pub enum RefError {
    /// The ref name does not follow git naming rules.
    #[error("invalid ref name: {name}: {reason}")]
    InvalidName { name: String, reason: String },

    /// The stored value is neither a hex id nor a `ref: ` line.
    #[error("malformed ref {name}: {reason}")]
    Malformed { name: String, reason: String },

    /// The key-value service failed.
    #[error(transparent)]
    Storage(#[from] KvError),
}

/// Convenience type alias for ref operations.
pub type RefResult<T> = std::result::Result<T, RefError>;
