use flatgit_kv::KvError;
use flatgit_pack::PackError;
use flatgit_types::ObjectId;

/// Errors from object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The object is neither loose nor listed by any visible pack.
    #[error("object not found: {0}")]
    NotFound(ObjectId),

    /// The stored bytes do not inflate, parse, or hash back to the id.
    #[error("corrupt object {id}: {reason}")]
    Corrupt { id: ObjectId, reason: String },

    /// Transport failure from the storage service.
    #[error("storage error: {0}")]
    Storage(#[from] KvError),

    /// Failure building or uploading a pack.
    #[error("pack error: {0}")]
    Pack(#[from] PackError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
