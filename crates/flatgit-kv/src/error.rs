/// Errors from the storage service.
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    /// The key cannot be represented by this backend.
    #[error("invalid key: {0:?}")]
    InvalidKey(String),

    /// The connection string names a scheme with no backend.
    #[error("unsupported storage scheme: {0}")]
    UnsupportedScheme(String),

    /// The connection string could not be parsed.
    #[error("invalid location: {0}")]
    InvalidLocation(String),

    /// I/O error from a local backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other transport or backend failure.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Result alias for storage operations.
pub type KvResult<T> = Result<T, KvError>;
