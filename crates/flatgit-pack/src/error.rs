use flatgit_kv::KvError;
use flatgit_types::{ObjectId, PackId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PackError {
    #[error("invalid magic: expected {expected}, got {actual}")]
    InvalidMagic { expected: String, actual: String },

    #[error("unsupported pack version: {0}")]
    UnsupportedVersion(u32),

    #[error("pack checksum mismatch")]
    ChecksumMismatch,

    #[error("corrupt pack entry at offset {offset}: {reason}")]
    CorruptEntry { offset: u64, reason: String },

    #[error("CRC32 mismatch for object {id}")]
    CrcMismatch { id: ObjectId },

    #[error("pack entry hashes to {actual}, index says {expected}")]
    IdMismatch { expected: ObjectId, actual: ObjectId },

    #[error("decompression failed: {0}")]
    DecompressionFailed(String),

    #[error("compression failed: {0}")]
    CompressionFailed(String),

    #[error("index corrupted: {0}")]
    IndexCorrupted(String),

    #[error("pack data missing for {0}")]
    MissingData(PackId),

    #[error("cannot build an empty pack")]
    Empty,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Storage(#[from] KvError),
}

pub type PackResult<T> = Result<T, PackError>;
