use flatgit_kv::KvError;
use flatgit_lock::LockError;
use flatgit_refs::RefError;
use flatgit_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepoError {
    /// A conditional ref update found a different value.
    #[error("ref {name} was changed concurrently")]
    Conflict { name: String },

    #[error("symbolic ref chain from {name} is deeper than {depth}")]
    SymrefDepth { name: String, depth: usize },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("object store error: {0}")]
    Store(#[from] StoreError),

    #[error("ref error: {0}")]
    Ref(#[from] RefError),

    #[error("lock error: {0}")]
    Lock(#[from] LockError),

    #[error("storage error: {0}")]
    Storage(#[from] KvError),
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Coarse classification callers branch on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Corrupt,
    Storage,
    Unsupported,
    LockTimeout,
    Config,
}

impl RepoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::SymrefDepth { .. } => ErrorKind::Unsupported,
            Self::Config(_) => ErrorKind::Config,
            Self::Store(e) => match e {
                StoreError::NotFound(_) => ErrorKind::NotFound,
                StoreError::Corrupt { .. } | StoreError::Pack(_) => ErrorKind::Corrupt,
                StoreError::Storage(e) => kv_kind(e),
                StoreError::Io(_) => ErrorKind::Storage,
            },
            Self::Ref(e) => match e {
                RefError::InvalidName { .. } => ErrorKind::Unsupported,
                RefError::Malformed { .. } => ErrorKind::Corrupt,
                RefError::Storage(e) => kv_kind(e),
            },
            Self::Lock(e) => match e {
                LockError::Timeout { .. } | LockError::ClockSkew { .. } => ErrorKind::LockTimeout,
                LockError::Unsupported | LockError::InvalidName(_) => ErrorKind::Unsupported,
                LockError::Storage(e) => kv_kind(e),
            },
            Self::Storage(e) => kv_kind(e),
        }
    }
}

fn kv_kind(error: &KvError) -> ErrorKind {
    match error {
        KvError::UnsupportedScheme(_) | KvError::InvalidKey(_) => ErrorKind::Unsupported,
        KvError::InvalidLocation(_) => ErrorKind::Config,
        KvError::Io(_) | KvError::Backend(_) => ErrorKind::Storage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flatgit_types::ObjectId;

    #[test]
    fn kinds() {
        let missing = RepoError::from(StoreError::NotFound(ObjectId::digest(b"x")));
        assert_eq!(missing.kind(), ErrorKind::NotFound);

        let timeout = RepoError::from(LockError::Timeout {
            name: "refs".into(),
            attempts: 3,
        });
        assert_eq!(timeout.kind(), ErrorKind::LockTimeout);

        let scheme = RepoError::from(KvError::UnsupportedScheme("s3".into()));
        assert_eq!(scheme.kind(), ErrorKind::Unsupported);

        let transport = RepoError::from(RefError::Storage(KvError::Backend("503".into())));
        assert_eq!(transport.kind(), ErrorKind::Storage);

        let malformed = RepoError::from(RefError::Malformed {
            name: "HEAD".into(),
            reason: "junk".into(),
        });
        assert_eq!(malformed.kind(), ErrorKind::Corrupt);
    }
}
