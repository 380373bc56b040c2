use flatgit_repo::RepoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HelperError {
    #[error("git requested an unsupported command: {0}")]
    UnknownCommand(String),

    #[error("bad arguments for {command}: {detail}")]
    BadArguments { command: &'static str, detail: String },

    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type HelperResult<T> = Result<T, HelperError>;
