//! Error types for gridq.
//!
//! The drain loop treats these very differently: transport failures are
//! retried, malformed payloads follow the configured policy, and everything
//! else ends the process.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    /// The queue store could not be reached at startup.
    #[error("queue store connection failed: {0}")]
    Connection(String),

    /// A queue operation failed mid-run (network blip, pool exhaustion).
    #[error("queue store operation failed: {0}")]
    Transport(String),

    /// The store answered, but with a reply of the wrong shape. Retrying
    /// the same command would get the same answer.
    #[error("unexpected queue store reply: {0}")]
    Reply(String),

    #[error("malformed work item: {payload:?}")]
    Malformed { payload: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the drain loop should pause and retry after this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        match err.kind() {
            redis::ErrorKind::TypeError => Error::Reply(err.to_string()),
            _ => Error::Transport(err.to_string()),
        }
    }
}

impl From<deadpool_redis::PoolError> for Error {
    fn from(err: deadpool_redis::PoolError) -> Self {
        Error::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
