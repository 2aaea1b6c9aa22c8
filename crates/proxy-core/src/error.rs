use stratum_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("writing share record: {0}")]
    Backend(#[from] StorageError),
    #[error("malformed share submission: {0}")]
    Malformed(&'static str),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("session not registered")]
    NotSubscribed,
}
