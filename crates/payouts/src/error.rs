use stratum_rpc::RpcError;
use stratum_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PayoutError {
    #[error("backend error: {0}")]
    Storage(#[from] StorageError),
    #[error("upstream error: {0}")]
    Upstream(#[from] RpcError),
}
