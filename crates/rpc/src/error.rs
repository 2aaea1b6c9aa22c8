use thiserror::Error;

/// Errors surfaced by a single upstream JSON-RPC call.
///
/// Any variant here marks the originating [`RpcClient`](crate::client::RpcClient)
/// sick via its rolling failure counter; see §3 of the spec for the
/// exact counter rule.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("transport error calling {method}: {source}")]
    Transport {
        method: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to decode response for {method}: {source}")]
    Decode {
        method: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("upstream returned error for {method}: {message}")]
    Upstream { method: &'static str, message: String },
    #[error("transaction is not yet available")]
    TransactionNotYetAvailable,
    #[error("empty result for {method}")]
    EmptyResult { method: &'static str },
}
