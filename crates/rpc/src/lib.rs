//! Upstream JSON-RPC client (C1) and failover pool (C2).
//!
//! The client speaks the subset of the `eth_*`/`net_*` JSON-RPC surface
//! this proxy needs (spec.md §6). The pool multiplexes a fixed set of
//! clients behind a single atomic "active" index so the hot read path
//! never blocks on the periodic health check.

pub mod client;
pub mod error;
pub mod pool;
pub mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use client::{RpcClient, SharedUpstream, UpstreamClient};
pub use error::RpcError;
pub use pool::UpstreamPool;
pub use types::{PendingBlock, TxReceipt, Work};
