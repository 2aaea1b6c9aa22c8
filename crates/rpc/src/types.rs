use serde::{Deserialize, Serialize};

/// `eth_getBlockByNumber("pending", false)` response, the fields this
/// proxy actually reads (number, difficulty) plus the ones re-served
/// verbatim to miners via `eth_getBlockByNumber`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PendingBlock {
    pub number: String,
    pub difficulty: String,
}

/// `eth_getTransactionReceipt` response, trimmed to what the payout
/// confirmation loop needs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TxReceipt {
    #[serde(rename = "transactionHash")]
    pub tx_hash: String,
    #[serde(rename = "blockHash", default)]
    pub block_hash: String,
}

impl TxReceipt {
    /// A receipt is only meaningful once it has been included in a block.
    pub fn confirmed(&self) -> bool {
        !self.block_hash.is_empty()
    }
}

/// The three-tuple `eth_getWork` returns: header, seed hash, share target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Work {
    pub header: String,
    pub seed: String,
    pub share_target: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonRpcRequest<'a, P> {
    pub jsonrpc: &'static str,
    pub method: &'a str,
    pub params: P,
    pub id: u32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JsonRpcResponse<R> {
    #[allow(dead_code)]
    pub id: Option<serde_json::Value>,
    pub result: Option<R>,
    pub error: Option<JsonRpcErrorObject>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JsonRpcErrorObject {
    #[allow(dead_code)]
    pub code: i64,
    pub message: String,
}
