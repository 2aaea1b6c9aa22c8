//! JSON-RPC 2.0 framing shared by the HTTP and stratum front-ends
//! (spec.md §6), and the fixed error-reply codes of spec.md §4.6/§6.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request as received from either transport. `worker` is stratum-only
/// (`eth_submitLogin`/`mining.subscribe` carry it alongside `params`).
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub worker: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub id: Value,
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReply>,
}

impl JsonRpcResponse {
    pub fn result(id: Value, result: Value) -> Self {
        Self { id, jsonrpc: "2.0", result: Some(result), error: None }
    }

    pub fn error(id: Value, error: ErrorReply) -> Self {
        Self { id, jsonrpc: "2.0", result: None, error: Some(error) }
    }
}

/// The unsolicited job push sent to stratum sessions. The id is pinned to
/// `0` for Claymore-style miner compatibility, per spec.md §6.
#[derive(Debug, Clone, Serialize)]
pub struct JsonPushMessage {
    pub id: u32,
    pub jsonrpc: &'static str,
    pub result: [String; 3],
}

impl JsonPushMessage {
    pub fn new(header: String, seed: String, share_target: String) -> Self {
        Self { id: 0, jsonrpc: "2.0", result: [header, seed, share_target] }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReply {
    pub code: i32,
    pub message: &'static str,
}

impl ErrorReply {
    pub const fn new(code: i32, message: &'static str) -> Self {
        Self { code, message }
    }
}

pub const INVALID_PARAMS: ErrorReply = ErrorReply::new(-1, "Invalid params");
pub const MALFORMED_POW: ErrorReply = ErrorReply::new(-1, "Malformed PoW result");
pub const INVALID_LOGIN: ErrorReply = ErrorReply::new(-1, "Invalid login");
pub const BLACKLISTED: ErrorReply = ErrorReply::new(-1, "You are blacklisted");
pub const HIGH_INVALID_RATE: ErrorReply = ErrorReply::new(-1, "High rate of invalid shares");
pub const METHOD_NOT_FOUND: ErrorReply = ErrorReply::new(-3, "Method not found");
pub const WORK_NOT_READY: ErrorReply = ErrorReply::new(0, "Work not ready");
pub const DUPLICATE_SHARE: ErrorReply = ErrorReply::new(22, "Duplicate share");
pub const INVALID_SHARE: ErrorReply = ErrorReply::new(23, "Invalid share");
pub const NOT_SUBSCRIBED: ErrorReply = ErrorReply::new(25, "Not subscribed");
