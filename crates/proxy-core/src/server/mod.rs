//! Miner front-ends (C6): the HTTP JSON-RPC surface (`http`) and the
//! line-delimited stratum TCP surface (`stratum`), grounded in
//! `examples/original_source/server/proxy/{proxy,stratum}.go`.

pub mod http;
pub mod stratum;

use crate::protocol::{JsonRpcRequest, JsonRpcResponse};
use crate::share::ShareSubmission;
use crate::validate::{is_valid_hash, is_valid_nonce};
use serde_json::Value;

/// Splits a pipelined request body into individual JSON-RPC requests.
/// Mirrors the original's `json.NewDecoder(r.Body)` loop: stops at the
/// first malformed frame rather than erroring the whole batch.
pub(crate) fn decode_requests(body: &[u8]) -> Vec<JsonRpcRequest> {
    let mut out = Vec::new();
    let mut stream = serde_json::Deserializer::from_slice(body).into_iter::<JsonRpcRequest>();
    for item in &mut stream {
        match item {
            Ok(request) => out.push(request),
            Err(err) => {
                tracing::warn!(error = %err, "malformed JSON-RPC request, stopping batch");
                break;
            }
        }
    }
    out
}

pub(crate) fn request_id(request: &JsonRpcRequest) -> Value {
    request.id.clone().unwrap_or(Value::Null)
}

/// Parses and validates `eth_submitWork`'s `[nonce, header, mix]` params,
/// shared by the HTTP and stratum front-ends.
pub(crate) fn parse_submit_params(params: Option<Value>) -> Option<ShareSubmission> {
    let values = params?;
    let array = values.as_array()?;
    let [nonce, header, mix] = <[Value; 3]>::try_from(array.clone()).ok()?;
    let nonce = nonce.as_str()?.to_string();
    let header = header.as_str()?.to_string();
    let mix = mix.as_str()?.to_string();
    if !is_valid_nonce(&nonce) || !is_valid_hash(&header) || !is_valid_hash(&mix) {
        return None;
    }
    Some(ShareSubmission { nonce_hex: nonce, header_hex: header, mix_hex: mix })
}

pub(crate) fn encode_responses(responses: &[JsonRpcResponse]) -> Vec<u8> {
    let mut out = Vec::new();
    for response in responses {
        if let Ok(mut line) = serde_json::to_vec(response) {
            out.append(&mut line);
            out.push(b'\n');
        }
    }
    out
}
