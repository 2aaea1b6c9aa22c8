use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::RpcError;
use crate::types::{JsonRpcRequest, JsonRpcResponse, PendingBlock, TxReceipt, Work};

/// Number of consecutive failures/successes that flip the sick flag; see
/// the `Upstream client` invariant in spec.md §3.
const SICK_THRESHOLD: u32 = 5;

/// Operations the rest of the proxy needs from an upstream daemon.
///
/// Kept as a trait so the classifier, template cache and payout engine can
/// be exercised against an in-memory fake without a live JSON-RPC peer.
#[async_trait]
pub trait UpstreamClient: std::fmt::Debug + Send + Sync {
    fn name(&self) -> &str;
    fn is_sick(&self) -> bool;

    async fn get_work(&self) -> Result<Work, RpcError>;
    async fn get_pending_block(&self) -> Result<Option<PendingBlock>, RpcError>;
    async fn get_block_by_height(&self, height: u64) -> Result<Option<Value>, RpcError>;
    async fn get_block_by_hash(&self, hash: &str) -> Result<Option<Value>, RpcError>;
    async fn get_uncle(&self, height: u64, index: u64) -> Result<Option<Value>, RpcError>;
    async fn get_tx_receipt(&self, hash: &str) -> Result<Option<TxReceipt>, RpcError>;
    async fn submit_block(&self, params: [String; 3]) -> Result<bool, RpcError>;
    async fn get_balance(&self, address: &str) -> Result<u128, RpcError>;
    async fn sign(&self, address: &str) -> Result<String, RpcError>;
    async fn peer_count(&self) -> Result<i64, RpcError>;
    #[allow(clippy::too_many_arguments)]
    async fn send_transaction(
        &self,
        from: &str,
        to: &str,
        gas_hex: &str,
        gas_price_hex: &str,
        value_hex: &str,
        auto_gas: bool,
    ) -> Result<String, RpcError>;

    /// Alias for [`UpstreamClient::get_work`] used only to probe liveness;
    /// success marks the client alive, any error marks it sick.
    async fn check(&self) -> bool {
        let ok = self.get_work().await.is_ok();
        ok && !self.is_sick()
    }
}

#[derive(Debug, Default)]
struct SickCounter {
    sick: bool,
    consecutive_failures: u32,
    consecutive_successes: u32,
}

impl SickCounter {
    fn mark_sick(&mut self) {
        self.consecutive_failures += 1;
        self.consecutive_successes = 0;
        if self.consecutive_failures >= SICK_THRESHOLD && !self.sick {
            self.sick = true;
            metrics::counter!("stratum_upstream_sick_transitions_total").increment(1);
        }
    }

    fn mark_alive(&mut self) {
        self.consecutive_successes += 1;
        if self.consecutive_successes >= SICK_THRESHOLD {
            self.sick = false;
            self.consecutive_failures = 0;
            self.consecutive_successes = 0;
        }
    }
}

/// A single upstream daemon reached over JSON-RPC 2.0 / HTTP.
#[derive(Debug)]
pub struct RpcClient {
    name: String,
    url: String,
    http: reqwest::Client,
    sick: Mutex<SickCounter>,
}

impl RpcClient {
    pub fn new(name: impl Into<String>, url: impl Into<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client config is static and valid");
        Self { name: name.into(), url: url.into(), http, sick: Mutex::new(SickCounter::default()) }
    }

    fn mark_sick(&self) {
        self.sick.lock().mark_sick();
    }

    fn mark_alive(&self) {
        self.sick.lock().mark_alive();
    }

    /// POSTs a JSON-RPC 2.0 envelope and decodes the `result` field.
    ///
    /// Any transport error, decode error, or non-null `error` field marks
    /// the client sick (spec.md §4.1); letting `reqwest` compute
    /// `Content-Length` itself sidesteps the stringified-length bug noted
    /// as an open question in spec.md §9.
    async fn call<P, R>(&self, method: &'static str, params: P) -> Result<R, RpcError>
    where
        P: serde::Serialize + Send,
        R: DeserializeOwned,
    {
        let req = JsonRpcRequest { jsonrpc: "2.0", method, params, id: 0 };
        let send_result = self
            .http
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .json(&req)
            .send()
            .await;

        let resp = match send_result {
            Ok(resp) => resp,
            Err(source) => {
                self.mark_sick();
                return Err(RpcError::Transport { method, source });
            }
        };

        let parsed: JsonRpcResponse<R> = match resp.json().await {
            Ok(parsed) => parsed,
            Err(source) => {
                self.mark_sick();
                return Err(RpcError::Decode { method, source });
            }
        };

        if let Some(err) = parsed.error {
            self.mark_sick();
            return Err(RpcError::Upstream { method, message: err.message });
        }

        self.mark_alive();
        parsed.result.ok_or(RpcError::EmptyResult { method })
    }
}

#[async_trait]
impl UpstreamClient for RpcClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_sick(&self) -> bool {
        self.sick.lock().sick
    }

    async fn get_work(&self) -> Result<Work, RpcError> {
        let reply: Vec<String> = self.call("eth_getWork", Vec::<String>::new()).await?;
        Ok(Work {
            header: reply.first().cloned().unwrap_or_default(),
            seed: reply.get(1).cloned().unwrap_or_default(),
            share_target: reply.get(2).cloned().unwrap_or_default(),
        })
    }

    async fn get_pending_block(&self) -> Result<Option<PendingBlock>, RpcError> {
        let params = (Value::String("pending".into()), Value::Bool(false));
        let reply: Option<PendingBlock> =
            self.call("eth_getBlockByNumber", [params.0, params.1]).await.or_else(|err| match err {
                RpcError::EmptyResult { .. } => Ok(None),
                other => Err(other),
            })?;
        Ok(reply)
    }

    async fn get_block_by_height(&self, height: u64) -> Result<Option<Value>, RpcError> {
        let params = (Value::String(format!("0x{height:x}")), Value::Bool(true));
        self.call("eth_getBlockByNumber", [params.0, params.1]).await
    }

    async fn get_block_by_hash(&self, hash: &str) -> Result<Option<Value>, RpcError> {
        let params = (Value::String(hash.to_string()), Value::Bool(true));
        self.call("eth_getBlockByHash", [params.0, params.1]).await
    }

    async fn get_uncle(&self, height: u64, index: u64) -> Result<Option<Value>, RpcError> {
        let params = [format!("0x{height:x}"), format!("0x{index:x}")];
        self.call("eth_getUncleByBlockNumberAndIndex", params).await
    }

    async fn get_tx_receipt(&self, hash: &str) -> Result<Option<TxReceipt>, RpcError> {
        self.call("eth_getTransactionReceipt", [hash.to_string()]).await
    }

    async fn submit_block(&self, params: [String; 3]) -> Result<bool, RpcError> {
        self.call("eth_submitWork", params).await
    }

    async fn get_balance(&self, address: &str) -> Result<u128, RpcError> {
        let reply: String = self.call("eth_getBalance", [address.to_string(), "latest".into()]).await?;
        parse_hex_u128(&reply).ok_or(RpcError::EmptyResult { method: "eth_getBalance" })
    }

    async fn sign(&self, address: &str) -> Result<String, RpcError> {
        // matches the original proxy signing sha256("0x0") as a liveness probe
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(b"0x0");
        let hash_hex = format!("0x{}", encode_hex(&digest));
        let reply: String = self.call("eth_sign", [address.to_string(), hash_hex]).await?;
        if is_zero_hash(&reply) {
            return Err(RpcError::Upstream {
                method: "eth_sign",
                message: "account appears to be locked".into(),
            });
        }
        Ok(reply)
    }

    async fn peer_count(&self) -> Result<i64, RpcError> {
        let reply: String = self.call("net_peerCount", ()).await?;
        let trimmed = reply.trim_start_matches("0x");
        i64::from_str_radix(trimmed, 16).map_err(|_| RpcError::EmptyResult { method: "net_peerCount" })
    }

    async fn send_transaction(
        &self,
        from: &str,
        to: &str,
        gas_hex: &str,
        gas_price_hex: &str,
        value_hex: &str,
        auto_gas: bool,
    ) -> Result<String, RpcError> {
        let mut params = serde_json::Map::new();
        params.insert("from".into(), Value::String(from.into()));
        params.insert("to".into(), Value::String(to.into()));
        params.insert("value".into(), Value::String(value_hex.into()));
        if !auto_gas {
            params.insert("gas".into(), Value::String(gas_hex.into()));
            params.insert("gasPrice".into(), Value::String(gas_price_hex.into()));
        }
        let reply: String = self.call("eth_sendTransaction", [Value::Object(params)]).await?;
        // Parity returns an all-zero hash instead of an error when the
        // signer account is locked or the send is otherwise refused.
        if is_zero_hash(&reply) {
            return Err(RpcError::TransactionNotYetAvailable);
        }
        Ok(reply)
    }
}

fn encode_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

fn is_zero_hash(hash: &str) -> bool {
    let trimmed = hash.trim_start_matches("0x");
    !trimmed.is_empty() && trimmed.chars().all(|c| c == '0')
}

fn parse_hex_u128(value: &str) -> Option<u128> {
    u128::from_str_radix(value.trim_start_matches("0x"), 16).ok()
}

pub type SharedUpstream = Arc<dyn UpstreamClient>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sick_counter_flips_after_five_failures() {
        let mut c = SickCounter::default();
        for _ in 0..4 {
            c.mark_sick();
            assert!(!c.sick);
        }
        c.mark_sick();
        assert!(c.sick);
    }

    #[test]
    fn sick_counter_clears_after_five_successes() {
        let mut c = SickCounter::default();
        for _ in 0..5 {
            c.mark_sick();
        }
        assert!(c.sick);
        for _ in 0..4 {
            c.mark_alive();
            assert!(c.sick);
        }
        c.mark_alive();
        assert!(!c.sick);
        assert_eq!(c.consecutive_failures, 0);
        assert_eq!(c.consecutive_successes, 0);
    }

    #[test]
    fn zero_hash_detection() {
        assert!(is_zero_hash("0x0000000000000000000000000000000000000000000000000000000000000000"));
        assert!(is_zero_hash("0x0"));
        assert!(!is_zero_hash("0xdeadbeef"));
    }
}
