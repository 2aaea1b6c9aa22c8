//! In-memory fake upstream, standing in for a live JSON-RPC daemon in
//! tests across this workspace (mirrors the teacher's `test_utils`
//! modules, e.g. `interfaces/src/test_utils/api.rs`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::client::UpstreamClient;
use crate::error::RpcError;
use crate::types::{PendingBlock, TxReceipt, Work};

/// A scriptable upstream: health, `get_work` payload, and `submit_block`
/// outcome are all controllable from the test, and every call is counted
/// so tests can assert on call order (e.g. "submit_block happens exactly
/// once before any backend write").
#[derive(Debug)]
pub struct FakeUpstream {
    pub label: &'static str,
    healthy: AtomicBool,
    work: Mutex<Work>,
    pending_block: Mutex<Option<PendingBlock>>,
    submit_block_result: Mutex<Result<bool, String>>,
    pub submit_block_calls: Mutex<Vec<[String; 3]>>,
    balance: Mutex<u128>,
    peer_count: Mutex<i64>,
    sign_result: Mutex<Result<(), String>>,
    send_transaction_result: Mutex<Result<String, String>>,
    tx_receipt: Mutex<Option<TxReceipt>>,
}

impl FakeUpstream {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            healthy: AtomicBool::new(true),
            work: Mutex::new(Work::default()),
            pending_block: Mutex::new(Some(PendingBlock { number: "0x1".into(), difficulty: "0x1".into() })),
            submit_block_result: Mutex::new(Ok(true)),
            submit_block_calls: Mutex::new(Vec::new()),
            balance: Mutex::new(u128::MAX / 2),
            peer_count: Mutex::new(25),
            sign_result: Mutex::new(Ok(())),
            send_transaction_result: Mutex::new(Ok("0xdeadbeef".into())),
            tx_receipt: Mutex::new(Some(TxReceipt { tx_hash: "0xabc".into(), block_hash: "0xblock".into() })),
        }
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn set_work(&self, work: Work) {
        *self.work.lock().unwrap() = work;
    }

    pub fn set_pending_block(&self, pending: PendingBlock) {
        *self.pending_block.lock().unwrap() = Some(pending);
    }

    pub fn set_submit_block_result(&self, result: Result<bool, String>) {
        *self.submit_block_result.lock().unwrap() = result;
    }

    pub fn set_balance(&self, wei: u128) {
        *self.balance.lock().unwrap() = wei;
    }

    pub fn set_peer_count(&self, count: i64) {
        *self.peer_count.lock().unwrap() = count;
    }

    pub fn set_sign_result(&self, result: Result<(), String>) {
        *self.sign_result.lock().unwrap() = result;
    }

    pub fn set_send_transaction_result(&self, result: Result<String, String>) {
        *self.send_transaction_result.lock().unwrap() = result;
    }

    pub fn set_tx_receipt(&self, receipt: Option<TxReceipt>) {
        *self.tx_receipt.lock().unwrap() = receipt;
    }
}

#[async_trait]
impl UpstreamClient for FakeUpstream {
    fn name(&self) -> &str {
        self.label
    }

    fn is_sick(&self) -> bool {
        !self.healthy.load(Ordering::SeqCst)
    }

    async fn get_work(&self) -> Result<Work, RpcError> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(self.work.lock().unwrap().clone())
        } else {
            Err(RpcError::EmptyResult { method: "eth_getWork" })
        }
    }

    async fn get_pending_block(&self) -> Result<Option<PendingBlock>, RpcError> {
        Ok(self.pending_block.lock().unwrap().clone())
    }

    async fn get_block_by_height(&self, _height: u64) -> Result<Option<Value>, RpcError> {
        Ok(None)
    }

    async fn get_block_by_hash(&self, _hash: &str) -> Result<Option<Value>, RpcError> {
        Ok(None)
    }

    async fn get_uncle(&self, _height: u64, _index: u64) -> Result<Option<Value>, RpcError> {
        Ok(None)
    }

    async fn get_tx_receipt(&self, _hash: &str) -> Result<Option<TxReceipt>, RpcError> {
        Ok(self.tx_receipt.lock().unwrap().clone())
    }

    async fn submit_block(&self, params: [String; 3]) -> Result<bool, RpcError> {
        self.submit_block_calls.lock().unwrap().push(params.clone());
        match &*self.submit_block_result.lock().unwrap() {
            Ok(v) => Ok(*v),
            Err(msg) => Err(RpcError::Upstream { method: "eth_submitWork", message: msg.clone() }),
        }
    }

    async fn get_balance(&self, _address: &str) -> Result<u128, RpcError> {
        Ok(*self.balance.lock().unwrap())
    }

    async fn sign(&self, address: &str) -> Result<String, RpcError> {
        match &*self.sign_result.lock().unwrap() {
            Ok(()) => Ok("0x1".into()),
            Err(msg) => Err(RpcError::Upstream { method: "personal_sign", message: format!("{msg} ({address})") }),
        }
    }

    async fn peer_count(&self) -> Result<i64, RpcError> {
        Ok(*self.peer_count.lock().unwrap())
    }

    async fn send_transaction(
        &self,
        _from: &str,
        _to: &str,
        _gas_hex: &str,
        _gas_price_hex: &str,
        _value_hex: &str,
        _auto_gas: bool,
    ) -> Result<String, RpcError> {
        match &*self.send_transaction_result.lock().unwrap() {
            Ok(hash) => Ok(hash.clone()),
            Err(msg) => Err(RpcError::Upstream { method: "eth_sendTransaction", message: msg.clone() }),
        }
    }

    async fn check(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }
}
