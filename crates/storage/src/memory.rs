use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::backend::Backend;
use crate::error::StorageError;
use crate::types::{BlockRecord, PendingPayment, ShareRecord};

#[derive(Debug, Default)]
struct State {
    balances: HashMap<String, i64>,
    pending_payments: HashMap<String, PendingPayment>,
    payouts_locked: bool,
    share_keys: HashSet<(String, String)>,
    block_keys: HashSet<(String, String)>,
    shares_written: u64,
    blocks_written: u64,
}

/// An in-memory `Backend`, standing in for the real KV store in tests and
/// for standalone runs without a configured production backend. Mirrors
/// the split the teacher draws between `reth-storage-api` (trait) and a
/// concrete provider: this is the provider side, kept intentionally
/// minimal since the real store is an external collaborator.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a balance for tests exercising the payout engine.
    pub fn set_balance(&self, login: &str, amount: i64) {
        self.state.lock().balances.insert(login.to_string(), amount);
    }

    pub fn shares_written(&self) -> u64 {
        self.state.lock().shares_written
    }

    pub fn blocks_written(&self) -> u64 {
        self.state.lock().blocks_written
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn get_pending_payments(&self) -> Result<Vec<PendingPayment>, StorageError> {
        Ok(self.state.lock().pending_payments.values().cloned().collect())
    }

    async fn is_payouts_locked(&self) -> Result<bool, StorageError> {
        Ok(self.state.lock().payouts_locked)
    }

    async fn get_payees(&self) -> Result<Vec<String>, StorageError> {
        let mut payees: Vec<String> = self.state.lock().balances.keys().cloned().collect();
        payees.sort();
        Ok(payees)
    }

    async fn get_balance(&self, login: &str) -> Result<i64, StorageError> {
        Ok(*self.state.lock().balances.get(login).unwrap_or(&0))
    }

    async fn lock_payouts(&self, login: &str, amount: i64) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        if state.pending_payments.contains_key(login) {
            return Err(StorageError::PayoutsLocked);
        }
        state.pending_payments.insert(
            login.to_string(),
            PendingPayment { login: login.to_string(), amount, timestamp_unix: now_unix() },
        );
        state.payouts_locked = true;
        tracing::debug!(%login, amount, "payout locked");
        Ok(())
    }

    async fn update_balance(&self, login: &str, delta: i64) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        let balance = state.balances.entry(login.to_string()).or_insert(0);
        *balance += delta;
        Ok(())
    }

    async fn write_payment(&self, login: &str, _tx_hash: &str, _amount: i64) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        if state.pending_payments.remove(login).is_none() {
            return Err(StorageError::NoPendingPayment { login: login.to_string() });
        }
        if state.pending_payments.is_empty() {
            state.payouts_locked = false;
        }
        Ok(())
    }

    async fn rollback_balance(&self, login: &str, amount: i64) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        let balance = state.balances.entry(login.to_string()).or_insert(0);
        *balance += amount;
        state.pending_payments.remove(login);
        tracing::warn!(%login, amount, "payout rolled back");
        Ok(())
    }

    async fn unlock_payouts(&self) -> Result<(), StorageError> {
        self.state.lock().payouts_locked = false;
        Ok(())
    }

    async fn bg_save(&self) -> Result<String, StorageError> {
        Ok("OK".to_string())
    }

    async fn write_node_state(&self, _name: &str, _height: u64, _difficulty: i64) -> Result<(), StorageError> {
        Ok(())
    }

    async fn write_share(&self, record: ShareRecord) -> Result<bool, StorageError> {
        let mut state = self.state.lock();
        let key = (record.params.header_hash.clone(), record.params.nonce.clone());
        if !state.share_keys.insert(key) {
            return Ok(true);
        }
        state.shares_written += 1;
        Ok(false)
    }

    async fn write_block(&self, record: BlockRecord) -> Result<bool, StorageError> {
        let mut state = self.state.lock();
        let key = (record.params.header_hash.clone(), record.params.nonce.clone());
        if !state.block_keys.insert(key) {
            return Ok(true);
        }
        state.blocks_written += 1;
        Ok(false)
    }
}

fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ShareParams;
    use std::time::Duration;

    fn params(nonce: &str, header: &str) -> ShareParams {
        ShareParams { nonce: nonce.into(), header_hash: header.into(), mix_digest: "0xmix".into() }
    }

    #[tokio::test]
    async fn write_share_twice_reports_duplicate() {
        let backend = MemoryBackend::new();
        let record = ShareRecord {
            login: "0xabc".into(),
            worker: "0".into(),
            params: params("0x1", "0xhead"),
            share_difficulty: 1,
            height: 10,
            hashrate_expiration: Duration::from_secs(60),
        };
        let first = backend.write_share(record.clone()).await.unwrap();
        let second = backend.write_share(record).await.unwrap();
        assert!(!first);
        assert!(second);
        assert_eq!(backend.shares_written(), 1);
    }

    #[tokio::test]
    async fn lock_payouts_then_write_payment_clears_pending() {
        let backend = MemoryBackend::new();
        backend.set_balance("0xabc", 100);
        backend.lock_payouts("0xabc", 100).await.unwrap();
        assert!(backend.is_payouts_locked().await.unwrap());
        assert!(backend.lock_payouts("0xabc", 100).await.is_err());
        backend.write_payment("0xabc", "0xtx", 100).await.unwrap();
        assert!(backend.get_pending_payments().await.unwrap().is_empty());
        assert!(!backend.is_payouts_locked().await.unwrap());
    }

    #[tokio::test]
    async fn rollback_credits_balance_and_clears_pending() {
        let backend = MemoryBackend::new();
        backend.set_balance("0xabc", 0);
        backend.lock_payouts("0xabc", 50).await.unwrap();
        backend.update_balance("0xabc", -50).await.unwrap();
        assert_eq!(backend.get_balance("0xabc").await.unwrap(), -50);
        backend.rollback_balance("0xabc", 50).await.unwrap();
        assert_eq!(backend.get_balance("0xabc").await.unwrap(), 0);
        assert!(backend.get_pending_payments().await.unwrap().is_empty());
    }
}
