use async_trait::async_trait;

use crate::error::StorageError;
use crate::types::{BlockRecord, PendingPayment, ShareRecord};

/// Everything the proxy and payout engine need from the persistent
/// key/value store, per spec.md §6. The store's own transactional
/// primitives are out of scope (spec.md §1); this is purely the contract.
#[async_trait]
pub trait Backend: std::fmt::Debug + Send + Sync {
    async fn get_pending_payments(&self) -> Result<Vec<PendingPayment>, StorageError>;
    async fn is_payouts_locked(&self) -> Result<bool, StorageError>;
    async fn get_payees(&self) -> Result<Vec<String>, StorageError>;
    async fn get_balance(&self, login: &str) -> Result<i64, StorageError>;

    /// Atomically inserts the pending-payment record and marks payouts
    /// locked. Fails if a pending payment already exists for `login`.
    async fn lock_payouts(&self, login: &str, amount: i64) -> Result<(), StorageError>;
    async fn update_balance(&self, login: &str, delta: i64) -> Result<(), StorageError>;

    /// Records the broadcast transaction and clears the pending-payment
    /// record for `login`.
    async fn write_payment(&self, login: &str, tx_hash: &str, amount: i64) -> Result<(), StorageError>;
    async fn rollback_balance(&self, login: &str, amount: i64) -> Result<(), StorageError>;
    async fn unlock_payouts(&self) -> Result<(), StorageError>;
    async fn bg_save(&self) -> Result<String, StorageError>;

    async fn write_node_state(&self, name: &str, height: u64, difficulty: i64) -> Result<(), StorageError>;

    /// Returns `exists = true` if a row for this (header, nonce) was
    /// already present — the classifier's "duplicate" outcome.
    async fn write_share(&self, record: ShareRecord) -> Result<bool, StorageError>;
    async fn write_block(&self, record: BlockRecord) -> Result<bool, StorageError>;
}

pub type SharedBackend = std::sync::Arc<dyn Backend>;
