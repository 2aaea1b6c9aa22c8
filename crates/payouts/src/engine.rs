//! The payout engine (C7): a sequential state machine that locks, debits,
//! transmits and confirms on-chain payments while preserving an
//! at-most-once-payment invariant, grounded in
//! `examples/original_source/server/payouts/payer.go` (`PayoutsProcessor`).

use std::time::Duration;

use stratum_rpc::{SharedUpstream, UpstreamClient};
use stratum_storage::{Backend, SharedBackend};

use crate::config::PayoutsConfig;
use crate::error::PayoutError;

/// 1 shannon = 10^9 wei, the unit `GetBalance`/`UpdateBalance` operate in.
const SHANNON_TO_WEI: u128 = 1_000_000_000;
const TX_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Owns the halt latch and last-failure reason (spec.md §5: "no locking
/// needed, only the payout task writes them" — enforced here by giving
/// the engine a single owning task via `run`, never shared behind an
/// `Arc`).
pub struct PayoutEngine {
    config: PayoutsConfig,
    backend: SharedBackend,
    upstream: SharedUpstream,
    halt: bool,
    last_fail: Option<String>,
}

impl PayoutEngine {
    pub fn new(config: PayoutsConfig, backend: SharedBackend, upstream: SharedUpstream) -> Self {
        Self { config, backend, upstream, halt: false, last_fail: None }
    }

    /// `Start`/`resolvePayouts` combined: `resolve_mode` mirrors the
    /// `RESOLVE_PAYOUT` environment variable (spec.md §4.7).
    pub async fn run(mut self, resolve_mode: bool) -> Result<(), PayoutError> {
        if resolve_mode {
            tracing::info!("RESOLVE_PAYOUT set, resolving locked payouts");
            self.resolve().await?;
            tracing::info!("restart with RESOLVE_PAYOUT unset to resume normal payouts");
            return Ok(());
        }

        if !self.config.enabled {
            tracing::info!("payouts disabled");
            return Ok(());
        }

        let pending = self.backend.get_pending_payments().await?;
        if !pending.is_empty() {
            tracing::error!(
                count = pending.len(),
                "previous payout run left pending payments, refusing to start; run with RESOLVE_PAYOUT=1"
            );
            return Ok(());
        }
        if self.backend.is_payouts_locked().await? {
            tracing::error!("payouts are locked, refusing to start");
            return Ok(());
        }

        let mut ticker = tokio::time::interval(self.config.interval);
        loop {
            ticker.tick().await;
            self.process_pass().await;
        }
    }

    /// One pass over every payee, per spec.md §4.7 steps 1-10.
    async fn process_pass(&mut self) {
        if self.halt {
            tracing::error!(last_fail = self.last_fail.as_deref(), "payouts suspended due to a prior critical error");
            return;
        }

        let payees = match self.backend.get_payees().await {
            Ok(payees) => payees,
            Err(err) => {
                tracing::error!(error = %err, "failed to load payees");
                return;
            }
        };

        let mut must_pay = 0u64;
        let mut paid = 0u64;
        let mut total: i64 = 0;

        for login in payees {
            let balance = match self.backend.get_balance(&login).await {
                Ok(balance) => balance,
                Err(err) => {
                    tracing::error!(error = %err, %login, "failed to load balance");
                    continue;
                }
            };
            if balance <= self.config.threshold {
                continue;
            }
            must_pay += 1;

            if !self.check_peers().await {
                break;
            }
            if !self.is_unlocked_account().await {
                break;
            }

            let amount_wei = (balance as u128) * SHANNON_TO_WEI;
            let pool_balance = match self.upstream.get_balance(&self.config.address).await {
                Ok(balance) => balance,
                Err(err) => {
                    self.latch(err.to_string());
                    break;
                }
            };
            if pool_balance < amount_wei {
                self.latch(format!("insufficient pool balance: need {amount_wei} wei, have {pool_balance} wei"));
                break;
            }

            if let Err(err) = self.backend.lock_payouts(&login, balance).await {
                self.latch(err.to_string());
                break;
            }
            tracing::info!(%login, amount = balance, "locked payout");

            if let Err(err) = self.backend.update_balance(&login, -balance).await {
                self.latch(err.to_string());
                break;
            }

            let value_hex = format!("0x{amount_wei:x}");
            let tx_hash = match self
                .upstream
                .send_transaction(
                    &self.config.address,
                    &login,
                    &self.config.gas_hex,
                    &self.config.gas_price_hex,
                    &value_hex,
                    self.config.auto_gas,
                )
                .await
            {
                Ok(tx_hash) => tx_hash,
                Err(err) => {
                    self.latch(err.to_string());
                    break;
                }
            };

            if let Err(err) = self.backend.write_payment(&login, &tx_hash, balance).await {
                self.latch(err.to_string());
                break;
            }

            paid += 1;
            total += balance;
            tracing::info!(%login, amount = balance, tx = %tx_hash, "payout sent");

            self.await_confirmation(&tx_hash).await;
            tracing::info!(%login, tx = %tx_hash, "payout confirmed");
        }

        if must_pay > 0 {
            tracing::info!(paid, must_pay, total, "payout pass complete");
            metrics::counter!("stratum_payout_passes_total").increment(1);
            metrics::counter!("stratum_payouts_sent_total").increment(paid);
            metrics::counter!("stratum_payout_shannon_total").increment(total.max(0) as u64);
        } else {
            tracing::debug!("no payees have reached the payout threshold");
        }

        if paid > 0 && self.config.bg_save {
            self.bg_save().await;
        }
    }

    /// Polls every 5 seconds until a receipt with a non-empty `blockHash`
    /// appears. No deadline: this intentionally blocks the payout task
    /// until the chain observes the transaction (spec.md §5).
    async fn await_confirmation(&self, tx_hash: &str) {
        loop {
            tokio::time::sleep(TX_CHECK_INTERVAL).await;
            match self.upstream.get_tx_receipt(tx_hash).await {
                Ok(Some(receipt)) if receipt.confirmed() => return,
                Ok(_) => {}
                Err(err) => tracing::warn!(tx = tx_hash, error = %err, "failed to fetch tx receipt, retrying"),
            }
        }
    }

    async fn check_peers(&self) -> bool {
        match self.upstream.peer_count().await {
            Ok(count) if count >= self.config.require_peers => true,
            Ok(count) => {
                tracing::warn!(peers = count, required = self.config.require_peers, "not enough peers, deferring payouts");
                false
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to fetch peer count");
                false
            }
        }
    }

    async fn is_unlocked_account(&self) -> bool {
        match self.upstream.sign(&self.config.address).await {
            Ok(_) => true,
            Err(err) => {
                tracing::warn!(error = %err, "signing account is locked or unreachable");
                false
            }
        }
    }

    fn latch(&mut self, reason: String) {
        tracing::error!(reason = %reason, "payout engine halted, operator must restart (and possibly resolve)");
        self.halt = true;
        self.last_fail = Some(reason);
    }

    async fn bg_save(&self) {
        match self.backend.bg_save().await {
            Ok(result) => tracing::info!(%result, "backend state saved"),
            Err(err) => tracing::error!(error = %err, "bg_save failed"),
        }
    }

    /// Credits every pending payment back, then unlocks payouts. Stops at
    /// the first error (spec.md §4.7 "Resolve mode").
    async fn resolve(&self) -> Result<(), PayoutError> {
        let pending = self.backend.get_pending_payments().await?;
        if pending.is_empty() {
            tracing::warn!("no pending payments to resolve");
        } else {
            for payment in &pending {
                self.backend.rollback_balance(&payment.login, payment.amount).await?;
                tracing::info!(login = %payment.login, amount = payment.amount, "credited back");
            }
            self.backend.unlock_payouts().await?;
        }

        if self.config.bg_save {
            self.bg_save().await;
        }
        tracing::info!("payouts unlocked");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use stratum_rpc::test_support::FakeUpstream;
    use stratum_storage::{Backend, MemoryBackend};

    fn config() -> PayoutsConfig {
        PayoutsConfig { enabled: true, threshold: 100, require_peers: 1, address: "0xpool".into(), ..Default::default() }
    }

    #[tokio::test]
    async fn pass_pays_miners_above_threshold_and_confirms() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_balance("0xabc", 500);
        backend.set_balance("0xdef", 50); // below threshold, skipped
        let upstream = Arc::new(FakeUpstream::new("u0"));

        let mut engine = PayoutEngine::new(config(), backend.clone(), upstream.clone());
        engine.process_pass().await;

        assert_eq!(backend.get_balance("0xabc").await.unwrap(), 0);
        assert_eq!(backend.get_balance("0xdef").await.unwrap(), 50);
        assert!(backend.get_pending_payments().await.unwrap().is_empty());
        assert!(!backend.is_payouts_locked().await.unwrap());
    }

    #[tokio::test]
    async fn insufficient_pool_balance_halts_and_leaves_pending_payment_clear() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_balance("0xabc", 500);
        let upstream = Arc::new(FakeUpstream::new("u0"));
        upstream.set_balance(0);

        let mut engine = PayoutEngine::new(config(), backend.clone(), upstream);
        engine.process_pass().await;

        assert!(engine.halt);
        assert_eq!(backend.get_balance("0xabc").await.unwrap(), 500);
        assert!(backend.get_pending_payments().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn locked_account_defers_the_pass_without_halting() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_balance("0xabc", 500);
        let upstream = Arc::new(FakeUpstream::new("u0"));
        upstream.set_sign_result(Err("account locked".into()));

        let mut engine = PayoutEngine::new(config(), backend.clone(), upstream);
        engine.process_pass().await;

        assert!(!engine.halt);
        assert_eq!(backend.get_balance("0xabc").await.unwrap(), 500);
    }

    #[tokio::test]
    async fn send_transaction_failure_halts_after_debit() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_balance("0xabc", 500);
        let upstream = Arc::new(FakeUpstream::new("u0"));
        upstream.set_send_transaction_result(Err("nonce too low".into()));

        let mut engine = PayoutEngine::new(config(), backend.clone(), upstream);
        engine.process_pass().await;

        assert!(engine.halt);
        // debited but never paid: backend now carries exactly one pending payment
        assert_eq!(backend.get_balance("0xabc").await.unwrap(), 0);
        assert_eq!(backend.get_pending_payments().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn resolve_credits_back_pending_payments_and_unlocks() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_balance("0xabc", 500);
        let upstream = Arc::new(FakeUpstream::new("u0"));
        upstream.set_send_transaction_result(Err("down".into()));

        let mut engine = PayoutEngine::new(config(), backend.clone(), upstream.clone());
        engine.process_pass().await;
        assert!(engine.halt);

        let resolver = PayoutEngine::new(config(), backend.clone(), upstream);
        resolver.resolve().await.unwrap();

        assert_eq!(backend.get_balance("0xabc").await.unwrap(), 500);
        assert!(backend.get_pending_payments().await.unwrap().is_empty());
        assert!(!backend.is_payouts_locked().await.unwrap());
    }
}
