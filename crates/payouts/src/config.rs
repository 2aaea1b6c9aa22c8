//! Payout engine configuration (spec.md §4.7 / SPEC_FULL.md §1 ambient
//! config section). Mirrors `PayoutsConfig` in
//! `examples/original_source/server/payouts/payer.go`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PayoutsConfig {
    pub enabled: bool,
    pub require_peers: i64,
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    pub address: String,
    pub gas_hex: String,
    pub gas_price_hex: String,
    pub auto_gas: bool,
    /// Minimum balance (shannon) a miner must exceed before a pass pays
    /// them out.
    pub threshold: i64,
    pub bg_save: bool,
}

impl Default for PayoutsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            require_peers: 1,
            interval: Duration::from_secs(600),
            address: String::new(),
            gas_hex: "0x493e0".into(),
            gas_price_hex: "0x2540be400".into(),
            auto_gas: true,
            threshold: 2_000_000_000,
            bg_save: false,
        }
    }
}
