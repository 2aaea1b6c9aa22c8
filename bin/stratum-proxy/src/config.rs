//! Root config file shape: the proxy config, the upstream daemon list,
//! and the payout engine config, loaded from one TOML file.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use stratum_payouts::PayoutsConfig;
use stratum_proxy_core::ProxyConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub name: String,
    pub url: String,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self { name: "main".into(), url: "http://127.0.0.1:8545".into(), timeout: Duration::from_secs(10) }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RootConfig {
    pub proxy: ProxyConfig,
    pub upstreams: Vec<UpstreamConfig>,
    pub payouts: PayoutsConfig,
}

impl Default for RootConfig {
    fn default() -> Self {
        Self { proxy: ProxyConfig::default(), upstreams: vec![UpstreamConfig::default()], payouts: PayoutsConfig::default() }
    }
}
