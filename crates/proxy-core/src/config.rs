//! Proxy-wide configuration (spec.md §2/§9 plus the ambient config section
//! of SPEC_FULL.md §1). Mirrors the teacher's `bin/reth` config structs:
//! `serde` derives with explicit defaults, durations via `humantime_serde`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Written into `WriteNodeState` calls and startup logs (`cfg.Name`
    /// in the original).
    pub name: String,

    /// Per-miner share difficulty, encoded as a hex big-int and spliced
    /// into `eth_getBlockByNumber` replies (spec.md §4.3 step 5).
    pub share_difficulty: u64,

    /// Number of prior backlog entries retained beyond the current
    /// template (spec.md §3: `maxBacklog=3`).
    pub max_backlog: u64,

    #[serde(with = "humantime_serde")]
    pub block_refresh_interval: Duration,

    #[serde(with = "humantime_serde")]
    pub upstream_check_interval: Duration,

    /// Node-state heartbeat period (SPEC_FULL.md §2, "Node-state
    /// heartbeat").
    #[serde(with = "humantime_serde")]
    pub state_update_interval: Duration,

    pub health_check_enabled: bool,
    pub max_fails: i64,

    pub limit_body_size: usize,
    pub limit_headers_size: usize,
    pub behind_reverse_proxy: bool,

    pub http_listen_addr: String,

    pub stratum: StratumConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            name: "stratum-proxy".into(),
            share_difficulty: 2_000_000_000,
            max_backlog: 3,
            block_refresh_interval: Duration::from_millis(500),
            upstream_check_interval: Duration::from_secs(5),
            state_update_interval: Duration::from_secs(10),
            health_check_enabled: true,
            max_fails: 5,
            limit_body_size: 32 * 1024,
            limit_headers_size: 8 * 1024,
            behind_reverse_proxy: false,
            http_listen_addr: "0.0.0.0:8888".into(),
            stratum: StratumConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StratumConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub listen_addr: String,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    pub max_conn: usize,
    /// `MaxReqSize` in the original: a line past this length is a flood.
    pub max_req_size: usize,
    #[serde(with = "humantime_serde")]
    pub hashrate_expiration: Duration,
}

impl Default for StratumConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: "0.0.0.0:8008".into(),
            timeout: Duration::from_secs(900),
            max_conn: 65536,
            max_req_size: 1024,
            hashrate_expiration: Duration::from_secs(3600),
        }
    }
}
