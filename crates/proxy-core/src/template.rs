//! Block template distribution (C3), grounded in
//! `examples/original_source/server/proxy/blocks.go`.

use std::collections::HashMap;
use std::sync::Arc;

use alloy_primitives::U256;
use parking_lot::RwLock;
use stratum_rpc::{SharedUpstream, UpstreamClient};

use crate::config::ProxyConfig;
use crate::session::SessionRegistry;

/// A header's entry in the backlog: the height it was mined at, and the
/// *network* difficulty implied by its share-target (spec.md §3, §4.3
/// step 6) — not the per-miner share difficulty.
#[derive(Debug, Clone, Copy)]
pub struct HeaderEntry {
    pub height: u64,
    pub block_difficulty: u64,
}

/// The current pending-block snapshot served back to miners via
/// `eth_getBlockByNumber`. Its `difficulty` field is overwritten with the
/// configured share difficulty (spec.md §4.3 step 5) — this is *not* the
/// network difficulty used for classification.
#[derive(Debug, Clone)]
pub struct PendingBlockSnapshot {
    pub number_hex: String,
    pub difficulty_hex: String,
}

/// An immutable published template (spec.md §3). Refreshing never mutates
/// a `Template` in place; it builds a new one and swaps the pointer.
#[derive(Debug, Clone)]
pub struct Template {
    pub header: String,
    pub seed: String,
    pub share_target: String,
    pub height: u64,
    pub network_difficulty: i64,
    pub pending_block: PendingBlockSnapshot,
    pub headers: HashMap<String, HeaderEntry>,
}

impl Template {
    pub fn work(&self) -> [String; 3] {
        [self.header.clone(), self.seed.clone(), self.share_target.clone()]
    }
}

/// Converts a 256-bit share-target into the implied difficulty:
/// `difficulty = 2^256 / target`, the same reduction `util.TargetHexToDiff`
/// performs in the original.
fn target_hex_to_difficulty(target_hex: &str) -> u64 {
    let target = U256::from_str_radix(target_hex.trim_start_matches("0x"), 16).unwrap_or(U256::ZERO);
    if target.is_zero() {
        return u64::MAX;
    }
    let difficulty = U256::MAX / target;
    difficulty.saturating_to::<u64>()
}

fn share_difficulty_hex(share_difficulty: u64) -> String {
    format!("0x{share_difficulty:x}")
}

/// Atomically published current template plus the backlog of recent
/// headers (spec.md §9 "Atomic template publish").
pub struct TemplateCache {
    current: RwLock<Option<Arc<Template>>>,
    config: ProxyConfig,
}

impl TemplateCache {
    pub fn new(config: ProxyConfig) -> Self {
        Self { current: RwLock::new(None), config }
    }

    /// A consistent snapshot; readers never observe a partially updated
    /// backlog (spec.md §5).
    pub fn current(&self) -> Option<Arc<Template>> {
        self.current.read().clone()
    }

    /// Runs the refresh procedure of spec.md §4.3 against the active
    /// upstream. Returns `true` if a new template was published.
    pub async fn refresh(&self, upstream: &SharedUpstream, sessions: Option<&Arc<SessionRegistry>>) -> bool {
        let pending = match upstream.get_pending_block().await {
            Ok(Some(pending)) => pending,
            Ok(None) => {
                tracing::warn!("fetchPendingBlock: empty reply");
                return false;
            }
            Err(err) => {
                tracing::error!(error = %err, upstream = upstream.name(), "fetchPendingBlock failed");
                return false;
            }
        };
        let height = match u64::from_str_radix(pending.number.trim_start_matches("0x"), 16) {
            Ok(h) => h,
            Err(_) => {
                tracing::error!("can't parse pending block number {}", pending.number);
                return false;
            }
        };
        let network_difficulty = match i64::from_str_radix(pending.difficulty.trim_start_matches("0x"), 16) {
            Ok(d) => d,
            Err(_) => {
                tracing::error!("can't parse pending block difficulty {}", pending.difficulty);
                return false;
            }
        };

        let work = match upstream.get_work().await {
            Ok(work) => work,
            Err(err) => {
                tracing::error!(error = %err, upstream = upstream.name(), "get_work failed");
                return false;
            }
        };

        let previous = self.current();
        if let Some(previous) = &previous {
            if previous.header == work.header {
                return false;
            }
        }

        let mut headers = HashMap::new();
        headers.insert(
            work.header.clone(),
            HeaderEntry { height, block_difficulty: target_hex_to_difficulty(&work.share_target) },
        );
        if let Some(previous) = &previous {
            for (header, entry) in &previous.headers {
                if entry.height > height.saturating_sub(self.config.max_backlog) {
                    headers.insert(header.clone(), *entry);
                }
            }
        }

        let template = Template {
            header: work.header.clone(),
            seed: work.seed,
            share_target: work.share_target,
            height,
            network_difficulty,
            pending_block: PendingBlockSnapshot {
                number_hex: pending.number,
                difficulty_hex: share_difficulty_hex(self.config.share_difficulty),
            },
            headers,
        };

        tracing::warn!(height, header = %template.header, upstream = upstream.name(), "new block to mine");
        *self.current.write() = Some(Arc::new(template));

        if self.config.stratum.enabled {
            if let Some(sessions) = sessions {
                sessions.broadcast(self.current().expect("just published"));
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratum_rpc::test_support::FakeUpstream;
    use stratum_rpc::{PendingBlock, Work};

    fn upstream_at(header: &str, height_hex: &str) -> SharedUpstream {
        let fake = FakeUpstream::new("u0");
        fake.set_work(Work { header: header.into(), seed: "0xseed".into(), share_target: "0x1".into() });
        fake.set_pending_block(PendingBlock { number: height_hex.into(), difficulty: "0x1".into() });
        Arc::new(fake)
    }

    #[tokio::test]
    async fn refresh_publishes_new_template_with_fresh_backlog() {
        let cache = TemplateCache::new(ProxyConfig::default());
        let upstream = upstream_at("0xaaa", "0x64");
        assert!(cache.refresh(&upstream, None).await);
        let template = cache.current().unwrap();
        assert_eq!(template.header, "0xaaa");
        assert!(template.headers.contains_key("0xaaa"));
    }

    #[tokio::test]
    async fn refresh_is_noop_when_header_unchanged() {
        let cache = TemplateCache::new(ProxyConfig::default());
        let upstream = upstream_at("0xaaa", "0x64");
        assert!(cache.refresh(&upstream, None).await);
        assert!(!cache.refresh(&upstream, None).await);
    }

    #[tokio::test]
    async fn refresh_prunes_backlog_past_max_backlog_heights() {
        let mut config = ProxyConfig::default();
        config.max_backlog = 3;
        let cache = TemplateCache::new(config);

        let fake = Arc::new(FakeUpstream::new("u0"));
        fake.set_work(Work { header: "0xold".into(), seed: "0xseed".into(), share_target: "0x1".into() });
        fake.set_pending_block(PendingBlock { number: "0x64".into(), difficulty: "0x1".into() });
        let upstream: SharedUpstream = fake.clone();

        assert!(cache.refresh(&upstream, None).await);

        // Advance to a height more than max_backlog beyond the old one —
        // the old header must be pruned.
        fake.set_work(Work { header: "0xnew".into(), seed: "0xseed".into(), share_target: "0x1".into() });
        fake.set_pending_block(PendingBlock { number: "0x6a".into(), difficulty: "0x1".into() }); // 0x64 + 6
        assert!(cache.refresh(&upstream, None).await);

        let template = cache.current().unwrap();
        assert!(template.headers.contains_key("0xnew"));
        assert!(!template.headers.contains_key("0xold"));
    }
}
