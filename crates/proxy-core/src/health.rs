//! The proxy-wide "sick" flag (spec.md §4.6), driven by the node-state
//! heartbeat (SPEC_FULL.md §2) rather than by the per-upstream-client sick
//! counter in `stratum-rpc` — the two are independent signals.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use stratum_storage::{Backend, SharedBackend};

/// A monotonic fail counter, incremented on a failed `WriteNodeState` and
/// reset to zero on success. "Sick" is observed as `enabled && count >=
/// max_fails`.
#[derive(Debug)]
pub struct SickFlag {
    enabled: bool,
    max_fails: i64,
    fails: AtomicI64,
}

impl SickFlag {
    pub fn new(enabled: bool, max_fails: i64) -> Self {
        Self { enabled, max_fails, fails: AtomicI64::new(0) }
    }

    pub fn is_sick(&self) -> bool {
        self.enabled && self.fails.load(Ordering::SeqCst) >= self.max_fails
    }

    fn mark_failure(&self) {
        self.fails.fetch_add(1, Ordering::SeqCst);
    }

    fn mark_success(&self) {
        self.fails.store(0, Ordering::SeqCst);
    }
}

/// Periodically writes `(name, height, difficulty)` into the backend; the
/// only producer of sick/ok transitions on [`SickFlag`] (SPEC_FULL.md §2).
pub async fn run_node_state_heartbeat(
    flag: Arc<SickFlag>,
    backend: SharedBackend,
    name: String,
    current_height: impl Fn() -> (u64, i64) + Send + Sync + 'static,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let (height, difficulty) = current_height();
        match backend.write_node_state(&name, height, difficulty).await {
            Ok(()) => flag.mark_success(),
            Err(err) => {
                flag.mark_failure();
                tracing::warn!(error = %err, "write_node_state failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sick_after_max_fails_consecutive() {
        let flag = SickFlag::new(true, 3);
        assert!(!flag.is_sick());
        flag.mark_failure();
        flag.mark_failure();
        assert!(!flag.is_sick());
        flag.mark_failure();
        assert!(flag.is_sick());
        flag.mark_success();
        assert!(!flag.is_sick());
    }

    #[test]
    fn disabled_flag_never_sick() {
        let flag = SickFlag::new(false, 1);
        flag.mark_failure();
        flag.mark_failure();
        assert!(!flag.is_sick());
    }
}
