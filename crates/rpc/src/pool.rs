use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::client::{SharedUpstream, UpstreamClient};

/// Holds a fixed set of upstream clients and an atomic index of the
/// active one, per spec.md §4.2.
///
/// The client slice is fixed at construction so the hot read path
/// (`active()`) never takes a lock; only the periodic refresh task writes
/// the index, and it writes it with `Ordering::SeqCst` so a switch is
/// immediately visible to concurrent readers.
#[derive(Debug)]
pub struct UpstreamPool {
    clients: Vec<SharedUpstream>,
    active: AtomicU32,
}

impl UpstreamPool {
    pub fn new(clients: Vec<SharedUpstream>) -> Self {
        assert!(!clients.is_empty(), "upstream pool must have at least one client");
        Self { clients, active: AtomicU32::new(0) }
    }

    /// The currently active client. Readers never coordinate with the
    /// refresh task: a request started against the previous client keeps
    /// running against it even if the active index changes mid-flight.
    pub fn active(&self) -> SharedUpstream {
        let idx = self.active.load(Ordering::SeqCst) as usize;
        Arc::clone(&self.clients[idx])
    }

    pub fn clients(&self) -> &[SharedUpstream] {
        &self.clients
    }

    /// Walks the clients in order and activates the first healthy one.
    /// No-op if that client is already active.
    pub async fn refresh(&self) {
        let mut candidate = None;
        for (i, client) in self.clients.iter().enumerate() {
            if client.check().await {
                candidate = Some(i as u32);
                break;
            }
        }
        let Some(candidate) = candidate else {
            tracing::warn!("no healthy upstream found during refresh");
            return;
        };
        let previous = self.active.swap(candidate, Ordering::SeqCst);
        if previous != candidate {
            tracing::info!(
                from = self.clients[previous as usize].name(),
                to = self.clients[candidate as usize].name(),
                "switching active upstream"
            );
            metrics::counter!("stratum_upstream_switches_total").increment(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeUpstream;

    #[tokio::test]
    async fn refresh_switches_to_first_healthy_client() {
        let u0 = FakeUpstream::new("u0");
        u0.set_healthy(false);
        let u1 = FakeUpstream::new("u1");
        let pool = UpstreamPool::new(vec![Arc::new(u0) as SharedUpstream, Arc::new(u1) as SharedUpstream]);
        assert_eq!(pool.active().name(), "u0");
        pool.refresh().await;
        assert_eq!(pool.active().name(), "u1");
    }

    #[tokio::test]
    async fn refresh_keeps_active_when_it_is_still_first_healthy() {
        let u0 = FakeUpstream::new("u0");
        let u1 = FakeUpstream::new("u1");
        let pool = UpstreamPool::new(vec![Arc::new(u0) as SharedUpstream, Arc::new(u1) as SharedUpstream]);
        pool.refresh().await;
        assert_eq!(pool.active().name(), "u0");
    }

    #[tokio::test]
    async fn refresh_with_no_healthy_clients_leaves_index_unchanged() {
        let u0 = FakeUpstream::new("u0");
        u0.set_healthy(false);
        let u1 = FakeUpstream::new("u1");
        u1.set_healthy(false);
        let pool = UpstreamPool::new(vec![Arc::new(u0) as SharedUpstream, Arc::new(u1) as SharedUpstream]);
        pool.refresh().await;
        assert_eq!(pool.active().name(), "u0");
    }
}
