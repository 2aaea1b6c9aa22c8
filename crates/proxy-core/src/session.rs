//! Stratum session registry (C5), grounded in
//! `examples/original_source/server/proxy/stratum.go`
//! (`registerSession`/`removeSession`/`broadcastNewJobs`).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex as AsyncMutex, Semaphore};

use crate::protocol::JsonPushMessage;
use crate::template::Template;

/// Bound on concurrent broadcast writer tasks (spec.md §4.5).
const BROADCAST_SEMAPHORE_CAPACITY: usize = 1024;

struct SessionState {
    login: Option<String>,
    worker: String,
    registered: bool,
}

/// A stratum connection: its transport write half behind a mutex (spec.md
/// §9 "per-session encoder serialization") and its login/worker state.
pub struct Session {
    pub id: u64,
    pub ip: String,
    state: Mutex<SessionState>,
    writer: AsyncMutex<Box<dyn AsyncWrite + Unpin + Send>>,
    /// Updated by the read loop on every inbound line and by the
    /// broadcaster on a successful push. The read loop computes its next
    /// idle deadline from this, so a broadcast push genuinely postpones
    /// disconnection instead of only the next inbound line doing so.
    touched: Mutex<Instant>,
}

impl Session {
    pub fn new(id: u64, ip: String, writer: Box<dyn AsyncWrite + Unpin + Send>) -> Self {
        Self {
            id,
            ip,
            state: Mutex::new(SessionState { login: None, worker: "0".into(), registered: false }),
            writer: AsyncMutex::new(writer),
            touched: Mutex::new(Instant::now()),
        }
    }

    pub fn login(&self) -> Option<String> {
        self.state.lock().login.clone()
    }

    pub fn worker(&self) -> String {
        self.state.lock().worker.clone()
    }

    pub fn is_registered(&self) -> bool {
        self.state.lock().registered
    }

    pub fn register(&self, login: String, worker: String) {
        let mut state = self.state.lock();
        state.login = Some(login);
        state.worker = worker;
        state.registered = true;
    }

    pub fn touch(&self) {
        *self.touched.lock() = Instant::now();
    }

    /// Time elapsed since the last inbound line or successful broadcast
    /// push, used by the read loop to compute its remaining idle budget.
    pub fn idle_for(&self) -> Duration {
        self.touched.lock().elapsed()
    }

    /// Serializes `value` as one JSON line and writes it under the
    /// encoder lock, serializing against any concurrent reply write.
    pub async fn write_line(&self, value: &impl serde::Serialize) -> std::io::Result<()> {
        let mut line = serde_json::to_vec(value).map_err(std::io::Error::other)?;
        line.push(b'\n');
        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await
    }
}

/// Set of connected stratum sessions (spec.md §4.5). Insert/remove take an
/// exclusive lock; broadcast and membership checks take a shared one.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<u64, Arc<Session>>>,
    next_id: AtomicU64,
    broadcast_permits: Arc<Semaphore>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            broadcast_permits: Arc::new(Semaphore::new(BROADCAST_SEMAPHORE_CAPACITY)),
        }
    }

    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn insert(&self, session: Arc<Session>) {
        self.sessions.write().insert(session.id, session);
    }

    pub fn remove(&self, id: u64) {
        self.sessions.write().remove(&id);
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fans the current template's job out to every connected session.
    /// Each write runs on its own task bounded by the broadcast semaphore;
    /// a write failure removes that session (spec.md §4.5). Takes `self`
    /// behind an `Arc` so spawned writer tasks can report failures back
    /// into the registry without borrowing it.
    pub fn broadcast(self: &Arc<Self>, template: Arc<Template>) {
        let push = JsonPushMessage::new(template.header.clone(), template.seed.clone(), template.share_target.clone());
        let sessions: Vec<Arc<Session>> = self.sessions.read().values().cloned().collect();
        for session in sessions {
            let push = push.clone();
            let permits = Arc::clone(&self.broadcast_permits);
            let registry = Arc::clone(self);
            tokio::spawn(async move {
                let Ok(_permit) = permits.acquire().await else { return };
                match session.write_line(&push).await {
                    Ok(()) => session.touch(),
                    Err(err) => {
                        tracing::warn!(
                            session = session.id,
                            ip = %session.ip,
                            error = %err,
                            "broadcast write failed, dropping session"
                        );
                        registry.remove(session.id);
                    }
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::PendingBlockSnapshot;
    use std::collections::HashMap;
    use tokio::io::AsyncReadExt;

    fn sample_template() -> Arc<Template> {
        Arc::new(Template {
            header: "0xaaa".into(),
            seed: "0xseed".into(),
            share_target: "0x1".into(),
            height: 10,
            network_difficulty: 1,
            pending_block: PendingBlockSnapshot { number_hex: "0xa".into(), difficulty_hex: "0x1".into() },
            headers: HashMap::new(),
        })
    }

    #[tokio::test]
    async fn registered_session_round_trips_login_and_worker() {
        let (client, _server) = tokio::io::duplex(256);
        let session = Session::new(1, "127.0.0.1".into(), Box::new(client));
        assert!(!session.is_registered());
        session.register("0xabc".into(), "rig1".into());
        assert!(session.is_registered());
        assert_eq!(session.login(), Some("0xabc".to_string()));
        assert_eq!(session.worker(), "rig1");
    }

    #[tokio::test]
    async fn broadcast_delivers_push_frame_to_every_session() {
        let registry = Arc::new(SessionRegistry::new());
        let (client, mut server) = tokio::io::duplex(4096);
        let session = Arc::new(Session::new(registry.next_id(), "127.0.0.1".into(), Box::new(client)));
        registry.insert(session);

        registry.broadcast(sample_template());

        let mut buf = vec![0u8; 256];
        let n = server.read(&mut buf).await.unwrap();
        let line = String::from_utf8(buf[..n].to_vec()).unwrap();
        assert!(line.contains("\"result\":[\"0xaaa\""));
    }

    #[tokio::test]
    async fn broadcast_write_failure_removes_the_session() {
        let registry = Arc::new(SessionRegistry::new());
        let (client, server) = tokio::io::duplex(4096);
        drop(server); // closing the peer makes the next write fail
        let id = registry.next_id();
        let session = Arc::new(Session::new(id, "127.0.0.1".into(), Box::new(client)));
        registry.insert(session);

        registry.broadcast(sample_template());
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        assert_eq!(registry.len(), 0);
    }
}
