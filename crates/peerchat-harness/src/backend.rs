//! Backend with controllable history latency
//!
//! Wraps `InMemoryBackend` and lets a test hold history fetches for a given
//! remote until it opens the gate, so that loads can be made to resolve out
//! of order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use peerchat_core::{
    BackendClient, HistoryRecord, InMemoryBackend, MessageRecord, PeerChatResult, RegisteredUser,
    SessionId,
};
use tokio::sync::Notify;
use tracing::debug;

/// Releases held history fetches for one remote
#[derive(Debug, Clone)]
pub struct HistoryGate {
    notify: Arc<Notify>,
}

impl HistoryGate {
    pub fn open(&self) {
        self.notify.notify_one();
    }
}

#[derive(Debug, Default)]
pub struct GatedBackend {
    inner: InMemoryBackend,
    gates: Mutex<HashMap<SessionId, Arc<Notify>>>,
    held: AtomicUsize,
}

impl GatedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// The wrapped backend, for seeding records and switching failures
    pub fn inner(&self) -> &InMemoryBackend {
        &self.inner
    }

    /// Hold the next history fetch for `remote` until the gate opens
    pub fn gate_history(&self, remote: &SessionId) -> HistoryGate {
        let notify = Arc::new(Notify::new());
        self.gates
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(remote.clone(), Arc::clone(&notify));
        HistoryGate { notify }
    }

    /// Number of history fetches that reached a gate
    pub fn held_fetches(&self) -> usize {
        self.held.load(Ordering::SeqCst)
    }

    fn take_gate(&self, remote: &SessionId) -> Option<Arc<Notify>> {
        self.gates
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(remote)
    }
}

#[async_trait]
impl BackendClient for GatedBackend {
    async fn register(&self, user: &RegisteredUser) -> PeerChatResult<()> {
        self.inner.register(user).await
    }

    async fn persist_message(&self, record: &MessageRecord) -> PeerChatResult<()> {
        self.inner.persist_message(record).await
    }

    async fn fetch_history(
        &self,
        local: &SessionId,
        remote: &SessionId,
    ) -> PeerChatResult<Vec<HistoryRecord>> {
        if let Some(gate) = self.take_gate(remote) {
            self.held.fetch_add(1, Ordering::SeqCst);
            debug!("History fetch for {} held", remote);
            gate.notified().await;
        }
        self.inner.fetch_history(local, remote).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    fn id(s: &str) -> SessionId {
        SessionId::new(s).unwrap()
    }

    #[tokio::test]
    async fn test_gate_holds_until_opened() {
        let backend = Arc::new(GatedBackend::new());
        backend.inner().seed(MessageRecord::new(id("A"), id("B"), "hello"));
        let gate = backend.gate_history(&id("B"));

        let fetch = {
            let backend = Arc::clone(&backend);
            tokio::spawn(async move { backend.fetch_history(&id("A"), &id("B")).await })
        };
        sleep(Duration::from_millis(20)).await;
        assert!(!fetch.is_finished());
        assert_eq!(backend.held_fetches(), 1);

        gate.open();
        let records = timeout(Duration::from_secs(1), fetch)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn test_ungated_remote_passes_through() {
        let backend = GatedBackend::new();
        let _gate = backend.gate_history(&id("C"));
        let records = backend.fetch_history(&id("A"), &id("B")).await.unwrap();
        assert!(records.is_empty());
        assert_eq!(backend.held_fetches(), 0);
        assert_eq!(backend.inner().calls().history, 1);
    }
}
