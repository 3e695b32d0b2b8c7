//! History synchronization with the persistence backend
//!
//! History loads and persistence calls run in their own tasks and report back
//! to the core logic task through a `SyncReport` channel. Each load carries a
//! generation; only the outcome of the most recent load is applied.
//!
//! Messages of the pair being loaded are not persisted until the load
//! resolves, so a fetch never returns a copy of a message that is already in
//! the live part of the store.

use std::sync::Arc;

use peerchat_core::{
    AppEvent, BackendClient, Conversation, ConversationStore, Message, MessageRecord,
    PeerChatResult, SessionId,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

// ----------------------------------------------------------------------------
// Reports
// ----------------------------------------------------------------------------

/// Completion of a history load
#[derive(Debug)]
pub struct HistoryOutcome {
    pub generation: u64,
    pub remote: SessionId,
    pub result: PeerChatResult<Conversation>,
}

/// Messages from background sync tasks to the core logic task
#[derive(Debug)]
pub enum SyncReport {
    History(HistoryOutcome),
    PersistFailed { record: MessageRecord, reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryStats {
    pub loads_started: u64,
    pub loads_applied: u64,
    pub loads_failed: u64,
    pub loads_discarded: u64,
    pub persists_started: u64,
    pub persists_deferred: u64,
}

#[derive(Debug, Clone)]
struct PendingLoad {
    generation: u64,
    remote: SessionId,
    /// Store length when the load started; later appends are kept
    mark: usize,
}

// ----------------------------------------------------------------------------
// History Synchronizer
// ----------------------------------------------------------------------------

pub struct HistorySynchronizer {
    backend: Arc<dyn BackendClient>,
    reports: mpsc::Sender<SyncReport>,
    generation: u64,
    pending: Option<PendingLoad>,
    /// Records held back while a load for their pair is in flight
    deferred: Vec<MessageRecord>,
    stats: HistoryStats,
}

impl HistorySynchronizer {
    pub fn new(backend: Arc<dyn BackendClient>, reports: mpsc::Sender<SyncReport>) -> Self {
        Self {
            backend,
            reports,
            generation: 0,
            pending: None,
            deferred: Vec::new(),
            stats: HistoryStats::default(),
        }
    }

    /// Fetch the persisted conversation between `local` and `remote`
    ///
    /// Records keep the backend's order; each is tagged local when its sender
    /// is `local`.
    pub async fn fetch_conversation(
        backend: &dyn BackendClient,
        local: &SessionId,
        remote: &SessionId,
    ) -> PeerChatResult<Conversation> {
        let records = backend.fetch_history(local, remote).await?;
        let messages = records
            .into_iter()
            .map(|record| record.into_message(local))
            .collect();
        Ok(Conversation::new(local.clone(), remote.clone(), messages))
    }

    /// Start loading history for the pair. A missing identity makes this a no-op.
    ///
    /// Returns the generation of the started load.
    pub fn load_history(
        &mut self,
        local: Option<&SessionId>,
        remote: Option<&SessionId>,
        mark: usize,
    ) -> Option<u64> {
        let (Some(local), Some(remote)) = (local, remote) else {
            debug!("Skipping history load: identity missing");
            return None;
        };

        self.generation += 1;
        let generation = self.generation;
        let mut mark = mark;
        if let Some(previous) = self.pending.take() {
            debug!(
                "History load {} for {} superseded by load {}",
                previous.generation, previous.remote, generation
            );
            if &previous.remote == remote {
                // Deferred messages sit after the earlier mark and must stay live
                mark = mark.min(previous.mark);
            } else {
                self.flush_deferred();
            }
        }
        self.pending = Some(PendingLoad {
            generation,
            remote: remote.clone(),
            mark,
        });
        self.stats.loads_started += 1;

        let backend = Arc::clone(&self.backend);
        let reports = self.reports.clone();
        let local = local.clone();
        let remote = remote.clone();
        tokio::spawn(async move {
            let result = Self::fetch_conversation(backend.as_ref(), &local, &remote).await;
            let outcome = HistoryOutcome {
                generation,
                remote,
                result,
            };
            if reports.send(SyncReport::History(outcome)).await.is_err() {
                debug!("History load {} finished after shutdown", generation);
            }
        });
        Some(generation)
    }

    /// Apply a load outcome to the store if it belongs to the latest load
    pub fn apply(
        &mut self,
        outcome: HistoryOutcome,
        store: &mut ConversationStore,
    ) -> Option<AppEvent> {
        let current = match &self.pending {
            Some(pending) if pending.generation == outcome.generation => pending.clone(),
            _ => {
                debug!(
                    "Discarding stale history load {} for {}",
                    outcome.generation, outcome.remote
                );
                self.stats.loads_discarded += 1;
                return None;
            }
        };
        self.pending = None;

        let event = match outcome.result {
            Ok(conversation) => {
                let mut messages = conversation.messages;
                if store.is_scoped_to(&current.remote) {
                    messages.extend(store.messages_since(current.mark).iter().cloned());
                }
                let message_count = messages.len();
                info!(
                    "Loaded {} history messages for {}",
                    message_count, current.remote
                );
                store.replace_all(current.remote.clone(), messages);
                self.stats.loads_applied += 1;
                Some(AppEvent::ConversationReplaced {
                    remote: current.remote,
                    message_count,
                })
            }
            Err(e) => {
                warn!("History unavailable for {}: {}", current.remote, e);
                self.stats.loads_failed += 1;
                Some(AppEvent::HistoryUnavailable {
                    remote: current.remote,
                    reason: e.to_string(),
                })
            }
        };
        self.flush_deferred();
        event
    }

    /// Persist a message in the background. Failures come back as `SyncReport::PersistFailed`.
    ///
    /// Messages of the pair being loaded wait until the load resolves.
    pub fn persist(&mut self, message: &Message) {
        let record = MessageRecord::from(message);
        match &self.pending {
            Some(pending) if message.involves(&pending.remote) => {
                debug!("Deferring persistence until history load {} resolves", pending.generation);
                self.stats.persists_deferred += 1;
                self.deferred.push(record);
            }
            _ => self.spawn_persist(record),
        }
    }

    /// Persist everything held back by a load
    pub fn flush_deferred(&mut self) {
        for record in std::mem::take(&mut self.deferred) {
            self.spawn_persist(record);
        }
    }

    fn spawn_persist(&mut self, record: MessageRecord) {
        let backend = Arc::clone(&self.backend);
        let reports = self.reports.clone();
        self.stats.persists_started += 1;
        tokio::spawn(async move {
            if let Err(e) = backend.persist_message(&record).await {
                warn!("Failed to persist message from {}: {}", record.sender_id, e);
                let report = SyncReport::PersistFailed {
                    record,
                    reason: e.to_string(),
                };
                let _ = reports.send(report).await;
            }
        });
    }

    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn stats(&self) -> &HistoryStats {
        &self.stats
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use peerchat_core::{InMemoryBackend, Origin, PeerChatError};
    use std::time::Duration;
    use tokio::time::timeout;

    fn id(s: &str) -> SessionId {
        SessionId::new(s).unwrap()
    }

    async fn next_history(rx: &mut mpsc::Receiver<SyncReport>) -> HistoryOutcome {
        match timeout(Duration::from_secs(1), rx.recv()).await {
            Ok(Some(SyncReport::History(outcome))) => outcome,
            other => panic!("expected history outcome, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_load_without_identity_is_noop() {
        let (tx, _rx) = mpsc::channel(8);
        let mut sync = HistorySynchronizer::new(Arc::new(InMemoryBackend::new()), tx);
        assert_eq!(sync.load_history(None, Some(&id("R")), 0), None);
        assert_eq!(sync.load_history(Some(&id("L")), None, 0), None);
        assert!(!sync.is_loading());
    }

    #[tokio::test]
    async fn test_history_replaces_store_in_backend_order() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.seed(MessageRecord::new(id("P1"), id("P2"), "hello"));
        backend.seed(MessageRecord::new(id("P2"), id("P1"), "hey"));

        let (tx, mut rx) = mpsc::channel(8);
        let mut sync = HistorySynchronizer::new(backend, tx);
        let mut store = ConversationStore::new();
        store.replace_all(id("P2"), Vec::new());

        sync.load_history(Some(&id("P1")), Some(&id("P2")), store.len());
        let outcome = next_history(&mut rx).await;
        let event = sync.apply(outcome, &mut store);

        assert_eq!(
            event,
            Some(AppEvent::ConversationReplaced {
                remote: id("P2"),
                message_count: 2
            })
        );
        let origins: Vec<_> = store.messages().iter().map(|m| m.origin).collect();
        assert_eq!(origins, vec![Origin::Local, Origin::Remote]);
    }

    #[tokio::test]
    async fn test_live_messages_during_load_are_kept() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.seed(MessageRecord::new(id("P2"), id("P1"), "old"));

        let (tx, mut rx) = mpsc::channel(8);
        let mut sync = HistorySynchronizer::new(backend, tx);
        let mut store = ConversationStore::new();
        store.replace_all(id("P2"), Vec::new());

        sync.load_history(Some(&id("P1")), Some(&id("P2")), store.len());
        store.append(Message::remote(id("P2"), id("P1"), "live"));
        let outcome = next_history(&mut rx).await;
        sync.apply(outcome, &mut store);

        let bodies: Vec<_> = store.messages().iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["old", "live"]);
    }

    async fn wait_for_records(backend: &InMemoryBackend, count: usize) {
        timeout(Duration::from_secs(1), async {
            while backend.records().len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("records persisted");
    }

    #[tokio::test]
    async fn test_message_during_load_is_persisted_after_apply() {
        let backend = Arc::new(InMemoryBackend::new());
        let (tx, mut rx) = mpsc::channel(8);
        let mut sync = HistorySynchronizer::new(backend.clone(), tx);
        let mut store = ConversationStore::new();
        store.replace_all(id("P2"), Vec::new());

        sync.load_history(Some(&id("P1")), Some(&id("P2")), store.len());
        let hi = Message::local(id("P1"), id("P2"), "hi");
        store.append(hi.clone());
        sync.persist(&hi);
        assert_eq!(sync.deferred_len(), 1);

        let outcome = next_history(&mut rx).await;
        assert!(backend.records().is_empty());
        sync.apply(outcome, &mut store);

        let bodies: Vec<_> = store.messages().iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["hi"]);
        assert_eq!(sync.deferred_len(), 0);
        wait_for_records(&backend, 1).await;
        assert_eq!(backend.records()[0].message, "hi");
    }

    #[tokio::test]
    async fn test_reload_of_same_pair_keeps_deferred_messages_live() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.seed(MessageRecord::new(id("P2"), id("P1"), "old"));
        let (tx, mut rx) = mpsc::channel(8);
        let mut sync = HistorySynchronizer::new(backend.clone(), tx);
        let mut store = ConversationStore::new();
        store.replace_all(id("P2"), Vec::new());

        sync.load_history(Some(&id("P1")), Some(&id("P2")), store.len());
        let hi = Message::remote(id("P2"), id("P1"), "hi");
        store.append(hi.clone());
        sync.persist(&hi);
        let latest = sync
            .load_history(Some(&id("P1")), Some(&id("P2")), store.len())
            .unwrap();

        let mut applied = None;
        while applied.is_none() {
            let outcome = next_history(&mut rx).await;
            if outcome.generation == latest {
                applied = sync.apply(outcome, &mut store);
            } else {
                assert!(sync.apply(outcome, &mut store).is_none());
            }
        }
        let bodies: Vec<_> = store.messages().iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["old", "hi"]);
        wait_for_records(&backend, 2).await;
    }

    #[tokio::test]
    async fn test_load_for_other_pair_releases_deferred() {
        let backend = Arc::new(InMemoryBackend::new());
        let (tx, _rx) = mpsc::channel(8);
        let mut sync = HistorySynchronizer::new(backend.clone(), tx);

        sync.load_history(Some(&id("L")), Some(&id("A")), 0);
        sync.persist(&Message::local(id("L"), id("A"), "to a"));
        sync.persist(&Message::local(id("L"), id("Z"), "elsewhere"));
        assert_eq!(sync.deferred_len(), 1);

        sync.load_history(Some(&id("L")), Some(&id("B")), 0);
        assert_eq!(sync.deferred_len(), 0);
        wait_for_records(&backend, 2).await;
    }

    #[tokio::test]
    async fn test_stale_outcome_is_discarded() {
        let backend = Arc::new(InMemoryBackend::new());
        let (tx, _rx) = mpsc::channel(8);
        let mut sync = HistorySynchronizer::new(backend, tx);
        let mut store = ConversationStore::new();

        let first = sync.load_history(Some(&id("L")), Some(&id("A")), 0).unwrap();
        sync.load_history(Some(&id("L")), Some(&id("B")), 0);

        let stale = HistoryOutcome {
            generation: first,
            remote: id("A"),
            result: Ok(Conversation::new(id("L"), id("A"), vec![Message::remote(id("A"), id("L"), "x")])),
        };
        assert!(sync.apply(stale, &mut store).is_none());
        assert!(store.is_empty());
        assert_eq!(sync.stats().loads_discarded, 1);
        assert!(sync.is_loading());
    }

    #[tokio::test]
    async fn test_failed_load_keeps_conversation() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.set_fail_history(true);
        let (tx, mut rx) = mpsc::channel(8);
        let mut sync = HistorySynchronizer::new(backend, tx);
        let mut store = ConversationStore::new();
        store.replace_all(id("R"), vec![Message::local(id("L"), id("R"), "kept")]);

        sync.load_history(Some(&id("L")), Some(&id("R")), 0);
        let outcome = next_history(&mut rx).await;
        assert!(matches!(outcome.result, Err(PeerChatError::BackendUnavailable { .. })));

        let event = sync.apply(outcome, &mut store);
        assert!(matches!(event, Some(AppEvent::HistoryUnavailable { .. })));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_persist_failure_is_reported() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.set_fail_persist(true);
        let (tx, mut rx) = mpsc::channel(8);
        let mut sync = HistorySynchronizer::new(backend, tx);

        sync.persist(&Message::local(id("L"), id("R"), "lost"));
        match timeout(Duration::from_secs(1), rx.recv()).await {
            Ok(Some(SyncReport::PersistFailed { record, .. })) => assert_eq!(record.message, "lost"),
            other => panic!("expected persist failure, got {:?}", other),
        }
    }
}
