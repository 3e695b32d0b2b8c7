//! Core Logic State Management

use std::sync::Arc;

use peerchat_core::{BackendClient, ConversationStore, RuntimeStatus};
use tokio::sync::mpsc;

use crate::managers::{ConnectionController, HistorySynchronizer, IdentityManager, SyncReport};
use crate::registration::RegistrationGateway;

// ----------------------------------------------------------------------------
// Core Logic State
// ----------------------------------------------------------------------------

/// Session state owned by the core logic task
pub struct CoreState {
    pub identity: IdentityManager,
    pub connections: ConnectionController,
    pub history: HistorySynchronizer,
    pub registration: RegistrationGateway,
    /// The conversation being displayed
    pub store: ConversationStore,
    pub stats: CoreStats,
}

impl CoreState {
    pub fn new(backend: Arc<dyn BackendClient>, reports: mpsc::Sender<SyncReport>) -> Self {
        Self {
            identity: IdentityManager::new(),
            connections: ConnectionController::new(),
            history: HistorySynchronizer::new(Arc::clone(&backend), reports),
            registration: RegistrationGateway::new(backend),
            store: ConversationStore::new(),
            stats: CoreStats::default(),
        }
    }

    /// Status snapshot for the front end
    pub fn status(&self) -> RuntimeStatus {
        let active = self.connections.active();
        let connection_stats = self.connections.stats();
        RuntimeStatus {
            identity: self.identity.current().cloned(),
            identity_failed: self.identity.status().is_failed(),
            listening: self.connections.is_listening(),
            active_remote: active.map(|c| c.remote.clone()),
            active_direction: active.map(|c| c.direction),
            pending_attempts: self.connections.pending_attempts(),
            message_count: self.store.len(),
            messages_sent: connection_stats.messages_sent,
            messages_received: connection_stats.messages_received + connection_stats.out_of_band,
            history_loads: self.history.stats().loads_applied,
        }
    }
}

/// Statistics for the core logic task
#[derive(Debug, Clone, Default)]
pub struct CoreStats {
    pub commands_processed: u64,
    pub events_processed: u64,
    pub reports_processed: u64,
    pub effects_generated: u64,
    pub app_events_generated: u64,
    pub app_events_dropped: u64,
}
