//! Session identity management
//!
//! Tracks the identity assigned by the signaling service. The identity is set
//! at most once per process; a failed acquisition is terminal.

use peerchat_core::{AppEvent, Effect, PeerChatError, PeerChatResult, SessionId};
use tokio::sync::watch;
use tracing::{error, info, warn};

// ----------------------------------------------------------------------------
// Identity Status
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityStatus {
    /// Acquisition has not been requested
    Unrequested,
    /// Waiting for the signaling service
    Pending,
    Ready(SessionId),
    Failed(String),
}

impl IdentityStatus {
    pub fn id(&self) -> Option<&SessionId> {
        match self {
            IdentityStatus::Ready(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, IdentityStatus::Failed(_))
    }
}

// ----------------------------------------------------------------------------
// Identity Manager
// ----------------------------------------------------------------------------

/// Owns the session identity and publishes its status on a watch channel
#[derive(Debug)]
pub struct IdentityManager {
    status: IdentityStatus,
    publisher: watch::Sender<IdentityStatus>,
}

impl Default for IdentityManager {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityManager {
    pub fn new() -> Self {
        let (publisher, _) = watch::channel(IdentityStatus::Unrequested);
        Self {
            status: IdentityStatus::Unrequested,
            publisher,
        }
    }

    /// Observe status changes; the receiver starts at the current status
    pub fn subscribe(&self) -> watch::Receiver<IdentityStatus> {
        self.publisher.subscribe()
    }

    /// Begin acquisition. Only the first call yields an effect.
    pub fn initialize(&mut self) -> Option<Effect> {
        if self.status != IdentityStatus::Unrequested {
            return None;
        }
        self.set(IdentityStatus::Pending);
        Some(Effect::AcquireIdentity)
    }

    /// Record the assigned identity, returning the ready event the first time
    pub fn on_assigned(&mut self, id: SessionId) -> Option<AppEvent> {
        match &self.status {
            IdentityStatus::Ready(current) => {
                warn!(
                    "Ignoring second identity assignment {} (already {})",
                    id, current
                );
                None
            }
            IdentityStatus::Failed(reason) => {
                warn!("Ignoring identity {} after failed acquisition: {}", id, reason);
                None
            }
            IdentityStatus::Unrequested | IdentityStatus::Pending => {
                info!("Session identity assigned: {}", id);
                self.set(IdentityStatus::Ready(id.clone()));
                Some(AppEvent::IdentityReady { id })
            }
        }
    }

    /// Record a failed acquisition. Ignored once an identity is held.
    pub fn on_failed(&mut self, reason: String) -> Option<AppEvent> {
        match &self.status {
            IdentityStatus::Ready(id) => {
                warn!("Ignoring identity failure while holding {}: {}", id, reason);
                None
            }
            IdentityStatus::Failed(_) => None,
            IdentityStatus::Unrequested | IdentityStatus::Pending => {
                error!("Session identity acquisition failed: {}", reason);
                self.set(IdentityStatus::Failed(reason.clone()));
                Some(AppEvent::IdentityFailed { reason })
            }
        }
    }

    /// The identity, or the error an identity-requiring operation must return
    pub fn require(&self) -> PeerChatResult<&SessionId> {
        match &self.status {
            IdentityStatus::Ready(id) => Ok(id),
            IdentityStatus::Failed(reason) => Err(PeerChatError::identity_failure(reason.clone())),
            IdentityStatus::Unrequested | IdentityStatus::Pending => {
                Err(PeerChatError::IdentityPending)
            }
        }
    }

    pub fn current(&self) -> Option<&SessionId> {
        self.status.id()
    }

    pub fn status(&self) -> &IdentityStatus {
        &self.status
    }

    fn set(&mut self, status: IdentityStatus) {
        self.status = status.clone();
        self.publisher.send_replace(status);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> SessionId {
        SessionId::new(s).unwrap()
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let mut manager = IdentityManager::new();
        assert_eq!(manager.initialize(), Some(Effect::AcquireIdentity));
        assert_eq!(manager.initialize(), None);
        assert_eq!(manager.status(), &IdentityStatus::Pending);
    }

    #[test]
    fn test_operations_before_assignment_are_pending() {
        let mut manager = IdentityManager::new();
        manager.initialize();
        assert!(matches!(manager.require(), Err(PeerChatError::IdentityPending)));
    }

    #[test]
    fn test_ready_fires_once() {
        let mut manager = IdentityManager::new();
        manager.initialize();

        let event = manager.on_assigned(id("P1"));
        assert_eq!(event, Some(AppEvent::IdentityReady { id: id("P1") }));
        assert!(manager.on_assigned(id("P9")).is_none());
        assert_eq!(manager.require().unwrap(), &id("P1"));
        assert!(manager.on_failed("late".into()).is_none());
    }

    #[test]
    fn test_failure_is_terminal() {
        let mut manager = IdentityManager::new();
        manager.initialize();

        assert!(manager.on_failed("server down".into()).is_some());
        assert!(manager.on_assigned(id("P1")).is_none());
        assert!(matches!(
            manager.require(),
            Err(PeerChatError::IdentityAcquisitionFailure { .. })
        ));
    }

    #[tokio::test]
    async fn test_watch_publishes_status() {
        let mut manager = IdentityManager::new();
        let mut rx = manager.subscribe();
        manager.initialize();
        manager.on_assigned(id("P1"));

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().id(), Some(&id("P1")));
    }
}
