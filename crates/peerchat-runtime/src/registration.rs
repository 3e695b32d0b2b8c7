//! Registration Gateway
//!
//! One-shot association of a display name with a session identity in the
//! backend directory. Input is validated before any backend call is made.

use std::sync::Arc;

use peerchat_core::{BackendClient, PeerChatError, PeerChatResult, RegisteredUser, SessionId};
use tracing::{info, warn};

#[derive(Clone)]
pub struct RegistrationGateway {
    backend: Arc<dyn BackendClient>,
}

impl RegistrationGateway {
    pub fn new(backend: Arc<dyn BackendClient>) -> Self {
        Self { backend }
    }

    /// Validate input into a directory entry without touching the backend
    pub fn prepare(name: &str, session_id: &str) -> PeerChatResult<RegisteredUser> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PeerChatError::empty_field("name"));
        }
        let peer_id = SessionId::new(session_id)?;
        Ok(RegisteredUser {
            name: name.to_string(),
            peer_id,
        })
    }

    /// Send a prepared entry to the backend. Not idempotent.
    pub async fn submit(&self, user: RegisteredUser) -> PeerChatResult<()> {
        match self.backend.register(&user).await {
            Ok(()) => {
                info!("Registered {} as {}", user.peer_id, user.name);
                Ok(())
            }
            Err(e) => {
                warn!("Registration of {} failed: {}", user.name, e);
                Err(e)
            }
        }
    }

    /// Validate and register in one call
    pub async fn register(&self, name: &str, session_id: &str) -> PeerChatResult<()> {
        let user = Self::prepare(name, session_id)?;
        self.submit(user).await
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use peerchat_core::InMemoryBackend;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_register_success() {
        let backend = Arc::new(InMemoryBackend::new());
        let gateway = RegistrationGateway::new(backend.clone());

        gateway.register("alice", "P1").await.unwrap();
        let users = backend.users();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].name, "alice");
        assert_eq!(users[0].peer_id.as_str(), "P1");
    }

    #[tokio::test]
    async fn test_register_is_not_idempotent() {
        let backend = Arc::new(InMemoryBackend::new());
        let gateway = RegistrationGateway::new(backend.clone());

        gateway.register("alice", "P1").await.unwrap();
        gateway.register("alice", "P1").await.unwrap();
        assert_eq!(backend.users().len(), 2);
    }

    #[tokio::test]
    async fn test_backend_failure_is_reported() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.set_fail_register(true);
        let gateway = RegistrationGateway::new(backend.clone());

        let err = gateway.register("alice", "P1").await.unwrap_err();
        assert!(matches!(err, PeerChatError::BackendUnavailable { .. }));
        assert_eq!(backend.calls().register, 1);
    }

    proptest! {
        /// Blank input on either side is rejected without a backend call
        #[test]
        fn blank_input_makes_no_backend_call(
            name in "[ ]{0,3}|[a-z]{1,8}",
            session in "[ ]{0,3}|[a-z0-9]{1,8}",
        ) {
            prop_assume!(name.trim().is_empty() || session.trim().is_empty());

            let backend = Arc::new(InMemoryBackend::new());
            let gateway = RegistrationGateway::new(backend.clone());
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let result = rt.block_on(gateway.register(&name, &session));

            prop_assert!(result.unwrap_err().is_validation());
            prop_assert_eq!(backend.calls().total(), 0);
        }
    }
}
