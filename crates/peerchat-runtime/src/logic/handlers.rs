//! Core Logic Command and Event Handlers
//!
//! Every handler mutates `CoreState` and returns the effects and app events
//! the transition produced. Handlers for commands with a reply return the
//! reply value alongside.

use peerchat_core::{
    AppEvent, ConnectionId, Direction, Effect, Message, PeerChatResult, RegisteredUser, SessionId,
};
use tracing::{debug, info, warn};

use super::state::CoreState;
use crate::managers::{ClosedOutcome, OpenOutcome, SyncReport};
use crate::registration::RegistrationGateway;

/// Effects and app events produced by one transition
pub type Transition = (Vec<Effect>, Vec<AppEvent>);

/// Command and event handlers for the core logic task
pub struct CommandHandlers;

impl CommandHandlers {
    // ------------------------------------------------------------------------
    // Startup
    // ------------------------------------------------------------------------

    /// Request an identity and start accepting offers
    pub fn handle_startup(state: &mut CoreState) -> Transition {
        let effects = state
            .identity
            .initialize()
            .into_iter()
            .chain(state.connections.listen())
            .collect();
        (effects, Vec::new())
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    pub fn handle_connect(state: &mut CoreState, remote: &str) -> PeerChatResult<Transition> {
        let local = state.identity.require()?.clone();
        let effect = state.connections.connect(&local, remote)?;
        Ok((vec![effect], Vec::new()))
    }

    /// Append, transmit and persist a local message
    pub fn handle_send(state: &mut CoreState, body: String) -> PeerChatResult<(Message, Transition)> {
        let local = state.identity.require()?.clone();
        let (message, effect) = state.connections.send(&local, body)?;

        state.store.append(message.clone());
        state.history.persist(&message);

        let app_events = vec![AppEvent::MessageSent {
            message: message.clone(),
        }];
        Ok((message, (vec![effect], app_events)))
    }

    /// Validate a registration; the backend call happens outside the task
    pub fn handle_register(state: &CoreState, name: &str) -> PeerChatResult<RegisteredUser> {
        let local = state.identity.require()?;
        RegistrationGateway::prepare(name, local.as_str())
    }

    pub fn handle_disconnect(state: &mut CoreState) -> PeerChatResult<Transition> {
        let (connection, effect) = state.connections.disconnect()?;
        let app_events = vec![AppEvent::ConnectionClosed {
            remote: connection.remote,
            reason: "closed locally".to_string(),
        }];
        Ok((vec![effect], app_events))
    }

    pub fn handle_get_conversation(state: &CoreState) -> Vec<Message> {
        state.store.messages().to_vec()
    }

    pub fn handle_shutdown(state: &mut CoreState) -> Transition {
        info!("Closing all channels for shutdown");
        state.history.flush_deferred();
        (state.connections.close_all(), Vec::new())
    }

    // ------------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------------

    pub fn handle_identity_assigned(state: &mut CoreState, id: SessionId) -> Transition {
        (Vec::new(), state.identity.on_assigned(id).into_iter().collect())
    }

    pub fn handle_identity_failed(state: &mut CoreState, reason: String) -> Transition {
        (Vec::new(), state.identity.on_failed(reason).into_iter().collect())
    }

    pub fn handle_connection_offered(
        state: &mut CoreState,
        connection_id: ConnectionId,
        remote: SessionId,
    ) -> Transition {
        (vec![state.connections.on_offer(connection_id, remote)], Vec::new())
    }

    /// Establish the channel and start loading its history
    pub fn handle_channel_opened(
        state: &mut CoreState,
        connection_id: ConnectionId,
        remote: SessionId,
        direction: Direction,
    ) -> Transition {
        let (connection, superseded) =
            match state.connections.on_channel_opened(connection_id, remote, direction) {
                OpenOutcome::Established {
                    connection,
                    superseded,
                } => (connection, superseded),
                OpenOutcome::Unknown => {
                    return (vec![Effect::CloseConnection { connection_id }], Vec::new());
                }
            };

        let mut effects = Vec::new();
        if let Some(previous) = superseded {
            effects.push(Effect::CloseConnection {
                connection_id: previous.connection_id,
            });
        }

        // Live traffic for the new remote must not mix with the previous conversation
        if !state.store.is_scoped_to(&connection.remote) {
            state.store.replace_all(connection.remote.clone(), Vec::new());
        }
        let mark = state.store.len();
        state
            .history
            .load_history(state.identity.current(), Some(&connection.remote), mark);

        let app_events = vec![AppEvent::ConnectionEstablished {
            remote: connection.remote,
            direction: connection.direction,
        }];
        (effects, app_events)
    }

    /// Record inbound data; out-of-band data only joins a conversation it belongs to
    pub fn handle_data_received(
        state: &mut CoreState,
        connection_id: ConnectionId,
        remote: SessionId,
        body: String,
    ) -> Transition {
        let Some(local) = state.identity.current().cloned() else {
            warn!("Dropping data from {} received before identity assignment", remote);
            let error = format!("dropped a message from {} received before identity assignment", remote);
            return (Vec::new(), vec![AppEvent::SystemError { error }]);
        };

        let (message, in_band) = state.connections.on_data(connection_id, &local, remote, body);
        if in_band || state.store.is_scoped_to(&message.sender) {
            state.store.append(message.clone());
        }
        state.history.persist(&message);

        let app_events = vec![AppEvent::MessageReceived {
            message,
            out_of_band: !in_band,
        }];
        (Vec::new(), app_events)
    }

    pub fn handle_channel_closed(
        state: &mut CoreState,
        connection_id: ConnectionId,
        remote: SessionId,
        reason: String,
    ) -> Transition {
        let app_events = match state.connections.on_closed(connection_id) {
            ClosedOutcome::Active(connection) => {
                info!("Connection with {} closed: {}", connection.remote, reason);
                vec![AppEvent::ConnectionClosed {
                    remote: connection.remote,
                    reason,
                }]
            }
            ClosedOutcome::Attempt(attempt) if attempt.direction == Direction::Initiated => {
                warn!("Connection attempt to {} failed: {}", attempt.remote, reason);
                vec![AppEvent::ConnectionFailed {
                    remote: attempt.remote,
                    reason,
                }]
            }
            ClosedOutcome::Attempt(attempt) => {
                debug!("Inbound attempt from {} closed: {}", attempt.remote, reason);
                Vec::new()
            }
            ClosedOutcome::Unknown => {
                debug!("Close for unknown channel {} from {}", connection_id, remote);
                Vec::new()
            }
        };
        (Vec::new(), app_events)
    }

    pub fn handle_signaling_error(error: String) -> Transition {
        warn!("Signaling error: {}", error);
        (Vec::new(), vec![AppEvent::SystemError { error }])
    }

    // ------------------------------------------------------------------------
    // Sync Reports
    // ------------------------------------------------------------------------

    pub fn handle_sync_report(state: &mut CoreState, report: SyncReport) -> Transition {
        match report {
            SyncReport::History(outcome) => {
                let app_events = state
                    .history
                    .apply(outcome, &mut state.store)
                    .into_iter()
                    .collect();
                (Vec::new(), app_events)
            }
            SyncReport::PersistFailed { reason, .. } => {
                (Vec::new(), vec![AppEvent::PersistenceFailed { reason }])
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use peerchat_core::{InMemoryBackend, Origin, PeerChatError};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn id(s: &str) -> SessionId {
        SessionId::new(s).unwrap()
    }

    fn ready_state(local: &str) -> (CoreState, mpsc::Receiver<SyncReport>) {
        let (tx, rx) = mpsc::channel(16);
        let mut state = CoreState::new(Arc::new(InMemoryBackend::new()), tx);
        CommandHandlers::handle_startup(&mut state);
        CommandHandlers::handle_identity_assigned(&mut state, id(local));
        (state, rx)
    }

    fn open_to(state: &mut CoreState, remote: &str) -> ConnectionId {
        let (effects, _) = CommandHandlers::handle_connect(state, remote).unwrap();
        let Effect::InitiateConnection { connection_id, .. } = effects[0].clone() else {
            panic!("expected InitiateConnection");
        };
        CommandHandlers::handle_channel_opened(state, connection_id, id(remote), Direction::Initiated);
        connection_id
    }

    #[tokio::test]
    async fn test_startup_effects() {
        let (tx, _rx) = mpsc::channel(1);
        let mut state = CoreState::new(Arc::new(InMemoryBackend::new()), tx);
        let (effects, _) = CommandHandlers::handle_startup(&mut state);
        assert_eq!(effects, vec![Effect::AcquireIdentity, Effect::StartListening]);
    }

    #[tokio::test]
    async fn test_commands_before_identity_are_pending() {
        let (tx, _rx) = mpsc::channel(1);
        let mut state = CoreState::new(Arc::new(InMemoryBackend::new()), tx);
        CommandHandlers::handle_startup(&mut state);

        assert!(matches!(
            CommandHandlers::handle_connect(&mut state, "R"),
            Err(PeerChatError::IdentityPending)
        ));
        assert!(matches!(
            CommandHandlers::handle_send(&mut state, "hi".into()),
            Err(PeerChatError::IdentityPending)
        ));
        assert!(matches!(
            CommandHandlers::handle_register(&state, "alice"),
            Err(PeerChatError::IdentityPending)
        ));
    }

    #[tokio::test]
    async fn test_send_without_connection_leaves_store_unchanged() {
        let (mut state, _rx) = ready_state("P1");
        let err = CommandHandlers::handle_send(&mut state, "hi".into()).unwrap_err();
        assert!(matches!(err, PeerChatError::NoActiveConnection));
        assert!(state.store.is_empty());
    }

    #[tokio::test]
    async fn test_send_appends_one_local_message() {
        let (mut state, _rx) = ready_state("P1");
        open_to(&mut state, "P2");

        let (message, (effects, events)) =
            CommandHandlers::handle_send(&mut state, "hi".into()).unwrap();
        assert_eq!(message.sender, id("P1"));
        assert_eq!(message.receiver, id("P2"));
        assert_eq!(message.origin, Origin::Local);
        assert_eq!(state.store.messages(), &[message.clone()]);
        assert!(matches!(effects[0], Effect::SendData { .. }));
        assert_eq!(events, vec![AppEvent::MessageSent { message }]);
    }

    #[tokio::test]
    async fn test_switching_remote_rescopes_store() {
        let (mut state, _rx) = ready_state("L");
        let first = open_to(&mut state, "A");
        CommandHandlers::handle_send(&mut state, "to a".into()).unwrap();

        let (effects, _) = CommandHandlers::handle_connect(&mut state, "B").unwrap();
        let Effect::InitiateConnection { connection_id, .. } = effects[0].clone() else {
            panic!("expected InitiateConnection");
        };
        let (effects, events) =
            CommandHandlers::handle_channel_opened(&mut state, connection_id, id("B"), Direction::Initiated);

        assert_eq!(effects, vec![Effect::CloseConnection { connection_id: first }]);
        assert!(matches!(events[0], AppEvent::ConnectionEstablished { ref remote, .. } if remote == &id("B")));
        assert!(state.store.is_scoped_to(&id("B")));
        assert!(state.store.is_empty());
    }

    #[tokio::test]
    async fn test_out_of_band_data_from_other_remote_not_appended() {
        let (mut state, _rx) = ready_state("L");
        open_to(&mut state, "A");

        let (_, events) = CommandHandlers::handle_data_received(
            &mut state,
            ConnectionId::generate(),
            id("Z"),
            "stray".into(),
        );
        assert!(matches!(events[0], AppEvent::MessageReceived { out_of_band: true, .. }));
        assert!(state.store.is_empty());
    }

    #[tokio::test]
    async fn test_data_before_identity_is_reported() {
        let (tx, _rx) = mpsc::channel(1);
        let mut state = CoreState::new(Arc::new(InMemoryBackend::new()), tx);
        CommandHandlers::handle_startup(&mut state);

        let (effects, events) = CommandHandlers::handle_data_received(
            &mut state,
            ConnectionId::generate(),
            id("early"),
            "too soon".into(),
        );
        assert!(effects.is_empty());
        assert!(matches!(events[..], [AppEvent::SystemError { ref error }] if error.contains("early")));
        assert!(state.store.is_empty());
    }

    #[tokio::test]
    async fn test_send_while_history_loads_appears_once() {
        let backend = Arc::new(InMemoryBackend::new());
        let (tx, mut rx) = mpsc::channel(16);
        let mut state = CoreState::new(backend.clone(), tx);
        CommandHandlers::handle_startup(&mut state);
        CommandHandlers::handle_identity_assigned(&mut state, id("P1"));
        open_to(&mut state, "P2");

        CommandHandlers::handle_send(&mut state, "hi".into()).unwrap();
        let report = rx.recv().await.unwrap();
        let (_, events) = CommandHandlers::handle_sync_report(&mut state, report);

        assert!(matches!(events[0], AppEvent::ConversationReplaced { message_count: 1, .. }));
        let bodies: Vec<_> = state.store.messages().iter().map(|m| m.body.clone()).collect();
        assert_eq!(bodies, vec!["hi"]);
        assert_eq!(state.history.deferred_len(), 0);
    }

    #[tokio::test]
    async fn test_unknown_channel_is_closed() {
        let (mut state, _rx) = ready_state("L");
        let cid = ConnectionId::generate();
        let (effects, events) =
            CommandHandlers::handle_channel_opened(&mut state, cid, id("X"), Direction::Accepted);
        assert_eq!(effects, vec![Effect::CloseConnection { connection_id: cid }]);
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_failed_attempt_reports_connection_failed() {
        let (mut state, _rx) = ready_state("L");
        let (effects, _) = CommandHandlers::handle_connect(&mut state, "B").unwrap();
        let Effect::InitiateConnection { connection_id, .. } = effects[0].clone() else {
            panic!("expected InitiateConnection");
        };
        let (_, events) =
            CommandHandlers::handle_channel_closed(&mut state, connection_id, id("B"), "refused".into());
        assert_eq!(
            events,
            vec![AppEvent::ConnectionFailed {
                remote: id("B"),
                reason: "refused".into()
            }]
        );
    }
}
