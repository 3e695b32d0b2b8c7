//! Direct channel lifecycle management
//!
//! The `ConnectionController` tracks the single active channel and the attempts
//! still in flight. Any channel that opens becomes the active one, even if a
//! newer attempt is pending; the channel it replaces is closed.

use std::collections::HashMap;

use peerchat_core::{
    ConnectionId, Direction, Effect, Message, PeerChatError, PeerChatResult, SessionId,
    ValidationError,
};
use tracing::{debug, info, warn};

// ----------------------------------------------------------------------------
// Connection Types
// ----------------------------------------------------------------------------

/// One direct channel to a remote identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerConnection {
    pub connection_id: ConnectionId,
    pub remote: SessionId,
    pub direction: Direction,
    pub open: bool,
}

/// Result of a channel-opened report
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenOutcome {
    Established {
        connection: PeerConnection,
        /// Previously active channel that this one replaces
        superseded: Option<PeerConnection>,
    },
    /// No attempt with this id is known
    Unknown,
}

/// Result of a channel-closed report
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClosedOutcome {
    Active(PeerConnection),
    /// An attempt that never opened
    Attempt(PeerConnection),
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    pub attempts_initiated: u64,
    pub offers_accepted: u64,
    pub offers_declined: u64,
    pub established: u64,
    pub superseded: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub out_of_band: u64,
}

// ----------------------------------------------------------------------------
// Connection Controller
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct ConnectionController {
    listening: bool,
    active: Option<PeerConnection>,
    attempts: HashMap<ConnectionId, PeerConnection>,
    stats: ConnectionStats,
}

impl ConnectionController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable acceptance of inbound offers
    pub fn listen(&mut self) -> Option<Effect> {
        if self.listening {
            return None;
        }
        self.listening = true;
        Some(Effect::StartListening)
    }

    pub fn stop_listening(&mut self) -> Option<Effect> {
        if !self.listening {
            return None;
        }
        self.listening = false;
        Some(Effect::StopListening)
    }

    /// Start an outbound attempt to `remote`
    pub fn connect(&mut self, local: &SessionId, remote: &str) -> PeerChatResult<Effect> {
        let remote = SessionId::new(remote).map_err(|_| PeerChatError::empty_field("remote"))?;
        if &remote == local {
            return Err(ValidationError::SelfConnection {
                id: remote.to_string(),
            }
            .into());
        }

        let connection_id = ConnectionId::generate();
        info!("Connecting to {} (connection {})", remote, connection_id);
        self.attempts.insert(
            connection_id,
            PeerConnection {
                connection_id,
                remote: remote.clone(),
                direction: Direction::Initiated,
                open: false,
            },
        );
        self.stats.attempts_initiated += 1;
        Ok(Effect::InitiateConnection {
            connection_id,
            remote,
        })
    }

    /// React to an inbound offer: accept while listening, decline otherwise
    pub fn on_offer(&mut self, connection_id: ConnectionId, remote: SessionId) -> Effect {
        if !self.listening {
            warn!("Declining offer from {}: not listening", remote);
            self.stats.offers_declined += 1;
            return Effect::CloseConnection { connection_id };
        }

        info!("Accepting offer from {} (connection {})", remote, connection_id);
        self.attempts.insert(
            connection_id,
            PeerConnection {
                connection_id,
                remote: remote.clone(),
                direction: Direction::Accepted,
                open: false,
            },
        );
        self.stats.offers_accepted += 1;
        Effect::AcceptConnection {
            connection_id,
            remote,
        }
    }

    /// A channel opened. Last event wins: it replaces whatever was active.
    pub fn on_channel_opened(
        &mut self,
        connection_id: ConnectionId,
        remote: SessionId,
        direction: Direction,
    ) -> OpenOutcome {
        let Some(attempt) = self.attempts.remove(&connection_id) else {
            warn!("Channel {} opened without a matching attempt", connection_id);
            return OpenOutcome::Unknown;
        };
        if attempt.remote != remote || attempt.direction != direction {
            warn!(
                "Channel {} opened as {} ({}), attempt was {} ({})",
                connection_id, remote, direction, attempt.remote, attempt.direction
            );
        }

        let connection = PeerConnection {
            connection_id,
            remote,
            direction,
            open: true,
        };
        let superseded = self.active.replace(connection.clone());
        if let Some(previous) = &superseded {
            info!(
                "Channel to {} supersedes channel to {}",
                connection.remote, previous.remote
            );
            self.stats.superseded += 1;
        }
        self.stats.established += 1;
        info!(
            "Connection established with {} ({})",
            connection.remote, connection.direction
        );
        OpenOutcome::Established {
            connection,
            superseded,
        }
    }

    /// Prepare an outbound message on the active channel
    pub fn send(&mut self, local: &SessionId, body: String) -> PeerChatResult<(Message, Effect)> {
        let active = self.active.as_ref().ok_or(PeerChatError::NoActiveConnection)?;
        if body.trim().is_empty() {
            return Err(PeerChatError::empty_field("body"));
        }

        let message = Message::local(local.clone(), active.remote.clone(), body.clone());
        self.stats.messages_sent += 1;
        Ok((
            message,
            Effect::SendData {
                connection_id: active.connection_id,
                body,
            },
        ))
    }

    /// Turn inbound data into a message; the flag is false for out-of-band data
    pub fn on_data(
        &mut self,
        connection_id: ConnectionId,
        local: &SessionId,
        remote: SessionId,
        body: String,
    ) -> (Message, bool) {
        let in_band = self
            .active
            .as_ref()
            .is_some_and(|active| active.connection_id == connection_id);
        if in_band {
            self.stats.messages_received += 1;
        } else {
            debug!("Out-of-band data from {} on {}", remote, connection_id);
            self.stats.out_of_band += 1;
        }
        (Message::remote(remote, local.clone(), body), in_band)
    }

    /// A channel or attempt closed on the transport side
    pub fn on_closed(&mut self, connection_id: ConnectionId) -> ClosedOutcome {
        if self
            .active
            .as_ref()
            .is_some_and(|active| active.connection_id == connection_id)
        {
            if let Some(mut closed) = self.active.take() {
                closed.open = false;
                return ClosedOutcome::Active(closed);
            }
        }
        match self.attempts.remove(&connection_id) {
            Some(attempt) => ClosedOutcome::Attempt(attempt),
            None => ClosedOutcome::Unknown,
        }
    }

    /// Close the active channel on request
    pub fn disconnect(&mut self) -> PeerChatResult<(PeerConnection, Effect)> {
        let mut connection = self.active.take().ok_or(PeerChatError::NoActiveConnection)?;
        connection.open = false;
        info!("Disconnecting from {}", connection.remote);
        let effect = Effect::CloseConnection {
            connection_id: connection.connection_id,
        };
        Ok((connection, effect))
    }

    /// Effects that tear down every channel and attempt
    pub fn close_all(&mut self) -> Vec<Effect> {
        let mut effects: Vec<Effect> = self
            .active
            .take()
            .into_iter()
            .map(|c| c.connection_id)
            .chain(self.attempts.drain().map(|(id, _)| id))
            .map(|connection_id| Effect::CloseConnection { connection_id })
            .collect();
        effects.extend(self.stop_listening());
        effects
    }

    pub fn active(&self) -> Option<&PeerConnection> {
        self.active.as_ref()
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    pub fn pending_attempts(&self) -> usize {
        self.attempts.len()
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
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

    fn established(controller: &mut ConnectionController, remote: &str) -> ConnectionId {
        let Effect::InitiateConnection { connection_id, .. } =
            controller.connect(&id("L"), remote).unwrap()
        else {
            panic!("expected InitiateConnection");
        };
        controller.on_channel_opened(connection_id, id(remote), Direction::Initiated);
        connection_id
    }

    #[test]
    fn test_connect_validation() {
        let mut controller = ConnectionController::new();
        let err = controller.connect(&id("L"), "  ").unwrap_err();
        assert!(err.is_validation());

        let err = controller.connect(&id("L"), "L").unwrap_err();
        assert!(matches!(
            err,
            PeerChatError::Validation(ValidationError::SelfConnection { .. })
        ));
        assert_eq!(controller.pending_attempts(), 0);
    }

    #[test]
    fn test_send_requires_active_connection() {
        let mut controller = ConnectionController::new();
        let err = controller.send(&id("L"), "hi".into()).unwrap_err();
        assert!(matches!(err, PeerChatError::NoActiveConnection));
    }

    #[test]
    fn test_send_rejects_empty_body() {
        let mut controller = ConnectionController::new();
        established(&mut controller, "R");
        assert!(controller.send(&id("L"), "   ".into()).unwrap_err().is_validation());

        let (message, effect) = controller.send(&id("L"), "hi".into()).unwrap();
        assert_eq!(message.receiver, id("R"));
        assert!(matches!(effect, Effect::SendData { ref body, .. } if body == "hi"));
    }

    #[test]
    fn test_offer_declined_unless_listening() {
        let mut controller = ConnectionController::new();
        let cid = ConnectionId::generate();
        assert_eq!(
            controller.on_offer(cid, id("R")),
            Effect::CloseConnection { connection_id: cid }
        );

        assert_eq!(controller.listen(), Some(Effect::StartListening));
        assert!(matches!(
            controller.on_offer(cid, id("R")),
            Effect::AcceptConnection { .. }
        ));
        assert_eq!(controller.stats().offers_declined, 1);
    }

    #[test]
    fn test_last_opened_channel_wins() {
        let mut controller = ConnectionController::new();
        let first = established(&mut controller, "A");

        let Effect::InitiateConnection { connection_id, .. } =
            controller.connect(&id("L"), "B").unwrap()
        else {
            panic!("expected InitiateConnection");
        };
        match controller.on_channel_opened(connection_id, id("B"), Direction::Initiated) {
            OpenOutcome::Established { connection, superseded } => {
                assert_eq!(connection.remote, id("B"));
                assert_eq!(superseded.unwrap().connection_id, first);
            }
            OpenOutcome::Unknown => panic!("attempt should be known"),
        }
        assert_eq!(controller.stats().superseded, 1);
    }

    #[test]
    fn test_out_of_band_data_is_flagged() {
        let mut controller = ConnectionController::new();
        let active = established(&mut controller, "A");

        let (_, in_band) = controller.on_data(active, &id("L"), id("A"), "x".into());
        assert!(in_band);
        let (message, in_band) =
            controller.on_data(ConnectionId::generate(), &id("L"), id("Z"), "y".into());
        assert!(!in_band);
        assert_eq!(message.sender, id("Z"));
        assert_eq!(controller.stats().out_of_band, 1);
    }

    #[test]
    fn test_close_reports() {
        let mut controller = ConnectionController::new();
        let active = established(&mut controller, "A");
        let Effect::InitiateConnection { connection_id: attempt, .. } =
            controller.connect(&id("L"), "B").unwrap()
        else {
            panic!("expected InitiateConnection");
        };

        assert!(matches!(controller.on_closed(attempt), ClosedOutcome::Attempt(_)));
        assert!(matches!(controller.on_closed(active), ClosedOutcome::Active(ref c) if !c.open));
        assert_eq!(controller.on_closed(active), ClosedOutcome::Unknown);
        assert!(controller.active().is_none());
    }

    #[test]
    fn test_close_all_and_disconnect() {
        let mut controller = ConnectionController::new();
        controller.listen();
        established(&mut controller, "A");
        controller.connect(&id("L"), "B").unwrap();

        let effects = controller.close_all();
        assert_eq!(effects.len(), 3);
        assert_eq!(effects.last(), Some(&Effect::StopListening));
        assert!(matches!(
            controller.disconnect(),
            Err(PeerChatError::NoActiveConnection)
        ));
    }
}
