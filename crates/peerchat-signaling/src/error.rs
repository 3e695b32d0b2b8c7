//! Error types for the PeerJS signaling task

use peerchat_core::{ConnectionId, PeerChatError, TransportError};
use thiserror::Error;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors specific to the signaling task and direct channels
#[derive(Error, Debug)]
pub enum SignalingError {
    #[error("Identity request failed: {0}")]
    IdentityRequest(#[from] reqwest::Error),

    #[error("Server returned an invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("Failed to connect to signaling server: {0}")]
    SocketConnect(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Identity is already taken: {id}")]
    IdTaken { id: String },

    #[error("Signaling server error: {message}")]
    Server { message: String },

    #[error("Signaling socket closed before the session opened")]
    SocketClosed,

    #[error("Malformed signaling message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Direct channel I/O failed: {0}")]
    ChannelIo(#[from] std::io::Error),

    #[error("Direct channel handshake failed: {reason}")]
    Handshake { reason: String },

    #[error("No offer recorded for connection {connection_id}")]
    UnknownOffer { connection_id: ConnectionId },
}

impl From<SignalingError> for PeerChatError {
    fn from(err: SignalingError) -> Self {
        match err {
            SignalingError::IdTaken { .. }
            | SignalingError::IdentityRequest(_)
            | SignalingError::InvalidIdentity(_) => PeerChatError::identity_failure(err.to_string()),
            SignalingError::ChannelIo(e) => PeerChatError::Transport(TransportError::NetworkIo(e)),
            SignalingError::Handshake { reason } => PeerChatError::protocol_violation(reason),
            SignalingError::Malformed(e) => PeerChatError::protocol_violation(e.to_string()),
            SignalingError::UnknownOffer { connection_id } => {
                PeerChatError::Transport(TransportError::UnknownConnection {
                    connection_id: connection_id.to_string(),
                })
            }
            other => PeerChatError::Transport(TransportError::SignalingRejected {
                reason: other.to_string(),
            }),
        }
    }
}
