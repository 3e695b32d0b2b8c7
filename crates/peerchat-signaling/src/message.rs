//! Wire formats: PeerJS server messages and direct channel frames

use peerchat_core::ConnectionId;
use serde::{Deserialize, Serialize};

use super::error::SignalingError;

// ----------------------------------------------------------------------------
// Signaling Server Messages
// ----------------------------------------------------------------------------

/// Message exchanged with a PeerJS-compatible server over the WebSocket
///
/// Relay messages carry `src`/`dst` identities. Clients leave `src` out and
/// the server fills it in when relaying.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING-KEBAB-CASE")]
pub enum ServerMessage {
    Open,
    IdTaken {
        #[serde(default)]
        payload: Option<ErrorPayload>,
    },
    Error {
        #[serde(default)]
        payload: Option<ErrorPayload>,
    },
    Heartbeat,
    Offer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        src: Option<String>,
        dst: String,
        payload: OfferPayload,
    },
    Answer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        src: Option<String>,
        dst: String,
        payload: AnswerPayload,
    },
    Leave {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        src: Option<String>,
        dst: String,
    },
    /// A relayed message could not be delivered to `src`
    Expire {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        src: Option<String>,
        #[serde(default)]
        dst: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    #[serde(default)]
    pub msg: String,
}

/// Offer to open a direct channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferPayload {
    pub connection_id: ConnectionId,
    /// `host:port` the initiator is listening on
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerPayload {
    pub connection_id: ConnectionId,
    pub accepted: bool,
}

impl ServerMessage {
    pub fn offer(dst: &str, connection_id: ConnectionId, address: String) -> Self {
        ServerMessage::Offer {
            src: None,
            dst: dst.to_string(),
            payload: OfferPayload {
                connection_id,
                address,
            },
        }
    }

    pub fn answer(dst: &str, connection_id: ConnectionId, accepted: bool) -> Self {
        ServerMessage::Answer {
            src: None,
            dst: dst.to_string(),
            payload: AnswerPayload {
                connection_id,
                accepted,
            },
        }
    }

    pub fn leave(dst: &str) -> Self {
        ServerMessage::Leave {
            src: None,
            dst: dst.to_string(),
        }
    }

    pub fn to_json(&self) -> Result<String, SignalingError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, SignalingError> {
        Ok(serde_json::from_str(text)?)
    }
}

// ----------------------------------------------------------------------------
// Direct Channel Frames
// ----------------------------------------------------------------------------

/// One line on a direct channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame {
    /// First frame from the dialing side
    Hello {
        #[serde(rename = "connectionId")]
        connection_id: ConnectionId,
        from: String,
    },
    Data { body: String },
    Bye,
}

impl Frame {
    /// Encode as one newline-terminated line
    pub fn encode(&self) -> Result<String, SignalingError> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    pub fn decode(line: &str) -> Result<Self, SignalingError> {
        Ok(serde_json::from_str(line.trim_end())?)
    }
}
