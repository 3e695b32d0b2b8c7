//! Channel Communication Protocol Types
//!
//! All inter-task communication flows through these message types:
//! - `Command`: front end → core logic, each carrying a reply slot
//! - `Event`: signaling task → core logic
//! - `Effect`: core logic → signaling task (broadcast)
//! - `AppEvent`: core logic → front end

use core::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::errors::PeerChatResult;
use crate::types::{ConnectionId, Direction, Message, SessionId};

/// Reply slot attached to a command
pub type Responder<T> = oneshot::Sender<PeerChatResult<T>>;

// ----------------------------------------------------------------------------
// Command: Front End → Core Logic
// ----------------------------------------------------------------------------

/// Requests from the front end to the core logic task
#[derive(Debug)]
pub enum Command {
    /// Open a direct channel to `remote`; replies once the attempt is issued
    Connect {
        remote: String,
        reply: Responder<()>,
    },
    /// Send a message over the active channel
    Send {
        body: String,
        reply: Responder<Message>,
    },
    /// Register a display name for the current identity
    Register {
        name: String,
        reply: Responder<()>,
    },
    /// Close the active channel
    Disconnect { reply: Responder<()> },
    /// Snapshot of the conversation store
    GetConversation { reply: Responder<Vec<Message>> },
    GetStatus { reply: Responder<RuntimeStatus> },
    /// Stop the core logic task
    Shutdown,
}

impl Command {
    /// Short name for log lines
    pub fn name(&self) -> &'static str {
        match self {
            Command::Connect { .. } => "connect",
            Command::Send { .. } => "send",
            Command::Register { .. } => "register",
            Command::Disconnect { .. } => "disconnect",
            Command::GetConversation { .. } => "get_conversation",
            Command::GetStatus { .. } => "get_status",
            Command::Shutdown => "shutdown",
        }
    }
}

// ----------------------------------------------------------------------------
// Event: Signaling → Core Logic
// ----------------------------------------------------------------------------

/// Observations reported by the signaling task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// The signaling service assigned our identity
    IdentityAssigned { id: SessionId },
    /// Identity acquisition failed
    IdentityFailed { reason: String },
    /// A remote peer offered a direct channel
    ConnectionOffered {
        connection_id: ConnectionId,
        remote: SessionId,
    },
    /// A direct channel is open and ready for data
    ChannelOpened {
        connection_id: ConnectionId,
        remote: SessionId,
        direction: Direction,
    },
    /// A payload arrived on a direct channel
    DataReceived {
        connection_id: ConnectionId,
        remote: SessionId,
        body: String,
    },
    /// A direct channel closed or could not be opened
    ChannelClosed {
        connection_id: ConnectionId,
        remote: SessionId,
        reason: String,
    },
    /// Non-fatal signaling problem
    SignalingError { error: String },
}

// ----------------------------------------------------------------------------
// Effect: Core Logic → Signaling
// ----------------------------------------------------------------------------

/// External side effects requested by the core logic task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    /// Obtain an identity from the signaling service
    AcquireIdentity,
    /// Start accepting inbound offers
    StartListening,
    StopListening,
    /// Offer a direct channel to `remote`
    InitiateConnection {
        connection_id: ConnectionId,
        remote: SessionId,
    },
    /// Complete an inbound offer
    AcceptConnection {
        connection_id: ConnectionId,
        remote: SessionId,
    },
    SendData {
        connection_id: ConnectionId,
        body: String,
    },
    /// Close a channel, or decline/abandon an attempt
    CloseConnection { connection_id: ConnectionId },
}

// ----------------------------------------------------------------------------
// AppEvent: Core Logic → Front End
// ----------------------------------------------------------------------------

/// State changes the front end needs to know about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppEvent {
    /// Fired once when the identity is assigned
    IdentityReady { id: SessionId },
    IdentityFailed { reason: String },
    ConnectionEstablished {
        remote: SessionId,
        direction: Direction,
    },
    /// An outbound attempt closed before it opened
    ConnectionFailed { remote: SessionId, reason: String },
    ConnectionClosed { remote: SessionId, reason: String },
    MessageSent { message: Message },
    /// `out_of_band` is set when the data arrived on a connection other than the active one
    MessageReceived { message: Message, out_of_band: bool },
    /// The conversation was replaced by a history load
    ConversationReplaced {
        remote: SessionId,
        message_count: usize,
    },
    HistoryUnavailable { remote: SessionId, reason: String },
    PersistenceFailed { reason: String },
    SystemError { error: String },
}

// ----------------------------------------------------------------------------
// Supporting Types
// ----------------------------------------------------------------------------

/// Status report returned for `Command::GetStatus`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeStatus {
    pub identity: Option<SessionId>,
    pub identity_failed: bool,
    pub listening: bool,
    pub active_remote: Option<SessionId>,
    pub active_direction: Option<Direction>,
    pub pending_attempts: usize,
    pub message_count: usize,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub history_loads: u64,
}

impl fmt::Display for RuntimeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.identity {
            Some(id) => write!(f, "id={}", id)?,
            None if self.identity_failed => write!(f, "id=<failed>")?,
            None => write!(f, "id=<pending>")?,
        }
        match (&self.active_remote, &self.active_direction) {
            (Some(remote), Some(direction)) => write!(f, " peer={} ({})", remote, direction)?,
            (Some(remote), None) => write!(f, " peer={}", remote)?,
            _ => write!(f, " peer=<none>")?,
        }
        write!(
            f,
            " messages={} sent={} received={}",
            self.message_count, self.messages_sent, self.messages_received
        )
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
