//! PeerChat Core
//!
//! This crate provides the foundational types, the typed channel protocol and the
//! conversation store for PeerChat direct messaging. Network collaborators (the
//! signaling service and the persistence backend) are described here as traits;
//! concrete implementations live in their respective crates.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod backend;
pub mod channel;
pub mod config;
pub mod conversation;
pub mod errors;
pub mod signaling_task;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use backend::{
    valid_history, BackendCalls, BackendClient, HistoryRecord, InMemoryBackend, MessageRecord,
    RegisteredUser, WireHistoryRecord, WireTimestamp,
};
pub use channel::{
    create_app_event_channel, create_command_channel, create_effect_channel,
    create_effect_receiver, create_event_channel, AppEvent, AppEventReceiver, AppEventSender,
    ChannelError, Command, CommandReceiver, CommandSender, Effect, EffectReceiver, EffectSender,
    Event, EventReceiver, EventSender, NonBlockingSend, Responder, RuntimeStatus,
};
pub use config::{
    BackendEndpoint, ChannelConfig, DirectChannelConfig, PeerChatConfig, SignalingEndpoint,
};
pub use conversation::{Conversation, ConversationStore, StoreStats};
pub use errors::{PeerChatError, PeerChatResult, Result, TransportError, ValidationError};
pub use signaling_task::SignalingTask;
pub use types::{ConnectionId, Direction, Message, Origin, SessionId, Timestamp};
