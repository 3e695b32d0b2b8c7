//! PeerChat Runtime Engine
//!
//! This crate contains the runtime engine for PeerChat:
//! - `PeerChatRuntime`: wires the core logic task to the signaling tasks
//! - `CoreLogicTask`: the single owner of session state
//! - Identity, connection and history managers
//! - The registration gateway
//!
//! `peerchat-core` provides the stable types and traits; this crate drives them.

pub mod handle;
pub mod logic;
pub mod managers;
pub mod registration;
mod runtime;

pub use handle::PeerChatHandle;
pub use managers::*;
pub use registration::RegistrationGateway;
pub use runtime::*;

// Re-export core types for convenience
pub use peerchat_core::{
    AppEvent, AppEventReceiver, BackendClient, Command, Direction, Effect, Event, Message, Origin,
    PeerChatConfig, PeerChatError, PeerChatResult, RuntimeStatus, SessionId, SignalingTask,
};
