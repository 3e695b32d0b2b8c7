//! Channel Utilities
//!
//! Type aliases and constructors for the tokio channels that connect the
//! runtime tasks. Effects use a broadcast channel so every signaling task
//! subscribed to it sees each effect.

use core::fmt;

use tokio::sync::{broadcast, mpsc};

use crate::channel::communication::{AppEvent, Command, Effect, Event};
use crate::config::ChannelConfig;
use crate::errors::PeerChatError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    ChannelFull,
    ChannelClosed,
    ReceiverDropped,
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelError::ChannelFull => write!(f, "Channel buffer is full"),
            ChannelError::ChannelClosed => write!(f, "Channel is closed"),
            ChannelError::ReceiverDropped => write!(f, "Channel receiver was dropped"),
        }
    }
}

impl std::error::Error for ChannelError {}

impl From<ChannelError> for PeerChatError {
    fn from(err: ChannelError) -> Self {
        PeerChatError::channel_error(err.to_string())
    }
}

pub type CommandSender = mpsc::Sender<Command>;
pub type CommandReceiver = mpsc::Receiver<Command>;
pub type EventSender = mpsc::Sender<Event>;
pub type EventReceiver = mpsc::Receiver<Event>;
pub type EffectSender = broadcast::Sender<Effect>;
pub type EffectReceiver = broadcast::Receiver<Effect>;
pub type AppEventSender = mpsc::Sender<AppEvent>;
pub type AppEventReceiver = mpsc::Receiver<AppEvent>;

// ----------------------------------------------------------------------------
// Channel Creation Utilities
// ----------------------------------------------------------------------------

/// Create bounded command channel (Front End → Core Logic)
pub fn create_command_channel(config: &ChannelConfig) -> (CommandSender, CommandReceiver) {
    mpsc::channel(config.command_buffer_size)
}

/// Create bounded event channel (Signaling → Core Logic)
pub fn create_event_channel(config: &ChannelConfig) -> (EventSender, EventReceiver) {
    mpsc::channel(config.event_buffer_size)
}

/// Create broadcast effect channel (Core Logic → Signaling tasks)
///
/// Signaling tasks should get their own receiver through `create_effect_receiver`.
pub fn create_effect_channel(config: &ChannelConfig) -> (EffectSender, EffectReceiver) {
    broadcast::channel(config.effect_buffer_size)
}

/// Subscribe a new receiver to the effect broadcast
pub fn create_effect_receiver(effect_sender: &EffectSender) -> EffectReceiver {
    effect_sender.subscribe()
}

/// Create bounded app event channel (Core Logic → Front End)
pub fn create_app_event_channel(config: &ChannelConfig) -> (AppEventSender, AppEventReceiver) {
    mpsc::channel(config.app_event_buffer_size)
}

// ----------------------------------------------------------------------------
// Non-blocking Send Utilities
// ----------------------------------------------------------------------------

/// Non-blocking send so the core loop never waits on a slow consumer
pub trait NonBlockingSend<T> {
    fn try_send_non_blocking(&self, message: T) -> Result<(), ChannelError>;
}

impl<T> NonBlockingSend<T> for mpsc::Sender<T> {
    fn try_send_non_blocking(&self, message: T) -> Result<(), ChannelError> {
        self.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ChannelError::ChannelFull,
            mpsc::error::TrySendError::Closed(_) => ChannelError::ChannelClosed,
        })
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
