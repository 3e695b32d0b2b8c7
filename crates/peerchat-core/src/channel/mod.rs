//! Channel Module
//!
//! This module contains the channel fabric connecting the runtime tasks:
//! - `communication`: commands, events, effects and app events
//! - `utils`: channel type aliases and constructors

pub mod communication;
pub mod utils;

pub use communication::{AppEvent, Command, Effect, Event, Responder, RuntimeStatus};

pub use crate::config::ChannelConfig;

pub use utils::{
    create_app_event_channel, create_command_channel, create_effect_channel,
    create_effect_receiver, create_event_channel, AppEventReceiver, AppEventSender, ChannelError,
    CommandReceiver, CommandSender, EffectReceiver, EffectSender, EventReceiver, EventSender,
    NonBlockingSend,
};
