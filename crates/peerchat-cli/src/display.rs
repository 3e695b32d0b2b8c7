//! Text rendering of messages and session events

use peerchat_core::{AppEvent, Message, Origin};

/// `[HH:MM] me: body` for our messages, the sender's identity otherwise
pub fn format_message(message: &Message) -> String {
    let who = match message.origin {
        Origin::Local => "me",
        Origin::Remote => message.sender.as_str(),
    };
    format!("[{}] {}: {}", message.display_time, who, message.body)
}

pub fn format_event(event: &AppEvent) -> String {
    match event {
        AppEvent::IdentityReady { id } => format!("* your id is {}", id),
        AppEvent::IdentityFailed { reason } => format!("! could not obtain an id: {}", reason),
        AppEvent::ConnectionEstablished { remote, direction } => {
            format!("* connected to {} ({})", remote, direction)
        }
        AppEvent::ConnectionFailed { remote, reason } => {
            format!("! could not connect to {}: {}", remote, reason)
        }
        AppEvent::ConnectionClosed { remote, reason } => {
            format!("* connection to {} closed: {}", remote, reason)
        }
        AppEvent::MessageSent { message } => format_message(message),
        AppEvent::MessageReceived {
            message,
            out_of_band: false,
        } => format_message(message),
        AppEvent::MessageReceived {
            message,
            out_of_band: true,
        } => format!("(elsewhere) {}", format_message(message)),
        AppEvent::ConversationReplaced {
            remote,
            message_count,
        } => format!("* history with {}: {} message(s)", remote, message_count),
        AppEvent::HistoryUnavailable { remote, reason } => {
            format!("! history with {} unavailable: {}", remote, reason)
        }
        AppEvent::PersistenceFailed { reason } => format!("! message not saved: {}", reason),
        AppEvent::SystemError { error } => format!("! {}", error),
    }
}

pub const HELP: &str = "\
commands:
  /connect <id>     open a conversation with a peer
  /disconnect       close the current conversation
  /register <name>  publish a display name for your id
  /history          print the current conversation
  /status           show session status
  /help             show this help
  /quit             leave
anything else is sent to the connected peer";
