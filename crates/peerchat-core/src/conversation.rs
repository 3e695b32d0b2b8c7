//! Conversation Store
//!
//! The in-memory ordered log of messages for the current session. The store is
//! owned by the core logic task, which is its only writer; readers get
//! snapshots. Ordering is arrival order: a wholesale replacement (history
//! load) followed by appends (live traffic). There is no per-message removal.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{Message, SessionId};

// ----------------------------------------------------------------------------
// Conversation Snapshot
// ----------------------------------------------------------------------------

/// Ordered messages exchanged with one remote identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub local: SessionId,
    pub remote: SessionId,
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn new(local: SessionId, remote: SessionId, messages: Vec<Message>) -> Self {
        Self {
            local,
            remote,
            messages,
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

// ----------------------------------------------------------------------------
// Conversation Store
// ----------------------------------------------------------------------------

/// Store statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub replacements: u64,
    pub appends: u64,
}

/// Single source of truth for the conversation being displayed
#[derive(Debug, Default)]
pub struct ConversationStore {
    /// Remote identity the current messages belong to
    remote: Option<SessionId>,
    messages: Vec<Message>,
    stats: StoreStats,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole conversation, re-scoping it to `remote`
    pub fn replace_all(&mut self, remote: SessionId, messages: Vec<Message>) {
        debug!(
            "Replacing conversation ({} messages) with {} messages for {}",
            self.messages.len(),
            messages.len(),
            remote.short()
        );
        self.remote = Some(remote);
        self.messages = messages;
        self.stats.replacements += 1;
    }

    /// Append one live message at the end of the log
    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
        self.stats.appends += 1;
    }

    /// All messages in display order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Messages appended at or after position `mark`
    pub fn messages_since(&self, mark: usize) -> &[Message] {
        let start = mark.min(self.messages.len());
        &self.messages[start..]
    }

    pub fn remote(&self) -> Option<&SessionId> {
        self.remote.as_ref()
    }

    /// Whether the store is currently scoped to `remote`
    pub fn is_scoped_to(&self, remote: &SessionId) -> bool {
        self.remote.as_ref() == Some(remote)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn stats(&self) -> &StoreStats {
        &self.stats
    }

    /// Owned copy of the current conversation, if it is scoped to a remote
    pub fn snapshot(&self, local: &SessionId) -> Option<Conversation> {
        self.remote
            .as_ref()
            .map(|remote| Conversation::new(local.clone(), remote.clone(), self.messages.clone()))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
