//! Backend Collaborator Contract
//!
//! Defines the persistence/directory interface the core needs from the backend
//! service, the JSON records exchanged with it, and an in-memory implementation
//! used by tests and offline runs. The REST client lives in `peerchat-backend`.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::{PeerChatError, PeerChatResult, ValidationError};
use crate::types::{Message, Origin, SessionId, Timestamp};

// ----------------------------------------------------------------------------
// Wire Records
// ----------------------------------------------------------------------------

/// Directory entry associating a display name with a session identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredUser {
    pub name: String,
    pub peer_id: SessionId,
}

/// Body of a persistence call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub sender_id: SessionId,
    pub receiver_id: SessionId,
    pub message: String,
}

impl MessageRecord {
    pub fn new(sender_id: SessionId, receiver_id: SessionId, message: impl Into<String>) -> Self {
        Self {
            sender_id,
            receiver_id,
            message: message.into(),
        }
    }
}

impl From<&Message> for MessageRecord {
    fn from(message: &Message) -> Self {
        Self::new(
            message.sender.clone(),
            message.receiver.clone(),
            message.body.clone(),
        )
    }
}

/// Timestamp as the backend reports it: epoch millis or RFC 3339 text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireTimestamp {
    Millis(u64),
    Text(String),
}

impl WireTimestamp {
    pub fn to_timestamp(&self) -> Option<Timestamp> {
        match self {
            WireTimestamp::Millis(ms) => Some(Timestamp::new(*ms)),
            WireTimestamp::Text(text) => Timestamp::parse_rfc3339(text)
                .or_else(|| text.trim().parse::<u64>().ok().map(Timestamp::new)),
        }
    }
}

/// One persisted message as returned by a history fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub sender_id: SessionId,
    pub receiver_id: SessionId,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<WireTimestamp>,
}

impl HistoryRecord {
    /// Map into a conversation message as seen from `local`
    ///
    /// The server timestamp only feeds the display time; order is the
    /// server's order.
    pub fn into_message(self, local: &SessionId) -> Message {
        let origin = if &self.sender_id == local {
            Origin::Local
        } else {
            Origin::Remote
        };
        let timestamp = self.timestamp.as_ref().and_then(WireTimestamp::to_timestamp);
        Message::new(
            self.sender_id,
            self.receiver_id,
            self.message,
            origin,
            timestamp,
        )
    }
}

/// History entry as received, before its identities are checked
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireHistoryRecord {
    #[serde(default)]
    pub sender_id: String,
    #[serde(default)]
    pub receiver_id: String,
    pub message: String,
    #[serde(default)]
    pub timestamp: Option<WireTimestamp>,
}

impl TryFrom<WireHistoryRecord> for HistoryRecord {
    type Error = ValidationError;

    fn try_from(wire: WireHistoryRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            sender_id: SessionId::new(wire.sender_id)?,
            receiver_id: SessionId::new(wire.receiver_id)?,
            message: wire.message,
            timestamp: wire.timestamp,
        })
    }
}

/// Keep the well-formed entries of a fetched history, in order
///
/// An entry with a blank sender or receiver is skipped with a warning rather
/// than failing the whole load.
pub fn valid_history(records: Vec<WireHistoryRecord>) -> Vec<HistoryRecord> {
    records
        .into_iter()
        .enumerate()
        .filter_map(|(index, wire)| match HistoryRecord::try_from(wire) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Skipping history entry {}: {}", index, e);
                None
            }
        })
        .collect()
}

// ----------------------------------------------------------------------------
// Backend Trait
// ----------------------------------------------------------------------------

/// Persistence and directory service used by the core
///
/// Every method is a single round trip. Failures are reported as
/// `PeerChatError::BackendUnavailable` and are never fatal to a session.
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Add a directory entry
    async fn register(&self, user: &RegisteredUser) -> PeerChatResult<()>;

    /// Persist one message
    async fn persist_message(&self, record: &MessageRecord) -> PeerChatResult<()>;

    /// All persisted messages exchanged between `local` and `remote`, oldest first
    async fn fetch_history(
        &self,
        local: &SessionId,
        remote: &SessionId,
    ) -> PeerChatResult<Vec<HistoryRecord>>;
}

// ----------------------------------------------------------------------------
// In-Memory Backend
// ----------------------------------------------------------------------------

/// Count of calls that reached the backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendCalls {
    pub register: usize,
    pub persist: usize,
    pub history: usize,
}

impl BackendCalls {
    pub fn total(&self) -> usize {
        self.register + self.persist + self.history
    }
}

#[derive(Debug, Default)]
struct InMemoryState {
    users: Vec<RegisteredUser>,
    records: Vec<HistoryRecord>,
    calls: BackendCalls,
    fail_register: bool,
    fail_persist: bool,
    fail_history: bool,
}

/// Backend keeping everything in process memory, with switchable failures
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    state: Mutex<InMemoryState>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut InMemoryState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut state)
    }

    /// Insert a record as if it had been persisted earlier
    pub fn seed(&self, record: MessageRecord) {
        self.with_state(|state| state.records.push(stamp(record)));
    }

    pub fn set_fail_register(&self, fail: bool) {
        self.with_state(|state| state.fail_register = fail);
    }

    pub fn set_fail_persist(&self, fail: bool) {
        self.with_state(|state| state.fail_persist = fail);
    }

    pub fn set_fail_history(&self, fail: bool) {
        self.with_state(|state| state.fail_history = fail);
    }

    pub fn calls(&self) -> BackendCalls {
        self.with_state(|state| state.calls)
    }

    pub fn users(&self) -> Vec<RegisteredUser> {
        self.with_state(|state| state.users.clone())
    }

    pub fn records(&self) -> Vec<HistoryRecord> {
        self.with_state(|state| state.records.clone())
    }
}

fn stamp(record: MessageRecord) -> HistoryRecord {
    HistoryRecord {
        sender_id: record.sender_id,
        receiver_id: record.receiver_id,
        message: record.message,
        timestamp: Some(WireTimestamp::Text(
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        )),
    }
}

#[async_trait]
impl BackendClient for InMemoryBackend {
    async fn register(&self, user: &RegisteredUser) -> PeerChatResult<()> {
        self.with_state(|state| {
            state.calls.register += 1;
            if state.fail_register {
                return Err(PeerChatError::backend_unavailable("register rejected"));
            }
            state.users.push(user.clone());
            Ok(())
        })
    }

    async fn persist_message(&self, record: &MessageRecord) -> PeerChatResult<()> {
        self.with_state(|state| {
            state.calls.persist += 1;
            if state.fail_persist {
                return Err(PeerChatError::backend_unavailable("persist rejected"));
            }
            state.records.push(stamp(record.clone()));
            Ok(())
        })
    }

    async fn fetch_history(
        &self,
        local: &SessionId,
        remote: &SessionId,
    ) -> PeerChatResult<Vec<HistoryRecord>> {
        self.with_state(|state| {
            state.calls.history += 1;
            if state.fail_history {
                return Err(PeerChatError::backend_unavailable("history unavailable"));
            }
            Ok(state
                .records
                .iter()
                .filter(|r| {
                    (&r.sender_id == local && &r.receiver_id == remote)
                        || (&r.sender_id == remote && &r.receiver_id == local)
                })
                .cloned()
                .collect())
        })
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
