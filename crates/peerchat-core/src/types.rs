//! Core types for PeerChat
//!
//! This module defines the fundamental types used throughout the system,
//! using newtype patterns for semantic validation and type safety.

use core::fmt;
use core::ops::Deref;
use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{PeerChatError, ValidationError};

// ----------------------------------------------------------------------------
// Session Identity
// ----------------------------------------------------------------------------

/// Opaque identity assigned to this process by the signaling service
///
/// A `SessionId` is never empty; construction from blank input is rejected.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Create a new SessionId, rejecting blank input
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyField { field: "session_id" });
        }
        if trimmed.len() == id.len() {
            Ok(Self(id))
        } else {
            Ok(Self(trimmed.to_string()))
        }
    }

    /// Get the identity as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix for log lines
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(8)
            .map(|(idx, _)| idx)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionId {
    type Err = PeerChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s)?)
    }
}

impl TryFrom<String> for SessionId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

impl Deref for SessionId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// ----------------------------------------------------------------------------
// Connection Identifier
// ----------------------------------------------------------------------------

/// Identifier of one direct channel attempt, shared by both ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generate a fresh random connection id
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ConnectionId {
    type Err = PeerChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| PeerChatError::protocol_violation(format!("invalid connection id: {}", e)))
    }
}

// ----------------------------------------------------------------------------
// Timestamp
// ----------------------------------------------------------------------------

/// Milliseconds since the Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    pub fn new(millis: u64) -> Self {
        Self(millis)
    }

    /// Current wall-clock time
    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis().max(0) as u64)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Parse an RFC 3339 timestamp as produced by the backend
    pub fn parse_rfc3339(text: &str) -> Option<Self> {
        DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|dt| Self(dt.timestamp_millis().max(0) as u64))
    }

    /// Format as `HH:MM` (UTC) for display next to a message
    pub fn display_time(&self) -> String {
        match DateTime::<Utc>::from_timestamp_millis(self.0 as i64) {
            Some(dt) => dt.format("%H:%M").to_string(),
            None => String::new(),
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ----------------------------------------------------------------------------
// Message Metadata
// ----------------------------------------------------------------------------

/// Which side of the conversation authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Local,
    Remote,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Local => write!(f, "local"),
            Origin::Remote => write!(f, "remote"),
        }
    }
}

/// How a direct channel came about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// The remote peer offered, we accepted
    Accepted,
    /// We offered, the remote peer accepted
    Initiated,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Accepted => write!(f, "accepted"),
            Direction::Initiated => write!(f, "initiated"),
        }
    }
}

// ----------------------------------------------------------------------------
// Message
// ----------------------------------------------------------------------------

/// One chat message. Never mutated once it is part of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub sender: SessionId,
    pub receiver: SessionId,
    pub body: String,
    pub origin: Origin,
    pub timestamp: Timestamp,
    /// Human-readable time derived from `timestamp`
    pub display_time: String,
}

impl Message {
    /// Create a message, stamping it with the current time unless one is supplied
    pub fn new(
        sender: SessionId,
        receiver: SessionId,
        body: impl Into<String>,
        origin: Origin,
        timestamp: Option<Timestamp>,
    ) -> Self {
        let timestamp = timestamp.unwrap_or_else(Timestamp::now);
        Self {
            sender,
            receiver,
            body: body.into(),
            origin,
            display_time: timestamp.display_time(),
            timestamp,
        }
    }

    /// A message composed on this side
    pub fn local(sender: SessionId, receiver: SessionId, body: impl Into<String>) -> Self {
        Self::new(sender, receiver, body, Origin::Local, None)
    }

    /// A message that arrived over the channel
    pub fn remote(sender: SessionId, receiver: SessionId, body: impl Into<String>) -> Self {
        Self::new(sender, receiver, body, Origin::Remote, None)
    }

    /// The identity on the other side of the conversation
    pub fn counterpart(&self) -> &SessionId {
        match self.origin {
            Origin::Local => &self.receiver,
            Origin::Remote => &self.sender,
        }
    }

    /// Whether this message belongs to the conversation with `remote`
    pub fn involves(&self, remote: &SessionId) -> bool {
        &self.sender == remote || &self.receiver == remote
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
