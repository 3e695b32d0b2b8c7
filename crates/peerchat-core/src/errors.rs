//! Error types for PeerChat
//!
//! This module contains all error types used throughout the core, including
//! validation errors, transport errors, and the main PeerChatError type that
//! unifies them.

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Rejections of caller input, raised before any side effect takes place
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Required field `{field}` is empty")]
    EmptyField { field: &'static str },
    #[error("Cannot connect to own session identity {id}")]
    SelfConnection { id: String },
    #[error("Session identity is not assigned")]
    MissingIdentity,
}

/// Specific transport error types
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connection failed to peer {remote}: {reason}")]
    ConnectionFailed { remote: String, reason: String },
    #[error("Network I/O error: {0}")]
    NetworkIo(#[from] std::io::Error),
    #[error("Signaling server rejected the session: {reason}")]
    SignalingRejected { reason: String },
    #[error("Unknown connection: {connection_id}")]
    UnknownConnection { connection_id: String },
    #[error("Protocol violation: {reason}")]
    ProtocolViolation { reason: String },
    #[error("Invalid transport configuration: {reason}")]
    InvalidConfiguration { reason: String },
    #[error("Transport shutdown: {reason}")]
    Shutdown { reason: String },
}

// ----------------------------------------------------------------------------
// Main Error Type
// ----------------------------------------------------------------------------

/// Core error types for PeerChat
#[derive(Debug, thiserror::Error)]
pub enum PeerChatError {
    /// The signaling collaborator never produced an identity. Terminal.
    #[error("Session identity acquisition failed: {reason}")]
    IdentityAcquisitionFailure { reason: String },

    #[error("Session identity has not been assigned yet")]
    IdentityPending,

    #[error("No active connection")]
    NoActiveConnection,

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Backend unavailable: {reason}")]
    BackendUnavailable { reason: String },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Channel communication error between tasks
    #[error("Channel error: {message}")]
    Channel { message: String },

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl PeerChatError {
    /// Create an identity acquisition failure with a reason
    pub fn identity_failure<T: Into<String>>(reason: T) -> Self {
        PeerChatError::IdentityAcquisitionFailure {
            reason: reason.into(),
        }
    }

    /// Create an empty-field validation error
    pub fn empty_field(field: &'static str) -> Self {
        PeerChatError::Validation(ValidationError::EmptyField { field })
    }

    /// Create a backend unavailable error with a reason
    pub fn backend_unavailable<T: Into<String>>(reason: T) -> Self {
        PeerChatError::BackendUnavailable {
            reason: reason.into(),
        }
    }

    /// Create a channel error with a message
    pub fn channel_error<T: Into<String>>(message: T) -> Self {
        PeerChatError::Channel {
            message: message.into(),
        }
    }

    /// Create a configuration error with a reason
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        PeerChatError::Configuration {
            reason: reason.into(),
        }
    }

    /// Create a transport connection failed error
    pub fn connection_failed<P: Into<String>, R: Into<String>>(remote: P, reason: R) -> Self {
        PeerChatError::Transport(TransportError::ConnectionFailed {
            remote: remote.into(),
            reason: reason.into(),
        })
    }

    /// Create a protocol violation error
    pub fn protocol_violation<T: Into<String>>(reason: T) -> Self {
        PeerChatError::Transport(TransportError::ProtocolViolation {
            reason: reason.into(),
        })
    }

    /// Whether the session can keep going after this error
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            PeerChatError::IdentityAcquisitionFailure { .. }
                | PeerChatError::Channel { .. }
                | PeerChatError::Configuration { .. }
        )
    }

    /// Whether this is a caller-input rejection
    pub fn is_validation(&self) -> bool {
        matches!(self, PeerChatError::Validation(_))
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, PeerChatError>;
pub type PeerChatResult<T> = Result<T>;

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverability() {
        assert!(PeerChatError::NoActiveConnection.is_recoverable());
        assert!(PeerChatError::backend_unavailable("down").is_recoverable());
        assert!(PeerChatError::empty_field("name").is_recoverable());
        assert!(!PeerChatError::identity_failure("server gone").is_recoverable());
        assert!(!PeerChatError::channel_error("closed").is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let err = PeerChatError::empty_field("body");
        assert_eq!(
            err.to_string(),
            "Validation error: Required field `body` is empty"
        );
        assert!(err.is_validation());

        let err = PeerChatError::connection_failed("peer-2", "refused");
        assert_eq!(
            err.to_string(),
            "Transport error: Connection failed to peer peer-2: refused"
        );
    }
}
