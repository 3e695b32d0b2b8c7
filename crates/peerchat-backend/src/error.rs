//! Error types for the REST backend

use peerchat_core::PeerChatError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Invalid backend URL {url}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("Backend request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Backend returned {status} for {endpoint}")]
    Status { status: u16, endpoint: String },
}

impl From<BackendError> for PeerChatError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::InvalidBaseUrl { .. } => PeerChatError::config_error(err.to_string()),
            other => PeerChatError::backend_unavailable(other.to_string()),
        }
    }
}
