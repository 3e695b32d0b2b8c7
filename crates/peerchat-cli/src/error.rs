//! Error handling for the PeerChat CLI

use thiserror::Error;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("PeerChat error: {0}")]
    Core(#[from] peerchat_core::PeerChatError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Backend setup failed: {0}")]
    Backend(#[from] peerchat_backend::BackendError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Command(String),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
