//! PeerChat CLI library
//!
//! A line-oriented chat client on top of `peerchat-runtime`: configuration
//! layering, the chat prompt and text rendering of session events.

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod display;
pub mod error;

pub use app::PeerChatApp;
pub use cli::{Cli, Commands};
pub use config::CliAppConfig;
pub use error::{CliError, Result};
