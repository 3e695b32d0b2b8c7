//! Command handlers for the PeerChat CLI

use std::io::Write;
use std::time::Duration;

use tokio::io::BufReader;
use tracing::info;

use crate::app::PeerChatApp;
use crate::cli::{Cli, Commands};
use crate::config::CliAppConfig;
use crate::error::{CliError, Result};

// ----------------------------------------------------------------------------
// Chat Line Commands
// ----------------------------------------------------------------------------

/// One line typed into the chat prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Connect(String),
    Disconnect,
    Register(String),
    History,
    Status,
    Help,
    Quit,
    Send(String),
    /// Blank line
    Nothing,
}

impl ChatCommand {
    pub fn parse(line: &str) -> std::result::Result<Self, String> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Ok(Self::Nothing);
        }
        // `//text` sends a message starting with a slash
        if let Some(escaped) = line.strip_prefix("//") {
            return Ok(Self::Send(format!("/{}", escaped)));
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Self::Send(line.to_string()));
        };

        let (verb, arg) = match rest.split_once(char::is_whitespace) {
            Some((verb, arg)) => (verb, arg.trim()),
            None => (rest, ""),
        };
        match (verb, arg) {
            ("connect" | "c", "") => Err("usage: /connect <id>".to_string()),
            ("connect" | "c", id) => Ok(Self::Connect(id.to_string())),
            ("register", name) => Ok(Self::Register(name.to_string())),
            ("disconnect" | "d", _) => Ok(Self::Disconnect),
            ("history" | "h", _) => Ok(Self::History),
            ("status" | "s", _) => Ok(Self::Status),
            ("help" | "?", _) => Ok(Self::Help),
            ("quit" | "q" | "exit", _) => Ok(Self::Quit),
            (other, _) => Err(format!("unknown command /{} (try /help)", other)),
        }
    }
}

// ----------------------------------------------------------------------------
// Dispatcher
// ----------------------------------------------------------------------------

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(cli: Cli, config: CliAppConfig) -> Result<()> {
        match cli.command() {
            Commands::Config => Self::handle_config_command(),
            Commands::Id => Self::handle_id_command(config).await,
            Commands::Chat { connect, .. } => Self::handle_chat_command(config, connect).await,
        }
    }

    fn handle_config_command() -> Result<()> {
        let mut stdout = std::io::stdout();
        writeln!(stdout, "{}", CliAppConfig::example_config())?;
        Ok(())
    }

    async fn handle_id_command(config: CliAppConfig) -> Result<()> {
        let mut app = PeerChatApp::start(config).await?;
        let outcome = tokio::time::timeout(Duration::from_secs(30), app.handle().wait_for_identity())
            .await
            .map_err(|_| CliError::Command("timed out waiting for an identity".to_string()));
        app.stop().await?;
        println!("{}", outcome??);
        Ok(())
    }

    async fn handle_chat_command(config: CliAppConfig, connect: Option<String>) -> Result<()> {
        info!("Starting interactive chat");
        let mut app = PeerChatApp::start(config).await?;
        let stdin = BufReader::new(tokio::io::stdin());
        let mut stdout = std::io::stdout();
        let outcome = app.run_chat(stdin, &mut stdout, connect).await;
        app.stop().await?;
        outcome
    }
}
