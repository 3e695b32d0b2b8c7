//! Command-line interface definitions and parsing

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::CliOverrides;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Signaling server host
    #[arg(long)]
    pub signaling_host: Option<String>,

    /// Signaling server port
    #[arg(long)]
    pub signaling_port: Option<u16>,

    /// Base URL of the persistence backend
    #[arg(long)]
    pub backend_url: Option<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Start interactive chat (the default)
    Chat {
        /// Display name to register once the identity is assigned
        #[arg(short, long)]
        name: Option<String>,
        /// Peer to connect to right away
        #[arg(long)]
        connect: Option<String>,
    },
    /// Acquire an identity, print it and exit
    Id,
    /// Print an example configuration file
    Config,
}

impl Cli {
    /// Subcommand to run, defaulting to chat
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Chat {
            name: None,
            connect: None,
        })
    }

    pub fn overrides(&self) -> CliOverrides {
        let name = match &self.command {
            Some(Commands::Chat { name, .. }) => name.clone(),
            _ => None,
        };
        CliOverrides {
            config_file: self.config.clone(),
            verbose: self.verbose,
            signaling_host: self.signaling_host.clone(),
            signaling_port: self.signaling_port,
            backend_url: self.backend_url.clone(),
            name,
        }
    }
}
