//! PeerChat CLI entry point

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use peerchat_cli::{cli::Cli, commands::CommandDispatcher, config::CliAppConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = CliAppConfig::load(&cli.overrides()).context("loading configuration")?;
    setup_logging(config.cli.verbose);
    info!(
        "Signaling {}:{}, backend {}",
        config.session.signaling.host, config.session.signaling.port, config.session.backend.base_url
    );

    if let Err(e) = CommandDispatcher::execute(cli, config).await {
        error!("Command execution failed: {}", e);
        std::process::exit(1);
    }
    Ok(())
}

/// Setup logging based on verbosity level
fn setup_logging(verbose: bool) {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();
}
