//! PeerChat application wiring and the interactive chat loop

use std::io::Write;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

use peerchat_backend::HttpBackend;
use peerchat_core::{AppEventReceiver, BackendClient, SignalingTask};
use peerchat_runtime::{AppEvent, PeerChatHandle, PeerChatRuntime};
use peerchat_signaling::{PeerJsSignaling, SignalingConfig};

use crate::commands::ChatCommand;
use crate::config::CliAppConfig;
use crate::display::{format_event, format_message, HELP};
use crate::error::{CliError, Result};

/// What the chat loop does after a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    Continue,
    Quit,
}

/// A running session plus the settings the prompt needs
pub struct PeerChatApp {
    config: CliAppConfig,
    runtime: PeerChatRuntime,
    handle: PeerChatHandle,
    events: AppEventReceiver,
}

impl PeerChatApp {
    /// Start a session against the configured signaling server and backend
    pub async fn start(config: CliAppConfig) -> Result<Self> {
        let backend = Arc::new(HttpBackend::from_endpoint(&config.session.backend)?);
        let signaling = PeerJsSignaling::new(SignalingConfig::from(&config.session));
        Self::with_parts(config, backend, signaling).await
    }

    /// Start a session over any signaling task and backend
    pub async fn with_parts<S>(
        config: CliAppConfig,
        backend: Arc<dyn BackendClient>,
        signaling: S,
    ) -> Result<Self>
    where
        S: SignalingTask + 'static,
    {
        let mut runtime = PeerChatRuntime::new(config.session.clone(), backend);
        runtime.add_signaling(signaling)?;
        runtime.start().await?;
        let handle = runtime.handle()?;
        let events = runtime
            .take_app_event_receiver()
            .ok_or_else(|| CliError::Command("app events already taken".to_string()))?;
        Ok(Self {
            config,
            runtime,
            handle,
            events,
        })
    }

    pub fn handle(&self) -> &PeerChatHandle {
        &self.handle
    }

    pub fn config(&self) -> &CliAppConfig {
        &self.config
    }

    /// Run the prompt until `/quit`, end of input or Ctrl-C
    ///
    /// Session events are written to `out` as they arrive. The configured
    /// display name is registered and `connect` dialed once the identity is
    /// assigned.
    pub async fn run_chat<R, W>(&mut self, input: R, out: &mut W, connect: Option<String>) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let mut lines = input.lines();
        let mut started = false;
        let mut pending_connect = connect;

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        debug!("Input closed");
                        break;
                    };
                    let command = match ChatCommand::parse(&line) {
                        Ok(command) => command,
                        Err(usage) => {
                            writeln!(out, "! {}", usage)?;
                            continue;
                        }
                    };
                    if self.execute(command, out).await? == LineOutcome::Quit {
                        break;
                    }
                }
                event = self.events.recv() => {
                    let Some(event) = event else {
                        warn!("Session event stream ended");
                        break;
                    };
                    writeln!(out, "{}", format_event(&event))?;
                    match event {
                        AppEvent::IdentityReady { .. } if !started => {
                            started = true;
                            self.on_identity(out, pending_connect.take()).await?;
                        }
                        AppEvent::IdentityFailed { .. } => break,
                        AppEvent::ConversationReplaced { .. } => self.print_conversation(out).await?,
                        _ => {}
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted");
                    break;
                }
            }
            out.flush()?;
        }
        Ok(())
    }

    async fn on_identity<W: Write>(&self, out: &mut W, connect: Option<String>) -> Result<()> {
        if let Some(name) = self.config.cli.name.clone() {
            self.execute(ChatCommand::Register(name), out).await?;
        }
        if let Some(remote) = connect {
            self.execute(ChatCommand::Connect(remote), out).await?;
        }
        Ok(())
    }

    /// Apply one chat command; session errors are printed, not returned
    pub async fn execute<W: Write>(&self, command: ChatCommand, out: &mut W) -> Result<LineOutcome> {
        let outcome = match command {
            ChatCommand::Nothing => Ok(()),
            ChatCommand::Help => {
                writeln!(out, "{}", HELP)?;
                Ok(())
            }
            ChatCommand::Quit => return Ok(LineOutcome::Quit),
            ChatCommand::Send(body) => self.handle.send(body).await.map(|_| ()),
            ChatCommand::Connect(remote) => {
                let result = self.handle.connect(remote.clone()).await;
                if result.is_ok() {
                    writeln!(out, "* connecting to {}", remote)?;
                }
                result
            }
            ChatCommand::Disconnect => self.handle.disconnect().await,
            ChatCommand::Register(name) => {
                let result = self.handle.register(name.clone()).await;
                if result.is_ok() {
                    writeln!(out, "* registered as {}", name.trim())?;
                }
                result
            }
            ChatCommand::History => match self.handle.conversation().await {
                Ok(messages) if messages.is_empty() => {
                    writeln!(out, "* no messages")?;
                    Ok(())
                }
                Ok(messages) => {
                    for message in &messages {
                        writeln!(out, "{}", format_message(message))?;
                    }
                    Ok(())
                }
                Err(e) => Err(e),
            },
            ChatCommand::Status => match self.handle.status().await {
                Ok(status) => {
                    writeln!(out, "* {}", status)?;
                    Ok(())
                }
                Err(e) => Err(e),
            },
        };
        if let Err(e) = outcome {
            writeln!(out, "! {}", e)?;
        }
        Ok(LineOutcome::Continue)
    }

    async fn print_conversation<W: Write>(&self, out: &mut W) -> Result<()> {
        for message in self.handle.conversation().await? {
            writeln!(out, "{}", format_message(&message))?;
        }
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        self.runtime.stop().await?;
        Ok(())
    }
}
