//! Core Logic Task Implementation
//!
//! Contains the `CoreLogicTask` struct and its select loop.

use std::sync::Arc;

use peerchat_core::{
    AppEvent, AppEventSender, BackendClient, ChannelError, Command, CommandReceiver, Effect,
    EffectSender, Event, EventReceiver, NonBlockingSend, PeerChatResult, Responder,
};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::handlers::{CommandHandlers, Transition};
use super::state::{CoreState, CoreStats};
use crate::managers::{IdentityStatus, SyncReport};

/// Buffer for reports from background sync tasks
const SYNC_REPORT_BUFFER: usize = 64;

// ----------------------------------------------------------------------------
// Core Logic Task
// ----------------------------------------------------------------------------

/// The task that owns the session and processes all commands and events
pub struct CoreLogicTask {
    state: CoreState,
    command_receiver: CommandReceiver,
    event_receiver: EventReceiver,
    report_receiver: mpsc::Receiver<SyncReport>,
    effect_sender: EffectSender,
    app_event_sender: AppEventSender,
    running: bool,
}

impl CoreLogicTask {
    pub fn new(
        backend: Arc<dyn BackendClient>,
        command_receiver: CommandReceiver,
        event_receiver: EventReceiver,
        effect_sender: EffectSender,
        app_event_sender: AppEventSender,
    ) -> Self {
        let (report_sender, report_receiver) = mpsc::channel(SYNC_REPORT_BUFFER);
        Self {
            state: CoreState::new(backend, report_sender),
            command_receiver,
            event_receiver,
            report_receiver,
            effect_sender,
            app_event_sender,
            running: true,
        }
    }

    /// Observe the session identity
    pub fn identity_watch(&self) -> watch::Receiver<IdentityStatus> {
        self.state.identity.subscribe()
    }

    /// Run the main loop until shutdown or until the command channel closes
    pub async fn run(&mut self) -> PeerChatResult<()> {
        info!("Core logic task starting");
        let startup = CommandHandlers::handle_startup(&mut self.state);
        self.emit(startup);

        let mut events_open = true;
        while self.running {
            tokio::select! {
                command = self.command_receiver.recv() => {
                    match command {
                        Some(command) => {
                            debug!("Processing command: {}", command.name());
                            self.process_command(command);
                        }
                        None => {
                            info!("Command channel closed, shutting down");
                            let shutdown = CommandHandlers::handle_shutdown(&mut self.state);
                            self.emit(shutdown);
                            break;
                        }
                    }
                }

                event = self.event_receiver.recv(), if events_open => {
                    match event {
                        Some(event) => self.process_event(event),
                        None => {
                            warn!("Event channel closed");
                            events_open = false;
                        }
                    }
                }

                Some(report) = self.report_receiver.recv() => {
                    self.state.stats.reports_processed += 1;
                    let transition = CommandHandlers::handle_sync_report(&mut self.state, report);
                    self.emit(transition);
                }
            }
        }

        info!("Core logic task stopped");
        Ok(())
    }

    /// Stop after the current iteration
    pub fn stop(&mut self) {
        self.running = false;
    }

    fn process_command(&mut self, command: Command) {
        self.state.stats.commands_processed += 1;

        match command {
            Command::Connect { remote, reply } => {
                let result = CommandHandlers::handle_connect(&mut self.state, &remote);
                self.reply_with_transition(result.map(|t| ((), t)), reply);
            }
            Command::Send { body, reply } => {
                let result = CommandHandlers::handle_send(&mut self.state, body);
                self.reply_with_transition(result, reply);
            }
            Command::Register { name, reply } => {
                match CommandHandlers::handle_register(&self.state, &name) {
                    Ok(user) => {
                        let gateway = self.state.registration.clone();
                        tokio::spawn(async move {
                            let result = gateway.submit(user).await;
                            let _ = reply.send(result);
                        });
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
            }
            Command::Disconnect { reply } => {
                let result = CommandHandlers::handle_disconnect(&mut self.state);
                self.reply_with_transition(result.map(|t| ((), t)), reply);
            }
            Command::GetConversation { reply } => {
                let _ = reply.send(Ok(CommandHandlers::handle_get_conversation(&self.state)));
            }
            Command::GetStatus { reply } => {
                let _ = reply.send(Ok(self.state.status()));
            }
            Command::Shutdown => {
                self.running = false;
                let shutdown = CommandHandlers::handle_shutdown(&mut self.state);
                self.emit(shutdown);
            }
        }
    }

    fn process_event(&mut self, event: Event) {
        self.state.stats.events_processed += 1;

        let transition = match event {
            Event::IdentityAssigned { id } => {
                CommandHandlers::handle_identity_assigned(&mut self.state, id)
            }
            Event::IdentityFailed { reason } => {
                CommandHandlers::handle_identity_failed(&mut self.state, reason)
            }
            Event::ConnectionOffered {
                connection_id,
                remote,
            } => CommandHandlers::handle_connection_offered(&mut self.state, connection_id, remote),
            Event::ChannelOpened {
                connection_id,
                remote,
                direction,
            } => CommandHandlers::handle_channel_opened(
                &mut self.state,
                connection_id,
                remote,
                direction,
            ),
            Event::DataReceived {
                connection_id,
                remote,
                body,
            } => CommandHandlers::handle_data_received(&mut self.state, connection_id, remote, body),
            Event::ChannelClosed {
                connection_id,
                remote,
                reason,
            } => CommandHandlers::handle_channel_closed(
                &mut self.state,
                connection_id,
                remote,
                reason,
            ),
            Event::SignalingError { error } => CommandHandlers::handle_signaling_error(error),
        };

        self.emit(transition);
    }

    /// Emit the transition, then answer the caller
    fn reply_with_transition<T>(
        &mut self,
        result: PeerChatResult<(T, Transition)>,
        reply: Responder<T>,
    ) {
        match result {
            Ok((value, transition)) => {
                self.emit(transition);
                let _ = reply.send(Ok(value));
            }
            Err(e) => {
                debug!("Command rejected: {}", e);
                let _ = reply.send(Err(e));
            }
        }
    }

    fn emit(&mut self, (effects, app_events): Transition) {
        for effect in effects {
            self.send_effect(effect);
        }
        for app_event in app_events {
            self.send_app_event(app_event);
        }
    }

    /// Broadcast an effect to the signaling tasks
    fn send_effect(&mut self, effect: Effect) {
        debug!("Effect: {:?}", effect);
        if self.effect_sender.send(effect).is_err() {
            warn!("No signaling task is subscribed; effect dropped");
            return;
        }
        self.state.stats.effects_generated += 1;
    }

    /// Deliver an app event without waiting on a slow front end
    fn send_app_event(&mut self, app_event: AppEvent) {
        match self.app_event_sender.try_send_non_blocking(app_event) {
            Ok(()) => self.state.stats.app_events_generated += 1,
            Err(ChannelError::ChannelFull) => {
                warn!("App event channel full; event dropped");
                self.state.stats.app_events_dropped += 1;
            }
            // Headless sessions keep running without a front end
            Err(ChannelError::ChannelClosed) | Err(ChannelError::ReceiverDropped) => {
                self.state.stats.app_events_dropped += 1;
            }
        }
    }

    pub fn stats(&self) -> &CoreStats {
        &self.state.stats
    }

    pub fn state(&self) -> &CoreState {
        &self.state
    }
}
