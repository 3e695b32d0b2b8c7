//! PeerChat Runtime
//!
//! Wires the core logic task to one or more signaling tasks and hands the
//! front end a `PeerChatHandle` plus the app event stream.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use peerchat_core::{InMemoryBackend, PeerChatConfig};
//! use peerchat_runtime::PeerChatRuntime;
//! # use peerchat_core::{EffectReceiver, EventSender, PeerChatResult, SignalingTask};
//! # struct MySignaling;
//! # #[async_trait::async_trait]
//! # impl SignalingTask for MySignaling {
//! #     fn attach_channels(&mut self, _: EventSender, _: EffectReceiver) -> PeerChatResult<()> { Ok(()) }
//! #     async fn run(&mut self) -> PeerChatResult<()> { Ok(()) }
//! #     fn name(&self) -> &'static str { "mine" }
//! # }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut runtime = PeerChatRuntime::new(PeerChatConfig::default(), Arc::new(InMemoryBackend::new()));
//! runtime.add_signaling(MySignaling)?;
//! runtime.start().await?;
//!
//! let handle = runtime.handle()?;
//! let me = handle.wait_for_identity().await?;
//! println!("my id: {}", me);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use peerchat_core::{
    create_app_event_channel, create_command_channel, create_effect_channel,
    create_effect_receiver, create_event_channel, AppEventReceiver, BackendClient, Command,
    CommandSender, EffectReceiver, EventSender, PeerChatConfig, PeerChatError, PeerChatResult,
    SignalingTask, TransportError,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::handle::PeerChatHandle;
use crate::logic::CoreLogicTask;
use crate::managers::IdentityStatus;

/// How long `stop()` waits for tasks to drain before aborting them
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

// ----------------------------------------------------------------------------
// PeerChat Runtime
// ----------------------------------------------------------------------------

pub struct PeerChatRuntime {
    config: PeerChatConfig,
    backend: Arc<dyn BackendClient>,
    /// Registered signaling tasks (before start)
    pending_signaling: Vec<Box<dyn SignalingTask>>,
    /// Running signaling task handles (after start)
    signaling_handles: Vec<(&'static str, JoinHandle<PeerChatResult<()>>)>,
    core_logic_handle: Option<JoinHandle<PeerChatResult<()>>>,
    command_sender: Option<CommandSender>,
    app_event_receiver: Option<AppEventReceiver>,
    identity: Option<watch::Receiver<IdentityStatus>>,
    running: bool,
}

impl PeerChatRuntime {
    pub fn new(config: PeerChatConfig, backend: Arc<dyn BackendClient>) -> Self {
        Self {
            config,
            backend,
            pending_signaling: Vec::new(),
            signaling_handles: Vec::new(),
            core_logic_handle: None,
            command_sender: None,
            app_event_receiver: None,
            identity: None,
            running: false,
        }
    }

    /// Runtime with small channel buffers for tests
    pub fn for_testing(backend: Arc<dyn BackendClient>) -> Self {
        Self::new(PeerChatConfig::testing(), backend)
    }

    /// Register a signaling task. Must be called before `start()`.
    pub fn add_signaling<T: SignalingTask + 'static>(&mut self, task: T) -> PeerChatResult<()> {
        if self.running {
            return Err(invalid_configuration(
                "Cannot add signaling tasks to a running runtime",
            ));
        }
        if self.pending_signaling.iter().any(|t| t.name() == task.name()) {
            return Err(invalid_configuration(format!(
                "Signaling task {} is already registered",
                task.name()
            )));
        }
        self.pending_signaling.push(Box::new(task));
        Ok(())
    }

    /// Create the channels and spawn every task
    pub async fn start(&mut self) -> PeerChatResult<()> {
        if self.running {
            return Err(invalid_configuration("Runtime already running"));
        }
        if self.pending_signaling.is_empty() {
            return Err(invalid_configuration(
                "No signaling task registered. Use add_signaling() to register one.",
            ));
        }
        self.config.validate()?;

        let channels = &self.config.channels;
        let (command_sender, command_receiver) = create_command_channel(channels);
        let (event_sender, event_receiver) = create_event_channel(channels);
        let (effect_sender, _initial_effect_receiver) = create_effect_channel(channels);
        let (app_event_sender, app_event_receiver) = create_app_event_channel(channels);

        // Subscribe every signaling task before the core task emits its first effect
        let subscriptions: Vec<EffectReceiver> = self
            .pending_signaling
            .iter()
            .map(|_| create_effect_receiver(&effect_sender))
            .collect();

        let mut core_logic = CoreLogicTask::new(
            Arc::clone(&self.backend),
            command_receiver,
            event_receiver,
            effect_sender,
            app_event_sender,
        );
        self.identity = Some(core_logic.identity_watch());
        self.command_sender = Some(command_sender);
        self.app_event_receiver = Some(app_event_receiver);

        let tasks = std::mem::take(&mut self.pending_signaling);
        for (task, effect_receiver) in tasks.into_iter().zip(subscriptions) {
            let name = task.name();
            let handle = start_signaling_task(task, event_sender.clone(), effect_receiver)?;
            self.signaling_handles.push((name, handle));
        }

        self.core_logic_handle = Some(tokio::spawn(async move { core_logic.run().await }));
        self.running = true;

        info!(
            "PeerChat runtime started with {} signaling task(s)",
            self.signaling_handles.len()
        );
        Ok(())
    }

    /// Shut down the core task, let signaling tasks drain, then abort stragglers
    pub async fn stop(&mut self) -> PeerChatResult<()> {
        if !self.running {
            return Ok(());
        }
        self.running = false;

        if let Some(sender) = self.command_sender.take() {
            let _ = sender.send(Command::Shutdown).await;
        }
        if let Some(handle) = self.core_logic_handle.take() {
            match timeout(SHUTDOWN_GRACE, handle).await {
                Ok(Ok(Err(e))) => warn!("Core logic task ended with error: {}", e),
                Ok(Err(e)) => warn!("Core logic task panicked or was cancelled: {}", e),
                Err(_) => warn!("Core logic task did not stop in time"),
                Ok(Ok(Ok(()))) => {}
            }
        }

        for (name, mut handle) in self.signaling_handles.drain(..) {
            debug!("Stopping signaling task {}", name);
            if timeout(SHUTDOWN_GRACE, &mut handle).await.is_err() {
                handle.abort();
            }
        }

        self.app_event_receiver = None;
        info!("PeerChat runtime stopped");
        Ok(())
    }

    /// Handle for issuing commands. Available after `start()`.
    pub fn handle(&self) -> PeerChatResult<PeerChatHandle> {
        match (&self.command_sender, &self.identity) {
            (Some(commands), Some(identity)) => {
                Ok(PeerChatHandle::new(commands.clone(), identity.clone()))
            }
            _ => Err(invalid_configuration("Runtime is not running")),
        }
    }

    /// Take the app event stream for the front end
    pub fn take_app_event_receiver(&mut self) -> Option<AppEventReceiver> {
        self.app_event_receiver.take()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn config(&self) -> &PeerChatConfig {
        &self.config
    }

    /// Names of the registered signaling tasks
    pub fn signaling_names(&self) -> Vec<&'static str> {
        if self.running {
            self.signaling_handles.iter().map(|(name, _)| *name).collect()
        } else {
            self.pending_signaling.iter().map(|t| t.name()).collect()
        }
    }
}

impl Drop for PeerChatRuntime {
    fn drop(&mut self) {
        for (_, handle) in &self.signaling_handles {
            handle.abort();
        }
        if let Some(handle) = &self.core_logic_handle {
            handle.abort();
        }
    }
}

fn start_signaling_task(
    mut task: Box<dyn SignalingTask>,
    event_sender: EventSender,
    effect_receiver: EffectReceiver,
) -> PeerChatResult<JoinHandle<PeerChatResult<()>>> {
    task.attach_channels(event_sender, effect_receiver)?;
    debug!("Starting signaling task {}", task.name());
    Ok(tokio::spawn(async move { task.run().await }))
}

fn invalid_configuration(reason: impl Into<String>) -> PeerChatError {
    PeerChatError::Transport(TransportError::InvalidConfiguration {
        reason: reason.into(),
    })
}
