//! Front-end handle to a running session

use peerchat_core::{
    Command, CommandSender, Message, PeerChatError, PeerChatResult, Responder, RuntimeStatus,
    SessionId,
};
use tokio::sync::{oneshot, watch};

use crate::managers::IdentityStatus;

/// Cloneable request/response surface over the command channel
#[derive(Debug, Clone)]
pub struct PeerChatHandle {
    commands: CommandSender,
    identity: watch::Receiver<IdentityStatus>,
}

impl PeerChatHandle {
    pub(crate) fn new(commands: CommandSender, identity: watch::Receiver<IdentityStatus>) -> Self {
        Self { commands, identity }
    }

    async fn request<T>(&self, build: impl FnOnce(Responder<T>) -> Command) -> PeerChatResult<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| PeerChatError::channel_error("core logic task is not running"))?;
        response
            .await
            .map_err(|_| PeerChatError::channel_error("core logic task dropped the request"))?
    }

    /// Open a direct channel to `remote`
    ///
    /// Returns once the attempt is issued; `AppEvent::ConnectionEstablished`
    /// follows when the channel opens.
    pub async fn connect(&self, remote: impl Into<String>) -> PeerChatResult<()> {
        let remote = remote.into();
        self.request(|reply| Command::Connect { remote, reply }).await
    }

    pub async fn send(&self, body: impl Into<String>) -> PeerChatResult<Message> {
        let body = body.into();
        self.request(|reply| Command::Send { body, reply }).await
    }

    pub async fn register(&self, name: impl Into<String>) -> PeerChatResult<()> {
        let name = name.into();
        self.request(|reply| Command::Register { name, reply }).await
    }

    pub async fn disconnect(&self) -> PeerChatResult<()> {
        self.request(|reply| Command::Disconnect { reply }).await
    }

    /// Current conversation in display order
    pub async fn conversation(&self) -> PeerChatResult<Vec<Message>> {
        self.request(|reply| Command::GetConversation { reply }).await
    }

    pub async fn status(&self) -> PeerChatResult<RuntimeStatus> {
        self.request(|reply| Command::GetStatus { reply }).await
    }

    /// Identity if already assigned
    pub fn identity(&self) -> Option<SessionId> {
        self.identity.borrow().id().cloned()
    }

    /// Wait until the identity is assigned, or fail if acquisition failed
    pub async fn wait_for_identity(&self) -> PeerChatResult<SessionId> {
        let mut identity = self.identity.clone();
        loop {
            let outcome = match &*identity.borrow_and_update() {
                IdentityStatus::Ready(id) => Some(Ok(id.clone())),
                IdentityStatus::Failed(reason) => {
                    Some(Err(PeerChatError::identity_failure(reason.clone())))
                }
                IdentityStatus::Unrequested | IdentityStatus::Pending => None,
            };
            if let Some(outcome) = outcome {
                return outcome;
            }
            identity
                .changed()
                .await
                .map_err(|_| PeerChatError::channel_error("core logic task stopped"))?;
        }
    }

    /// Ask the core task to close every channel and stop
    pub async fn shutdown(&self) -> PeerChatResult<()> {
        self.commands
            .send(Command::Shutdown)
            .await
            .map_err(|_| PeerChatError::channel_error("core logic task is not running"))
    }
}
