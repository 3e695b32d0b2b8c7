//! Signaling Task Trait Definition
//!
//! Defines the interface for the task that talks to the signaling service and
//! carries the direct channels. Concrete implementations live in
//! `peerchat-signaling` (PeerJS-compatible) and `peerchat-harness` (loopback).

use crate::channel::{EffectReceiver, EventSender};
use crate::errors::PeerChatResult;

// ----------------------------------------------------------------------------
// Signaling Task Trait
// ----------------------------------------------------------------------------

/// Common interface for signaling tasks
///
/// A signaling task runs its own event loop, executes the effects it receives
/// from the core logic task and reports what it observes as events. It shares
/// no state with other tasks; `PeerChatRuntime` spawns it and aborts it on
/// shutdown.
#[async_trait::async_trait]
pub trait SignalingTask: Send + Sync {
    /// Attach the channels created by the runtime
    fn attach_channels(
        &mut self,
        event_sender: EventSender,
        effect_receiver: EffectReceiver,
    ) -> PeerChatResult<()>;

    /// Run until the effect channel closes or the task is aborted
    async fn run(&mut self) -> PeerChatResult<()>;

    /// Name for log lines
    fn name(&self) -> &'static str;
}
