//! Loopback signaling network
//!
//! A shared in-process hub that assigns identities, relays offers and carries
//! channel data between `LoopbackSignaling` tasks. It behaves like the real
//! signaling task from the core's point of view: the same effects in, the
//! same events out.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use peerchat_core::{
    ConnectionId, Direction, Effect, EffectReceiver, Event, EventSender, PeerChatError,
    PeerChatResult, SessionId, SignalingTask, TransportError,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

// ----------------------------------------------------------------------------
// Hub
// ----------------------------------------------------------------------------

#[derive(Debug)]
struct PeerEntry {
    events: EventSender,
    listening: bool,
}

#[derive(Debug, Clone)]
struct LoopChannel {
    initiator: SessionId,
    acceptor: SessionId,
    open: bool,
}

impl LoopChannel {
    fn other_end(&self, me: &SessionId) -> Option<&SessionId> {
        if &self.initiator == me {
            Some(&self.acceptor)
        } else if &self.acceptor == me {
            Some(&self.initiator)
        } else {
            None
        }
    }
}

#[derive(Debug, Default)]
struct Hub {
    next_id: u64,
    peers: HashMap<SessionId, PeerEntry>,
    channels: HashMap<ConnectionId, LoopChannel>,
}

type Delivery = (EventSender, Event);

/// Shared in-process signaling service
#[derive(Debug, Clone, Default)]
pub struct LoopbackNetwork {
    hub: Arc<Mutex<Hub>>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    fn hub(&self) -> MutexGuard<'_, Hub> {
        self.hub.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Signaling task that gets a generated identity
    pub fn signaling(&self) -> LoopbackSignaling {
        LoopbackSignaling::new(self.clone(), None, None)
    }

    /// Signaling task that asks for a specific identity
    pub fn signaling_with_id(&self, id: &str) -> LoopbackSignaling {
        LoopbackSignaling::new(self.clone(), Some(id.to_string()), None)
    }

    /// Signaling task whose identity acquisition fails
    pub fn failing_signaling(&self, reason: &str) -> LoopbackSignaling {
        LoopbackSignaling::new(self.clone(), None, Some(reason.to_string()))
    }

    /// Deliver a raw event to a registered peer
    pub async fn inject(&self, to: &SessionId, event: Event) -> bool {
        let sender = self.hub().peers.get(to).map(|p| p.events.clone());
        match sender {
            Some(sender) => sender.send(event).await.is_ok(),
            None => false,
        }
    }

    /// Identities currently registered
    pub fn peers(&self) -> Vec<SessionId> {
        let mut peers: Vec<_> = self.hub().peers.keys().cloned().collect();
        peers.sort();
        peers
    }

    pub fn is_listening(&self, id: &SessionId) -> bool {
        self.hub().peers.get(id).is_some_and(|p| p.listening)
    }

    pub fn open_channels(&self) -> usize {
        self.hub().channels.values().filter(|c| c.open).count()
    }

    async fn deliver(deliveries: Vec<Delivery>) {
        for (sender, event) in deliveries {
            if sender.send(event).await.is_err() {
                debug!("Dropping event for a stopped peer");
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Loopback Signaling Task
// ----------------------------------------------------------------------------

pub struct LoopbackSignaling {
    network: LoopbackNetwork,
    requested_id: Option<String>,
    failure: Option<String>,
    id: Option<SessionId>,
    event_sender: Option<EventSender>,
    effect_receiver: Option<EffectReceiver>,
}

impl LoopbackSignaling {
    fn new(network: LoopbackNetwork, requested_id: Option<String>, failure: Option<String>) -> Self {
        Self {
            network,
            requested_id,
            failure,
            id: None,
            event_sender: None,
            effect_receiver: None,
        }
    }

    fn handle_effect(&mut self, effect: Effect, me: &EventSender) -> Vec<Delivery> {
        let mut hub = self.network.hub();
        let mut out: Vec<Delivery> = Vec::new();

        match effect {
            Effect::AcquireIdentity => {
                if let Some(reason) = &self.failure {
                    out.push((me.clone(), Event::IdentityFailed { reason: reason.clone() }));
                    return out;
                }
                hub.next_id += 1;
                let candidate = self
                    .requested_id
                    .clone()
                    .unwrap_or_else(|| format!("peer-{}", hub.next_id));
                match SessionId::new(candidate) {
                    Ok(id) if !hub.peers.contains_key(&id) => {
                        hub.peers.insert(
                            id.clone(),
                            PeerEntry {
                                events: me.clone(),
                                listening: false,
                            },
                        );
                        self.id = Some(id.clone());
                        out.push((me.clone(), Event::IdentityAssigned { id }));
                    }
                    Ok(id) => out.push((
                        me.clone(),
                        Event::IdentityFailed {
                            reason: format!("ID-TAKEN: {}", id),
                        },
                    )),
                    Err(e) => out.push((me.clone(), Event::IdentityFailed { reason: e.to_string() })),
                }
            }
            Effect::StartListening | Effect::StopListening => {
                let listening = matches!(effect, Effect::StartListening);
                if let Some(entry) = self.id.as_ref().and_then(|id| hub.peers.get_mut(id)) {
                    entry.listening = listening;
                }
            }
            Effect::InitiateConnection {
                connection_id,
                remote,
            } => {
                let Some(me_id) = self.id.clone() else {
                    warn!("Connect requested before identity assignment");
                    return out;
                };
                match hub.peers.get(&remote) {
                    Some(entry) => {
                        out.push((
                            entry.events.clone(),
                            Event::ConnectionOffered {
                                connection_id,
                                remote: me_id.clone(),
                            },
                        ));
                        hub.channels.insert(
                            connection_id,
                            LoopChannel {
                                initiator: me_id,
                                acceptor: remote,
                                open: false,
                            },
                        );
                    }
                    None => out.push((
                        me.clone(),
                        Event::ChannelClosed {
                            connection_id,
                            remote,
                            reason: "peer unavailable".to_string(),
                        },
                    )),
                }
            }
            Effect::AcceptConnection { connection_id, .. } => {
                let Some(channel) = hub.channels.get_mut(&connection_id) else {
                    warn!("Accept for unknown channel {}", connection_id);
                    return out;
                };
                channel.open = true;
                let channel = channel.clone();
                if let Some(initiator) = hub.peers.get(&channel.initiator) {
                    out.push((
                        initiator.events.clone(),
                        Event::ChannelOpened {
                            connection_id,
                            remote: channel.acceptor.clone(),
                            direction: Direction::Initiated,
                        },
                    ));
                }
                out.push((
                    me.clone(),
                    Event::ChannelOpened {
                        connection_id,
                        remote: channel.initiator,
                        direction: Direction::Accepted,
                    },
                ));
            }
            Effect::SendData {
                connection_id,
                body,
            } => {
                let Some(me_id) = self.id.clone() else {
                    return out;
                };
                let target = hub
                    .channels
                    .get(&connection_id)
                    .filter(|c| c.open)
                    .and_then(|c| c.other_end(&me_id))
                    .and_then(|other| hub.peers.get(other));
                match target {
                    Some(entry) => out.push((
                        entry.events.clone(),
                        Event::DataReceived {
                            connection_id,
                            remote: me_id,
                            body,
                        },
                    )),
                    None => warn!("Send on closed channel {}", connection_id),
                }
            }
            Effect::CloseConnection { connection_id } => {
                let Some(me_id) = self.id.clone() else {
                    return out;
                };
                if let Some(channel) = hub.channels.remove(&connection_id) {
                    if let Some(entry) = channel.other_end(&me_id).and_then(|o| hub.peers.get(o)) {
                        out.push((
                            entry.events.clone(),
                            Event::ChannelClosed {
                                connection_id,
                                remote: me_id,
                                reason: "closed by peer".to_string(),
                            },
                        ));
                    }
                }
            }
        }
        out
    }

    /// Leave the network, closing every channel this peer is part of
    fn leave(&mut self) -> Vec<Delivery> {
        let Some(me_id) = self.id.take() else {
            return Vec::new();
        };
        let mut hub = self.network.hub();
        hub.peers.remove(&me_id);

        let mine: Vec<(ConnectionId, LoopChannel)> = hub
            .channels
            .iter()
            .filter(|(_, c)| c.other_end(&me_id).is_some())
            .map(|(id, c)| (*id, c.clone()))
            .collect();
        let mut out = Vec::new();
        for (connection_id, channel) in mine {
            hub.channels.remove(&connection_id);
            if let Some(entry) = channel.other_end(&me_id).and_then(|o| hub.peers.get(o)) {
                out.push((
                    entry.events.clone(),
                    Event::ChannelClosed {
                        connection_id,
                        remote: me_id.clone(),
                        reason: "peer left".to_string(),
                    },
                ));
            }
        }
        out
    }
}

#[async_trait]
impl SignalingTask for LoopbackSignaling {
    fn attach_channels(
        &mut self,
        event_sender: EventSender,
        effect_receiver: EffectReceiver,
    ) -> PeerChatResult<()> {
        self.event_sender = Some(event_sender);
        self.effect_receiver = Some(effect_receiver);
        Ok(())
    }

    async fn run(&mut self) -> PeerChatResult<()> {
        let (Some(events), Some(mut effects)) =
            (self.event_sender.clone(), self.effect_receiver.take())
        else {
            return Err(PeerChatError::Transport(TransportError::InvalidConfiguration {
                reason: "loopback signaling started without channels".to_string(),
            }));
        };

        loop {
            match effects.recv().await {
                Ok(effect) => {
                    let deliveries = self.handle_effect(effect, &events);
                    LoopbackNetwork::deliver(deliveries).await;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Loopback signaling lagged, {} effects skipped", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }

        let deliveries = self.leave();
        LoopbackNetwork::deliver(deliveries).await;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "loopback"
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use peerchat_core::{create_effect_channel, create_event_channel, ChannelConfig, EffectSender, EventReceiver};
    use std::time::Duration;
    use tokio::time::timeout;

    fn spawn_peer(task: LoopbackSignaling) -> (EffectSender, EventReceiver) {
        let config = ChannelConfig::testing();
        let (event_tx, event_rx) = create_event_channel(&config);
        let (effect_tx, effect_rx) = create_effect_channel(&config);
        let mut task = task;
        task.attach_channels(event_tx, effect_rx).unwrap();
        tokio::spawn(async move { task.run().await });
        (effect_tx, event_rx)
    }

    async fn next(rx: &mut EventReceiver) -> Event {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("event within timeout")
            .expect("channel open")
    }

    #[tokio::test]
    async fn test_identity_assignment_and_collision() {
        let network = LoopbackNetwork::new();
        let (a_fx, mut a_ev) = spawn_peer(network.signaling_with_id("P1"));
        let (b_fx, mut b_ev) = spawn_peer(network.signaling_with_id("P1"));

        a_fx.send(Effect::AcquireIdentity).unwrap();
        assert!(matches!(next(&mut a_ev).await, Event::IdentityAssigned { .. }));
        b_fx.send(Effect::AcquireIdentity).unwrap();
        assert!(matches!(next(&mut b_ev).await, Event::IdentityFailed { .. }));
        assert_eq!(network.peers().len(), 1);
    }

    #[tokio::test]
    async fn test_offer_accept_and_data() {
        let network = LoopbackNetwork::new();
        let (a_fx, mut a_ev) = spawn_peer(network.signaling_with_id("A"));
        let (b_fx, mut b_ev) = spawn_peer(network.signaling_with_id("B"));
        a_fx.send(Effect::AcquireIdentity).unwrap();
        b_fx.send(Effect::AcquireIdentity).unwrap();
        next(&mut a_ev).await;
        next(&mut b_ev).await;

        let cid = ConnectionId::generate();
        let b = SessionId::new("B").unwrap();
        a_fx.send(Effect::InitiateConnection { connection_id: cid, remote: b.clone() }).unwrap();
        let Event::ConnectionOffered { remote, .. } = next(&mut b_ev).await else {
            panic!("expected offer");
        };
        assert_eq!(remote.as_str(), "A");

        b_fx.send(Effect::AcceptConnection { connection_id: cid, remote }).unwrap();
        assert!(matches!(next(&mut a_ev).await, Event::ChannelOpened { direction: Direction::Initiated, .. }));
        assert!(matches!(next(&mut b_ev).await, Event::ChannelOpened { direction: Direction::Accepted, .. }));
        assert_eq!(network.open_channels(), 1);

        a_fx.send(Effect::SendData { connection_id: cid, body: "hi".into() }).unwrap();
        let Event::DataReceived { body, .. } = next(&mut b_ev).await else {
            panic!("expected data");
        };
        assert_eq!(body, "hi");

        b_fx.send(Effect::CloseConnection { connection_id: cid }).unwrap();
        assert!(matches!(next(&mut a_ev).await, Event::ChannelClosed { .. }));
    }

    #[tokio::test]
    async fn test_connect_to_unknown_peer_closes() {
        let network = LoopbackNetwork::new();
        let (fx, mut ev) = spawn_peer(network.signaling());
        fx.send(Effect::AcquireIdentity).unwrap();
        next(&mut ev).await;

        fx.send(Effect::InitiateConnection {
            connection_id: ConnectionId::generate(),
            remote: SessionId::new("nobody").unwrap(),
        })
        .unwrap();
        assert!(matches!(next(&mut ev).await, Event::ChannelClosed { .. }));
    }
}
