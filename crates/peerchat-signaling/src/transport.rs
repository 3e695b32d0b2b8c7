//! PeerJS signaling task
//!
//! Acquires the session identity, relays connection offers through the
//! signaling server and runs the direct channels once they are established.
//! Application data never passes through the server.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::stream::{SplitSink, StreamExt};
use futures::SinkExt;
use peerchat_core::{
    ConnectionId, Direction, Effect, EffectReceiver, Event, EventSender, PeerChatError,
    PeerChatResult, SessionId, SignalingTask, TransportError,
};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use super::channel::{dial, read_hello, spawn_channel, ChannelHandle, DirectListener, HandshakenStream};
use super::config::SignalingConfig;
use super::error::SignalingError;
use super::identity::{acquire, SignalingSocket};
use super::message::ServerMessage;

async fn forward_event(sender: &EventSender, event: Event) {
    if sender.send(event).await.is_err() {
        debug!("Core logic is gone; event dropped");
    }
}

/// Completions of background channel work
#[derive(Debug)]
enum ChannelReport {
    /// A peer dialed our listener
    Inbound(Result<HandshakenStream, SignalingError>),
    /// We finished dialing an offering peer
    Dialed {
        connection_id: ConnectionId,
        remote: SessionId,
        result: Result<HandshakenStream, SignalingError>,
    },
}

// ----------------------------------------------------------------------------
// PeerJS Signaling Task
// ----------------------------------------------------------------------------

pub struct PeerJsSignaling {
    config: SignalingConfig,
    http: reqwest::Client,
    event_sender: Option<EventSender>,
    effect_receiver: Option<EffectReceiver>,
}

impl PeerJsSignaling {
    pub fn new(config: SignalingConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            event_sender: None,
            effect_receiver: None,
        }
    }

    /// Wait for `AcquireIdentity` and perform it
    ///
    /// Returns `None` when acquisition failed or the core stopped first. After
    /// a failure the task keeps draining effects so the core never sees a
    /// closed channel.
    async fn establish(
        &self,
        events: &EventSender,
        effects: &mut EffectReceiver,
    ) -> Option<Session> {
        loop {
            match effects.recv().await {
                Ok(Effect::AcquireIdentity) => break,
                Ok(other) => debug!("Ignoring {:?} before identity acquisition", other),
                Err(RecvError::Lagged(skipped)) => warn!("Skipped {} effects", skipped),
                Err(RecvError::Closed) => return None,
            }
        }

        match self.open_session().await {
            Ok(session) => {
                forward_event(
                    events,
                    Event::IdentityAssigned {
                        id: session.local.clone(),
                    },
                )
                .await;
                Some(session)
            }
            Err(e) => {
                error!("Identity acquisition failed: {}", e);
                forward_event(
                    events,
                    Event::IdentityFailed {
                        reason: e.to_string(),
                    },
                )
                .await;
                while !matches!(effects.recv().await, Err(RecvError::Closed)) {}
                None
            }
        }
    }

    async fn open_session(&self) -> Result<Session, SignalingError> {
        let listener = DirectListener::bind(&self.config.direct).await?;
        let (local, socket) = acquire(&self.http, &self.config.endpoint).await?;
        let (sink, stream) = socket.split();
        Ok(Session {
            local,
            sink,
            stream: Some(stream),
            listener,
            accepting: false,
            channel_buffer: self.config.channel_buffer,
            outbound: HashMap::new(),
            inbound: HashMap::new(),
            channels: HashMap::new(),
        })
    }

    async fn serve(
        &self,
        mut session: Session,
        events: EventSender,
        mut effects: EffectReceiver,
    ) -> PeerChatResult<()> {
        let (report_tx, mut report_rx) = mpsc::unbounded_channel::<ChannelReport>();
        let (ended_tx, mut ended_rx) = mpsc::unbounded_channel::<ConnectionId>();
        let mut heartbeat = interval(self.config.endpoint.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        heartbeat.tick().await;

        let Some(mut server) = session.stream.take() else {
            return Err(SignalingError::SocketClosed.into());
        };
        let mut server_open = true;

        loop {
            tokio::select! {
                effect = effects.recv() => match effect {
                    Ok(effect) => session.handle_effect(effect, &events, &report_tx).await,
                    Err(RecvError::Lagged(skipped)) => warn!("Signaling task lagged, {} effects skipped", skipped),
                    Err(RecvError::Closed) => {
                        info!("Effect channel closed, shutting down signaling task");
                        break;
                    }
                },

                frame = server.next(), if server_open => match frame {
                    Some(Ok(WsMessage::Text(text))) => session.handle_server_text(&text, &events).await,
                    Some(Ok(WsMessage::Close(_))) | None => {
                        server_open = false;
                        warn!("Signaling server closed the connection");
                        forward_event(&events, Event::SignalingError {
                            error: "signaling server closed the connection".to_string(),
                        }).await;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        server_open = false;
                        warn!("Signaling connection failed: {}", e);
                        forward_event(&events, Event::SignalingError { error: e.to_string() }).await;
                    }
                },

                accepted = session.listener.accept() => match accepted {
                    Ok(stream) => {
                        let report_tx = report_tx.clone();
                        tokio::spawn(async move {
                            let _ = report_tx.send(ChannelReport::Inbound(read_hello(stream).await));
                        });
                    }
                    Err(e) => warn!("Direct channel accept failed: {}", e),
                },

                Some(report) = report_rx.recv() => session.handle_report(report, &events, &ended_tx).await,

                Some(connection_id) = ended_rx.recv() => {
                    session.channels.remove(&connection_id);
                }

                _ = heartbeat.tick(), if server_open => {
                    if let Err(e) = session.send_server(&ServerMessage::Heartbeat).await {
                        warn!("Heartbeat failed: {}", e);
                    }
                }
            }
        }

        session.leave().await;
        info!("PeerJS signaling task stopped");
        Ok(())
    }
}

#[async_trait]
impl SignalingTask for PeerJsSignaling {
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
                reason: "PeerJS signaling started without attached channels".to_string(),
            }));
        };

        info!("Starting PeerJS signaling task");
        match self.establish(&events, &mut effects).await {
            Some(session) => self.serve(session, events, effects).await,
            None => Ok(()),
        }
    }

    fn name(&self) -> &'static str {
        "peerjs"
    }
}

// ----------------------------------------------------------------------------
// Session
// ----------------------------------------------------------------------------

type ServerSink = SplitSink<SignalingSocket, WsMessage>;
type ServerStream = futures::stream::SplitStream<SignalingSocket>;

/// State of an open signaling session
struct Session {
    local: SessionId,
    sink: ServerSink,
    stream: Option<ServerStream>,
    listener: DirectListener,
    accepting: bool,
    channel_buffer: usize,
    /// Offers we sent, waiting for the remote to dial in
    outbound: HashMap<ConnectionId, SessionId>,
    /// Offers we received: remote and the address to dial
    inbound: HashMap<ConnectionId, (SessionId, String)>,
    channels: HashMap<ConnectionId, ChannelHandle>,
}

impl Session {
    async fn send_server(&mut self, message: &ServerMessage) -> Result<(), SignalingError> {
        let text = message.to_json()?;
        self.sink.send(WsMessage::Text(text)).await?;
        Ok(())
    }

    async fn handle_effect(
        &mut self,
        effect: Effect,
        events: &EventSender,
        reports: &mpsc::UnboundedSender<ChannelReport>,
    ) {
        match effect {
            Effect::AcquireIdentity => debug!("Identity already assigned: {}", self.local),
            Effect::StartListening => self.accepting = true,
            Effect::StopListening => self.accepting = false,

            Effect::InitiateConnection {
                connection_id,
                remote,
            } => {
                let offer = ServerMessage::offer(
                    remote.as_str(),
                    connection_id,
                    self.listener.advertised_address().to_string(),
                );
                match self.send_server(&offer).await {
                    Ok(()) => {
                        debug!("Offered channel {} to {}", connection_id, remote);
                        self.outbound.insert(connection_id, remote);
                    }
                    Err(e) => {
                        forward_event(
                            events,
                            Event::ChannelClosed {
                                connection_id,
                                remote,
                                reason: format!("offer not sent: {}", e),
                            },
                        )
                        .await;
                    }
                }
            }

            Effect::AcceptConnection {
                connection_id,
                remote,
            } => {
                let Some((offered_by, address)) = self.inbound.remove(&connection_id) else {
                    warn!("{}", SignalingError::UnknownOffer { connection_id });
                    forward_event(
                        events,
                        Event::ChannelClosed {
                            connection_id,
                            remote,
                            reason: "offer no longer available".to_string(),
                        },
                    )
                    .await;
                    return;
                };
                if let Err(e) = self
                    .send_server(&ServerMessage::answer(offered_by.as_str(), connection_id, true))
                    .await
                {
                    debug!("Answer to {} not sent: {}", offered_by, e);
                }

                let local = self.local.clone();
                let reports = reports.clone();
                tokio::spawn(async move {
                    let result = dial(&address, connection_id, &local).await;
                    let _ = reports.send(ChannelReport::Dialed {
                        connection_id,
                        remote: offered_by,
                        result,
                    });
                });
            }

            Effect::SendData {
                connection_id,
                body,
            } => match self.channels.get(&connection_id) {
                Some(channel) => {
                    if !channel.send(body).await {
                        warn!("Channel {} closed before data was queued", connection_id);
                    }
                }
                None => warn!("Send on unknown channel {}", connection_id),
            },

            Effect::CloseConnection { connection_id } => {
                if let Some(channel) = self.channels.remove(&connection_id) {
                    debug!("Closing channel {} with {}", connection_id, channel.remote);
                } else if let Some((remote, _)) = self.inbound.remove(&connection_id) {
                    debug!("Declining offer {} from {}", connection_id, remote);
                    if let Err(e) = self
                        .send_server(&ServerMessage::answer(remote.as_str(), connection_id, false))
                        .await
                    {
                        debug!("Decline to {} not sent: {}", remote, e);
                    }
                } else {
                    self.outbound.remove(&connection_id);
                }
            }
        }
    }

    async fn handle_server_text(&mut self, text: &str, events: &EventSender) {
        let message = match ServerMessage::from_json(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Ignoring signaling message: {}", e);
                return;
            }
        };

        match message {
            ServerMessage::Offer {
                src: Some(src),
                payload,
                ..
            } => {
                let Ok(remote) = SessionId::new(src) else {
                    warn!("Offer with blank source dropped");
                    return;
                };
                if !self.accepting {
                    debug!("Offer from {} while not accepting", remote);
                }
                self.inbound
                    .insert(payload.connection_id, (remote.clone(), payload.address));
                forward_event(
                    events,
                    Event::ConnectionOffered {
                        connection_id: payload.connection_id,
                        remote,
                    },
                )
                .await;
            }
            ServerMessage::Answer { payload, .. } if !payload.accepted => {
                if let Some(remote) = self.outbound.remove(&payload.connection_id) {
                    forward_event(
                        events,
                        Event::ChannelClosed {
                            connection_id: payload.connection_id,
                            remote,
                            reason: "offer declined".to_string(),
                        },
                    )
                    .await;
                }
            }
            ServerMessage::Answer { payload, .. } => {
                debug!("Offer {} accepted, waiting for dial-in", payload.connection_id);
            }
            ServerMessage::Leave { src: Some(src), .. } => {
                self.drop_attempts_with(&src, "peer left", events).await;
            }
            ServerMessage::Expire { src: Some(src), .. } => {
                self.drop_attempts_with(&src, "peer unavailable", events).await;
            }
            ServerMessage::Error { payload } | ServerMessage::IdTaken { payload } => {
                let error = payload.map(|p| p.msg).unwrap_or_else(|| "unknown error".to_string());
                warn!("Signaling server error: {}", error);
                forward_event(events, Event::SignalingError { error }).await;
            }
            ServerMessage::Open | ServerMessage::Heartbeat => {}
            other => debug!("Ignoring relay message without source: {:?}", other),
        }
    }

    /// Close every pending attempt involving `remote`
    async fn drop_attempts_with(&mut self, remote: &str, reason: &str, events: &EventSender) {
        let outbound: Vec<_> = self
            .outbound
            .iter()
            .filter(|(_, r)| r.as_str() == remote)
            .map(|(id, r)| (*id, r.clone()))
            .collect();
        let inbound: Vec<_> = self
            .inbound
            .iter()
            .filter(|(_, (r, _))| r.as_str() == remote)
            .map(|(id, (r, _))| (*id, r.clone()))
            .collect();

        for (connection_id, remote) in outbound.into_iter().chain(inbound) {
            self.outbound.remove(&connection_id);
            self.inbound.remove(&connection_id);
            forward_event(
                events,
                Event::ChannelClosed {
                    connection_id,
                    remote,
                    reason: reason.to_string(),
                },
            )
            .await;
        }
    }

    async fn handle_report(
        &mut self,
        report: ChannelReport,
        events: &EventSender,
        ended: &mpsc::UnboundedSender<ConnectionId>,
    ) {
        match report {
            ChannelReport::Inbound(Ok(stream)) => {
                let connection_id = stream.connection_id;
                let Some(remote) = self.outbound.get(&connection_id).cloned() else {
                    debug!("Dropping unsolicited channel {}", connection_id);
                    return;
                };
                if stream.announced != remote.as_str() {
                    warn!(
                        "Channel {} dialed by {} instead of {}",
                        connection_id, stream.announced, remote
                    );
                    return;
                }
                self.outbound.remove(&connection_id);
                self.open(stream, remote, Direction::Initiated, events, ended)
                    .await;
            }
            ChannelReport::Inbound(Err(e)) => debug!("Inbound handshake failed: {}", e),
            ChannelReport::Dialed {
                connection_id,
                remote,
                result,
            } => match result {
                Ok(stream) => {
                    self.open(stream, remote, Direction::Accepted, events, ended)
                        .await
                }
                Err(e) => {
                    warn!("Dialing {} failed: {}", remote, e);
                    forward_event(
                        events,
                        Event::ChannelClosed {
                            connection_id,
                            remote,
                            reason: e.to_string(),
                        },
                    )
                    .await;
                }
            },
        }
    }

    async fn open(
        &mut self,
        stream: HandshakenStream,
        remote: SessionId,
        direction: Direction,
        events: &EventSender,
        ended: &mpsc::UnboundedSender<ConnectionId>,
    ) {
        let connection_id = stream.connection_id;
        let handle = spawn_channel(
            stream,
            remote.clone(),
            events.clone(),
            ended.clone(),
            self.channel_buffer,
        );
        self.channels.insert(connection_id, handle);
        info!("Direct channel {} with {} open ({})", connection_id, remote, direction);
        forward_event(
            events,
            Event::ChannelOpened {
                connection_id,
                remote,
                direction,
            },
        )
        .await;
    }

    /// Tell every known peer we are leaving and close the socket
    async fn leave(mut self) {
        let mut remotes: Vec<SessionId> = self
            .channels
            .values()
            .map(|c| c.remote.clone())
            .chain(self.outbound.values().cloned())
            .chain(self.inbound.values().map(|(r, _)| r.clone()))
            .collect();
        remotes.sort();
        remotes.dedup();

        self.channels.clear();
        for remote in remotes {
            if let Err(e) = self.send_server(&ServerMessage::leave(remote.as_str())).await {
                debug!("LEAVE to {} not sent: {}", remote, e);
                break;
            }
        }
        let _ = self.sink.close().await;
    }
}
