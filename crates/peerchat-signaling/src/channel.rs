//! Direct channel between two peers
//!
//! A TCP stream carrying newline-delimited JSON frames. The dialing side
//! opens with a `hello` frame naming the connection id; after that both sides
//! exchange `data` frames until one sends `bye` or drops the stream.

use peerchat_core::{ConnectionId, DirectChannelConfig, Event, EventSender, SessionId};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::error::SignalingError;
use super::message::Frame;

// ----------------------------------------------------------------------------
// Listener
// ----------------------------------------------------------------------------

/// Listener for inbound direct channels
pub struct DirectListener {
    listener: TcpListener,
    advertised: String,
}

impl DirectListener {
    pub async fn bind(config: &DirectChannelConfig) -> Result<Self, SignalingError> {
        let listener = TcpListener::bind(&config.bind_addr).await?;
        let port = listener.local_addr()?.port();
        let advertised = format!("{}:{}", config.advertise_host, port);
        info!("Direct channel listener on {}", advertised);
        Ok(Self {
            listener,
            advertised,
        })
    }

    /// Address peers should dial, as sent in offers
    pub fn advertised_address(&self) -> &str {
        &self.advertised
    }

    pub async fn accept(&self) -> Result<TcpStream, SignalingError> {
        let (stream, peer) = self.listener.accept().await?;
        debug!("Inbound direct connection from {}", peer);
        Ok(stream)
    }
}

// ----------------------------------------------------------------------------
// Handshake
// ----------------------------------------------------------------------------

/// A stream that completed the `hello` exchange
pub struct HandshakenStream {
    pub connection_id: ConnectionId,
    /// Identity the dialing side announced
    pub announced: String,
    reader: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl std::fmt::Debug for HandshakenStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandshakenStream")
            .field("connection_id", &self.connection_id)
            .field("announced", &self.announced)
            .finish()
    }
}

/// Read the first frame of an accepted stream
pub async fn read_hello(stream: TcpStream) -> Result<HandshakenStream, SignalingError> {
    let (read, writer) = stream.into_split();
    let mut reader = BufReader::new(read).lines();
    let line = reader
        .next_line()
        .await?
        .ok_or_else(|| SignalingError::Handshake {
            reason: "stream closed before hello".to_string(),
        })?;
    match Frame::decode(&line)? {
        Frame::Hello {
            connection_id,
            from,
        } => Ok(HandshakenStream {
            connection_id,
            announced: from,
            reader,
            writer,
        }),
        other => Err(SignalingError::Handshake {
            reason: format!("expected hello, got {:?}", other),
        }),
    }
}

/// Dial an offering peer and introduce ourselves
pub async fn dial(
    address: &str,
    connection_id: ConnectionId,
    local: &SessionId,
) -> Result<HandshakenStream, SignalingError> {
    let stream = TcpStream::connect(address).await?;
    let (read, mut writer) = stream.into_split();
    let hello = Frame::Hello {
        connection_id,
        from: local.to_string(),
    };
    writer.write_all(hello.encode()?.as_bytes()).await?;
    Ok(HandshakenStream {
        connection_id,
        announced: local.to_string(),
        reader: BufReader::new(read).lines(),
        writer,
    })
}

// ----------------------------------------------------------------------------
// Open Channel
// ----------------------------------------------------------------------------

/// Sending side of an open channel; dropping it closes the channel
#[derive(Debug)]
pub struct ChannelHandle {
    pub remote: SessionId,
    outgoing: mpsc::Sender<String>,
}

impl ChannelHandle {
    /// Queue a message body; false if the channel is gone
    pub async fn send(&self, body: String) -> bool {
        self.outgoing.send(body).await.is_ok()
    }
}

/// Start the I/O task for an open channel
///
/// Inbound `data` frames become `Event::DataReceived`. When the channel ends
/// for any reason the task sends `Event::ChannelClosed` and reports the id on
/// `ended`.
pub fn spawn_channel(
    stream: HandshakenStream,
    remote: SessionId,
    events: EventSender,
    ended: mpsc::UnboundedSender<ConnectionId>,
    buffer: usize,
) -> ChannelHandle {
    let (outgoing, queued) = mpsc::channel(buffer.max(1));
    let handle = ChannelHandle {
        remote: remote.clone(),
        outgoing,
    };
    tokio::spawn(async move {
        let connection_id = stream.connection_id;
        let reason = run_channel(stream, &remote, queued, &events).await;
        info!("Direct channel {} with {} ended: {}", connection_id, remote, reason);
        let _ = events
            .send(Event::ChannelClosed {
                connection_id,
                remote,
                reason,
            })
            .await;
        let _ = ended.send(connection_id);
    });
    handle
}

async fn run_channel(
    stream: HandshakenStream,
    remote: &SessionId,
    mut queued: mpsc::Receiver<String>,
    events: &EventSender,
) -> String {
    let HandshakenStream {
        connection_id,
        mut reader,
        mut writer,
        ..
    } = stream;

    let reason = loop {
        tokio::select! {
            line = reader.next_line() => match line {
                Ok(Some(line)) => match Frame::decode(&line) {
                    Ok(Frame::Data { body }) => {
                        let event = Event::DataReceived {
                            connection_id,
                            remote: remote.clone(),
                            body,
                        };
                        if events.send(event).await.is_err() {
                            break "core logic stopped".to_string();
                        }
                    }
                    Ok(Frame::Bye) => break "closed by peer".to_string(),
                    Ok(Frame::Hello { .. }) => warn!("Unexpected hello on open channel {}", connection_id),
                    Err(e) => warn!("Dropping malformed frame on {}: {}", connection_id, e),
                },
                Ok(None) => break "closed by peer".to_string(),
                Err(e) => break e.to_string(),
            },
            body = queued.recv() => match body {
                Some(body) => {
                    if let Err(e) = write_frame(&mut writer, &Frame::Data { body }).await {
                        break e.to_string();
                    }
                }
                None => {
                    let _ = write_frame(&mut writer, &Frame::Bye).await;
                    break "closed locally".to_string();
                }
            },
        }
    };
    let _ = writer.shutdown().await;
    reason
}

async fn write_frame(writer: &mut OwnedWriteHalf, frame: &Frame) -> Result<(), SignalingError> {
    writer.write_all(frame.encode()?.as_bytes()).await?;
    Ok(())
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn loopback() -> DirectChannelConfig {
        DirectChannelConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            advertise_host: "127.0.0.1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_hello_then_data_both_ways() {
        let listener = DirectListener::bind(&loopback()).await.unwrap();
        let address = listener.advertised_address().to_string();
        let cid = ConnectionId::generate();
        let alice = SessionId::new("alice").unwrap();
        let bob = SessionId::new("bob").unwrap();

        let accept = tokio::spawn(async move {
            let stream = listener.accept().await.unwrap();
            read_hello(stream).await.unwrap()
        });
        let dialed = dial(&address, cid, &bob).await.unwrap();
        let accepted = timeout(Duration::from_secs(1), accept).await.unwrap().unwrap();
        assert_eq!(accepted.connection_id, cid);
        assert_eq!(accepted.announced, "bob");

        let (a_events, mut a_rx) = mpsc::channel(8);
        let (b_events, mut b_rx) = mpsc::channel(8);
        let (ended, mut ended_rx) = mpsc::unbounded_channel();
        let a = spawn_channel(accepted, bob.clone(), a_events, ended.clone(), 4);
        let b = spawn_channel(dialed, alice.clone(), b_events, ended, 4);

        assert!(a.send("to bob".to_string()).await);
        let Some(Event::DataReceived { body, remote, .. }) = b_rx.recv().await else {
            panic!("expected data");
        };
        assert_eq!((body.as_str(), remote.as_str()), ("to bob", "alice"));

        assert!(b.send("to alice".to_string()).await);
        let Some(Event::DataReceived { body, .. }) = a_rx.recv().await else {
            panic!("expected data");
        };
        assert_eq!(body, "to alice");

        drop(a);
        let closed = timeout(Duration::from_secs(1), b_rx.recv()).await.unwrap();
        assert!(matches!(closed, Some(Event::ChannelClosed { ref reason, .. }) if reason == "closed by peer"));
        let first = timeout(Duration::from_secs(1), ended_rx.recv()).await.unwrap();
        assert_eq!(first, Some(cid));
    }

    #[tokio::test]
    async fn test_non_hello_first_frame_is_rejected() {
        let listener = DirectListener::bind(&loopback()).await.unwrap();
        let address = listener.advertised_address().to_string();

        let accept = tokio::spawn(async move {
            let stream = listener.accept().await.unwrap();
            read_hello(stream).await
        });
        let mut stream = TcpStream::connect(&address).await.unwrap();
        stream
            .write_all(Frame::Data { body: "x".into() }.encode().unwrap().as_bytes())
            .await
            .unwrap();

        let result = timeout(Duration::from_secs(1), accept).await.unwrap().unwrap();
        assert!(matches!(result, Err(SignalingError::Handshake { .. })));
    }
}
