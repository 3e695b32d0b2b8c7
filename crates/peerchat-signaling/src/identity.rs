//! Session identity acquisition
//!
//! The server hands out an identity over HTTP, then the client opens the
//! WebSocket under that identity and waits for the server's `OPEN`.

use futures::StreamExt;
use peerchat_core::{SessionId, SignalingEndpoint};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};
use uuid::Uuid;

use super::error::SignalingError;
use super::message::ServerMessage;

pub type SignalingSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Ask the server for a fresh identity
pub async fn request_identity(
    client: &reqwest::Client,
    endpoint: &SignalingEndpoint,
) -> Result<SessionId, SignalingError> {
    let url = endpoint.id_url();
    debug!("Requesting identity from {}", url);
    let text = client
        .get(&url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    SessionId::new(text.trim()).map_err(|e| SignalingError::InvalidIdentity(e.to_string()))
}

/// Random token tying the socket to this session
pub fn session_token() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Open the socket for `id` and wait until the server confirms the session
pub async fn open_session(
    endpoint: &SignalingEndpoint,
    id: &SessionId,
) -> Result<SignalingSocket, SignalingError> {
    let url = endpoint.socket_url(id.as_str(), &session_token());
    let (mut socket, _) = connect_async(url.as_str()).await?;

    while let Some(frame) = socket.next().await {
        let text = match frame? {
            WsMessage::Text(text) => text,
            WsMessage::Close(_) => break,
            _ => continue,
        };
        match ServerMessage::from_json(&text)? {
            ServerMessage::Open => {
                info!("Signaling session open as {}", id);
                return Ok(socket);
            }
            ServerMessage::IdTaken { .. } => {
                return Err(SignalingError::IdTaken { id: id.to_string() })
            }
            ServerMessage::Error { payload } => {
                return Err(SignalingError::Server {
                    message: payload.map(|p| p.msg).unwrap_or_default(),
                })
            }
            other => debug!("Ignoring {:?} before OPEN", other),
        }
    }
    Err(SignalingError::SocketClosed)
}

/// Full acquisition: HTTP identity followed by the socket handshake
pub async fn acquire(
    client: &reqwest::Client,
    endpoint: &SignalingEndpoint,
) -> Result<(SessionId, SignalingSocket), SignalingError> {
    let id = request_identity(client, endpoint).await?;
    let socket = open_session(endpoint, &id).await?;
    Ok((id, socket))
}
