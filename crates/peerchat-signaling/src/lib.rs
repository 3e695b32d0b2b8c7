//! PeerJS-compatible signaling for PeerChat
//!
//! `PeerJsSignaling` implements `SignalingTask` from `peerchat-core`: it
//! obtains the session identity from a PeerJS server, relays channel offers
//! through the server's WebSocket and carries messages over direct TCP
//! channels between the peers.

pub mod channel;
pub mod config;
pub mod error;
pub mod identity;
pub mod message;
pub mod transport;

pub use config::SignalingConfig;
pub use error::SignalingError;
pub use message::{Frame, ServerMessage};
pub use transport::PeerJsSignaling;
