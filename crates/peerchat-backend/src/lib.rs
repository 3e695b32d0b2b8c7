//! REST backend for PeerChat
//!
//! `HttpBackend` implements `BackendClient` from `peerchat-core` against the
//! persistence and directory service:
//!
//! - `POST /api/register` with `{name, peerId}`
//! - `POST /api/message` with `{senderId, receiverId, message}`
//! - `GET /api/messages/{localId}/{remoteId}`

pub mod client;
pub mod error;

pub use client::HttpBackend;
pub use error::BackendError;
