//! Configuration for the PeerJS signaling task

use peerchat_core::{DirectChannelConfig, PeerChatConfig, SignalingEndpoint};

/// Everything the signaling task needs: the server and the local channel listener
#[derive(Debug, Clone, PartialEq)]
pub struct SignalingConfig {
    pub endpoint: SignalingEndpoint,
    pub direct: DirectChannelConfig,
    /// Buffer for frames queued on one direct channel
    pub channel_buffer: usize,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self::new(SignalingEndpoint::default(), DirectChannelConfig::default())
    }
}

impl SignalingConfig {
    pub fn new(endpoint: SignalingEndpoint, direct: DirectChannelConfig) -> Self {
        Self {
            endpoint,
            direct,
            channel_buffer: 32,
        }
    }

    /// Local-only setup: server on `port`, channels on loopback
    pub fn local(port: u16) -> Self {
        Self::new(
            SignalingEndpoint {
                host: "127.0.0.1".to_string(),
                port,
                ..SignalingEndpoint::default()
            },
            DirectChannelConfig {
                bind_addr: "127.0.0.1:0".to_string(),
                advertise_host: "127.0.0.1".to_string(),
            },
        )
    }
}

impl From<&PeerChatConfig> for SignalingConfig {
    fn from(config: &PeerChatConfig) -> Self {
        Self::new(config.signaling.clone(), config.direct.clone())
    }
}
