//! PeerChat Configuration
//!
//! Configuration for the channel fabric between tasks and for the two
//! deployment endpoints the core depends on: the signaling service and the
//! persistence backend.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{PeerChatError, PeerChatResult};

// ----------------------------------------------------------------------------
// Channel Configuration
// ----------------------------------------------------------------------------

/// Buffer sizes for the channels connecting the runtime tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Buffer size for Command channels (UI → Core Logic)
    pub command_buffer_size: usize,
    /// Buffer size for Event channels (Signaling → Core Logic)
    pub event_buffer_size: usize,
    /// Buffer size for Effect channels (Core Logic → Signaling)
    pub effect_buffer_size: usize,
    /// Buffer size for AppEvent channels (Core Logic → UI)
    pub app_event_buffer_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            command_buffer_size: 32,
            event_buffer_size: 128,
            effect_buffer_size: 64,
            app_event_buffer_size: 64,
        }
    }
}

impl ChannelConfig {
    /// Small buffers for tests
    pub fn testing() -> Self {
        Self {
            command_buffer_size: 10,
            event_buffer_size: 10,
            effect_buffer_size: 10,
            app_event_buffer_size: 100,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.command_buffer_size == 0
            || self.event_buffer_size == 0
            || self.effect_buffer_size == 0
            || self.app_event_buffer_size == 0
        {
            return Err("channel buffer sizes must be greater than zero".to_string());
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Signaling Endpoint
// ----------------------------------------------------------------------------

/// Location of the PeerJS-compatible signaling server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalingEndpoint {
    pub host: String,
    pub port: u16,
    /// Mount path of the server, e.g. `/myapp`
    pub path: String,
    /// API key segment used by the server
    pub key: String,
    /// Use TLS (`https`/`wss`)
    pub secure: bool,
    /// Interval between keep-alive messages
    #[serde(with = "duration_secs")]
    pub heartbeat_interval: Duration,
}

impl Default for SignalingEndpoint {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 9000,
            path: "/myapp".to_string(),
            key: "peerjs".to_string(),
            secure: false,
            heartbeat_interval: Duration::from_secs(5),
        }
    }
}

impl SignalingEndpoint {
    /// Path normalised to start and end with a slash
    fn normalized_path(&self) -> String {
        let trimmed = self.path.trim_matches('/');
        if trimmed.is_empty() {
            "/".to_string()
        } else {
            format!("/{}/", trimmed)
        }
    }

    /// URL returning a freshly assigned identity
    pub fn id_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!(
            "{}://{}:{}{}{}/id",
            scheme,
            self.host,
            self.port,
            self.normalized_path(),
            self.key
        )
    }

    /// WebSocket URL for a session with identity `id`
    pub fn socket_url(&self, id: &str, token: &str) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!(
            "{}://{}:{}{}peerjs?key={}&id={}&token={}",
            scheme,
            self.host,
            self.port,
            self.normalized_path(),
            self.key,
            id,
            token
        )
    }
}

// ----------------------------------------------------------------------------
// Direct Channel
// ----------------------------------------------------------------------------

/// Where this peer listens for direct channels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectChannelConfig {
    /// Local bind address for the channel listener
    pub bind_addr: String,
    /// Host advertised to remote peers in connection offers
    pub advertise_host: String,
}

impl Default for DirectChannelConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:0".to_string(),
            advertise_host: "127.0.0.1".to_string(),
        }
    }
}

// ----------------------------------------------------------------------------
// Backend Endpoint
// ----------------------------------------------------------------------------

/// Location of the REST persistence backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendEndpoint {
    pub base_url: String,
}

impl Default for BackendEndpoint {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
        }
    }
}

// ----------------------------------------------------------------------------
// Top-level Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for a PeerChat session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeerChatConfig {
    #[serde(default)]
    pub channels: ChannelConfig,
    #[serde(default)]
    pub signaling: SignalingEndpoint,
    #[serde(default)]
    pub direct: DirectChannelConfig,
    #[serde(default)]
    pub backend: BackendEndpoint,
}

impl PeerChatConfig {
    /// Configuration for in-process tests
    pub fn testing() -> Self {
        Self {
            channels: ChannelConfig::testing(),
            ..Self::default()
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> PeerChatResult<()> {
        self.channels.validate().map_err(PeerChatError::config_error)?;
        if self.signaling.host.trim().is_empty() {
            return Err(PeerChatError::config_error("signaling host is empty"));
        }
        if self.signaling.key.trim().is_empty() {
            return Err(PeerChatError::config_error("signaling key is empty"));
        }
        if self.signaling.heartbeat_interval.is_zero() {
            return Err(PeerChatError::config_error(
                "signaling heartbeat interval must be non-zero",
            ));
        }
        if self.backend.base_url.trim().is_empty() {
            return Err(PeerChatError::config_error("backend base URL is empty"));
        }
        Ok(())
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
