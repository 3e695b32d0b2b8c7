//! PeerChat CLI Configuration
//!
//! Layered with figment, lowest priority first:
//! - built-in defaults
//! - `peerchat.toml` in the working directory, then the user config file
//!   (`<config dir>/peerchat/config.toml`) or an explicit `--config` file
//! - `PEERCHAT_` environment variables, nested keys separated by `__`
//!   (e.g. `PEERCHAT_BACKEND__BASE_URL`)
//! - command line flags

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use peerchat_core::PeerChatConfig;

// ----------------------------------------------------------------------------
// CLI Application Configuration
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CliAppConfig {
    /// Session configuration: `[channels]`, `[signaling]`, `[direct]`, `[backend]`
    #[serde(flatten)]
    pub session: PeerChatConfig,

    #[serde(default)]
    pub cli: CliConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    pub verbose: bool,
    pub prompt: String,
    /// Display name registered with the directory after the identity arrives
    pub name: Option<String>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            prompt: "> ".to_string(),
            name: None,
        }
    }
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_file: Option<PathBuf>,
    pub verbose: bool,
    pub signaling_host: Option<String>,
    pub signaling_port: Option<u16>,
    pub backend_url: Option<String>,
    pub name: Option<String>,
}

// ----------------------------------------------------------------------------
// Configuration Loading Logic
// ----------------------------------------------------------------------------

impl CliAppConfig {
    pub fn load(overrides: &CliOverrides) -> Result<Self, ConfigError> {
        let mut figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file("peerchat.toml"));

        figment = match &overrides.config_file {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::FileSystem(format!(
                        "config file {} not found",
                        path.display()
                    )));
                }
                figment.merge(Toml::file(path))
            }
            None => match Self::default_config_path() {
                Some(path) => figment.merge(Toml::file(path)),
                None => figment,
            },
        };

        figment = figment.merge(Env::prefixed("PEERCHAT_").split("__"));
        figment = Self::apply_overrides(figment, overrides);

        let config: CliAppConfig = figment
            .extract()
            .map_err(|e| ConfigError::Loading(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a single file on top of the defaults, without environment or flags
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: CliAppConfig = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .extract()
            .map_err(|e| {
                ConfigError::Loading(format!("{}: {}", path.as_ref().display(), e))
            })?;
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides(mut figment: Figment, overrides: &CliOverrides) -> Figment {
        if overrides.verbose {
            figment = figment.merge(("cli.verbose", true));
        }
        if let Some(host) = &overrides.signaling_host {
            figment = figment.merge(("signaling.host", host.clone()));
        }
        if let Some(port) = overrides.signaling_port {
            figment = figment.merge(("signaling.port", port));
        }
        if let Some(url) = &overrides.backend_url {
            figment = figment.merge(("backend.base_url", url.clone()));
        }
        if let Some(name) = &overrides.name {
            figment = figment.merge(("cli.name", name.clone()));
        }
        figment
    }

    /// `<config dir>/peerchat/config.toml`, if the platform has a config dir
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("peerchat").join("config.toml"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.session
            .validate()
            .map_err(|e| ConfigError::Validation(e.to_string()))?;
        if let Some(name) = &self.cli.name {
            if name.trim().is_empty() {
                return Err(ConfigError::Validation("display name is blank".to_string()));
            }
        }
        Ok(())
    }

    /// Commented-free TOML with every setting at its default
    pub fn example_config() -> String {
        let example = CliAppConfig {
            cli: CliConfig {
                name: Some("alice".to_string()),
                ..CliConfig::default()
            },
            ..Default::default()
        };
        toml::to_string_pretty(&example)
            .unwrap_or_else(|e| format!("# failed to render example config: {}", e))
    }
}

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration loading error: {0}")]
    Loading(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("File system error: {0}")]
    FileSystem(String),
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
