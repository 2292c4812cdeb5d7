//! Settings and role configuration.
//!
//! The host stores settings under the `remoteControl` section. They are
//! read as JSON into [`Settings`] (unset keys may be missing or `null`) and
//! then split into a validated [`ClientConfig`] and a [`ServerConfig`].
//!
//! # Keys
//!
//! | Key | Type | Default | Role |
//! |-----|------|---------|------|
//! | `websocketUrl` | string | required | client |
//! | `enable` | bool | `false` | server |
//! | `host` | string | `127.0.0.1` | server |
//! | `port` | number | `3710` | server |
//! | `fallbacks` | number[] | `[]` | server |
//! | `onlyWhenInFocus` | bool | `false` | server |

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;
use serde_json::{Value, from_value};
use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Settings section name.
pub const SETTINGS_SECTION: &str = "remoteControl";

/// Fully qualified key of the client URL.
pub const WEBSOCKET_URL_KEY: &str = "remoteControl.websocketUrl";

/// Extension identifier used to filter the settings UI.
pub const EXTENSION_ID: &str = "eliostruyf.vscode-remote-control";

/// Default server host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3710;

// ============================================================================
// Settings
// ============================================================================

/// Raw settings section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Server URL for the client role.
    #[serde(default)]
    pub websocket_url: Option<String>,

    /// Whether the server role starts.
    #[serde(default)]
    pub enable: Option<bool>,

    /// Server bind host.
    #[serde(default)]
    pub host: Option<String>,

    /// Server primary port.
    #[serde(default)]
    pub port: Option<u16>,

    /// Server fallback ports, in order.
    #[serde(default)]
    pub fallbacks: Option<Vec<u16>>,

    /// Drop server frames while the window is unfocused.
    #[serde(default)]
    pub only_when_in_focus: Option<bool>,
}

impl Settings {
    /// Reads settings from the host's JSON section.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a key has the wrong type.
    pub fn from_json(value: Value) -> Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        from_value(value).map_err(|e| Error::config(format!("invalid settings: {e}")))
    }

    /// Returns the client configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::MissingSetting`] if `websocketUrl` is unset or blank
    /// - [`Error::Config`] if it is not a `ws://` or `wss://` URL
    pub fn client_config(&self) -> Result<ClientConfig> {
        let raw = self
            .websocket_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| Error::missing_setting(WEBSOCKET_URL_KEY))?;

        ClientConfig::new(raw)
    }

    /// Returns the server configuration with defaults applied.
    #[must_use]
    pub fn server_config(&self) -> ServerConfig {
        let port = self.port.unwrap_or(DEFAULT_PORT);
        let host = self
            .host
            .clone()
            .filter(|host| !host.is_empty())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());

        ServerConfig {
            enabled: self.enable.unwrap_or(false),
            host,
            port,
            fallbacks: self.fallbacks.clone().unwrap_or_default(),
            only_when_in_focus: self.only_when_in_focus.unwrap_or(false),
        }
    }
}

// ============================================================================
// ClientConfig
// ============================================================================

/// Validated client role configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Server to dial.
    pub url: Url,
}

impl ClientConfig {
    /// Parses and validates a WebSocket URL.
    ///
    /// # Errors
    ///
    /// - [`Error::Url`] if the string is not a URL
    /// - [`Error::Config`] if the scheme is not `ws` or `wss`
    pub fn new(url: &str) -> Result<Self> {
        let url = Url::parse(url)?;
        match url.scheme() {
            "ws" | "wss" => Ok(Self { url }),
            scheme => Err(Error::config(format!(
                "unsupported WebSocket URL scheme \"{scheme}\""
            ))),
        }
    }
}

// ============================================================================
// ServerConfig
// ============================================================================

/// Server role configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Whether the server role starts.
    pub enabled: bool,

    /// Bind host.
    pub host: String,

    /// Primary port. 0 lets the OS choose.
    pub port: u16,

    /// Fallback ports, in order.
    pub fallbacks: Vec<u16>,

    /// Drop frames while the window is unfocused.
    pub only_when_in_focus: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            fallbacks: Vec::new(),
            only_when_in_focus: false,
        }
    }
}

impl ServerConfig {
    /// Enables the server role.
    #[inline]
    #[must_use]
    pub fn with_enabled(mut self) -> Self {
        self.enabled = true;
        self
    }

    /// Sets the bind host.
    #[inline]
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the primary port.
    #[inline]
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the fallback ports.
    #[inline]
    #[must_use]
    pub fn with_fallbacks(mut self, fallbacks: impl IntoIterator<Item = u16>) -> Self {
        self.fallbacks = fallbacks.into_iter().collect();
        self
    }

    /// Enables focus-gating.
    #[inline]
    #[must_use]
    pub fn with_focus_gating(mut self) -> Self {
        self.only_when_in_focus = true;
        self
    }

    /// Returns the fallback ports with the primary port removed.
    #[must_use]
    pub fn fallback_ports(&self) -> Vec<u16> {
        self.fallbacks
            .iter()
            .copied()
            .filter(|&port| port != self.port)
            .collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
