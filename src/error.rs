//! Error types for the remote control relay.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```no_run
//! use editor_remote_control::Result;
//! use editor_remote_control::transport::{RemoteServer, event_channel};
//!
//! async fn example() -> Result<()> {
//!     let (events_tx, _events) = event_channel();
//!     let server = RemoteServer::start("127.0.0.1", 3710, &[3711], events_tx).await?;
//!     println!("listening on {}", server.port());
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::MissingSetting`] |
//! | Transport | [`Error::Bind`], [`Error::Connection`], [`Error::ConnectionClosed`] |
//! | Protocol | [`Error::Protocol`] |
//! | Host | [`Error::Host`] |
//! | State | [`Error::InvalidTransition`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`], [`Error::Url`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::status::ConnectionState;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when a setting is present but invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// A required setting is absent.
    #[error("Missing setting: {key}")]
    MissingSetting {
        /// Fully qualified setting key.
        key: String,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// Failed to bind the server socket.
    #[error("Failed to bind {address}: {source}")]
    Bind {
        /// Address that could not be bound.
        address: String,
        /// Underlying IO error.
        #[source]
        source: IoError,
    },

    /// WebSocket connection failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// WebSocket connection already closed.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Frame does not match any recognised message shape.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Host Errors
    // ========================================================================
    /// The editor host failed to carry out a request.
    #[error("Host error: {message}")]
    Host {
        /// Message reported by the host.
        message: String,
    },

    // ========================================================================
    // State Errors
    // ========================================================================
    /// Connection state transition not allowed by the state machine.
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        /// Current state.
        from: ConnectionState,
        /// Requested state.
        to: ConnectionState,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// URL parse error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a missing setting error.
    #[inline]
    pub fn missing_setting(key: impl Into<String>) -> Self {
        Self::MissingSetting { key: key.into() }
    }

    /// Creates a bind error.
    #[inline]
    pub fn bind(address: impl Into<String>, source: IoError) -> Self {
        Self::Bind {
            address: address.into(),
            source,
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a host error.
    #[inline]
    pub fn host(message: impl Into<String>) -> Self {
        Self::Host {
            message: message.into(),
        }
    }

    /// Creates an invalid transition error.
    #[inline]
    pub fn invalid_transition(from: ConnectionState, to: ConnectionState) -> Self {
        Self::InvalidTransition { from, to }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a configuration error.
    #[inline]
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::Config { .. } | Self::MissingSetting { .. })
    }

    /// Returns `true` if this is a transport error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Bind { .. } | Self::Connection { .. } | Self::ConnectionClosed | Self::WebSocket(_)
        )
    }

    /// Returns `true` if the error concerns a single frame.
    ///
    /// Frame errors drop the frame and leave the connection open.
    #[inline]
    #[must_use]
    pub fn is_frame_error(&self) -> bool {
        matches!(self, Self::Json(_) | Self::Protocol { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================
