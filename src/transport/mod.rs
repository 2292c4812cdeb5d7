//! WebSocket transport layer.
//!
//! This module carries frames between the editor and a remote controller,
//! in either direction of connection establishment.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐                             ┌──────────────────┐
//! │  Editor (Rust)   │         WebSocket           │  Controller      │
//! │                  │◄───────────────────────────►│                  │
//! │  RemoteServer    │   accepted: host:PORT       │  client          │
//! │  RemoteClient    │   dialed: websocketUrl      │  server          │
//! └──────────────────┘                             └──────────────────┘
//! ```
//!
//! Both roles hand the socket to a [`Connection`], which runs the socket
//! event loop on its own task and reports [`PeerEvent`]s through an
//! unbounded channel.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `client` | Outbound connection to a configured URL |
//! | `connection` | Per-socket event loop |
//! | `server` | Local listener with port fallback |

// ============================================================================
// Submodules
// ============================================================================

/// Outbound WebSocket connection.
pub mod client;

/// Per-socket event loop.
pub mod connection;

/// Local WebSocket server.
pub mod server;

// ============================================================================
// Imports
// ============================================================================

use tokio::sync::mpsc;

use crate::identifiers::PeerId;
use crate::status::StatusEvent;

// ============================================================================
// Re-exports
// ============================================================================

pub use client::RemoteClient;
pub use connection::Connection;
pub use server::{PortKind, PortSelection, RemoteServer, bind_with_fallback};

// ============================================================================
// Events
// ============================================================================

/// Something that happened on one socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Handshake completed.
    Opened,
    /// A text frame arrived.
    Frame(String),
    /// The socket closed. Always the last event of a peer.
    Closed,
    /// The socket reported an error. `Closed` follows.
    Failed(String),
}

impl TransportEvent {
    /// Returns the status event for this transport event.
    ///
    /// Frames do not affect the connection state.
    #[must_use]
    pub fn status_event(&self) -> Option<StatusEvent> {
        match self {
            Self::Opened => Some(StatusEvent::Opened),
            Self::Closed => Some(StatusEvent::Closed),
            Self::Failed(message) => Some(StatusEvent::Failed {
                message: message.clone(),
            }),
            Self::Frame(_) => None,
        }
    }
}

/// A [`TransportEvent`] tagged with the peer it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerEvent {
    /// Originating peer.
    pub peer: PeerId,
    /// What happened.
    pub event: TransportEvent,
}

/// Sending half of a peer event channel.
pub type EventSender = mpsc::UnboundedSender<PeerEvent>;

/// Receiving half of a peer event channel.
pub type EventReceiver = mpsc::UnboundedReceiver<PeerEvent>;

/// Creates a peer event channel.
#[inline]
#[must_use]
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_have_no_status_event() {
        assert_eq!(TransportEvent::Frame("{}".into()).status_event(), None);
    }

    #[test]
    fn test_failure_status_event() {
        assert_eq!(
            TransportEvent::Failed("reset".into()).status_event(),
            Some(StatusEvent::Failed {
                message: "reset".into()
            })
        );
    }
}
