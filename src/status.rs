//! Connection status reporting.
//!
//! The client connection is tracked by an explicit state machine. Transport
//! activity is reduced to a closed set of [`StatusEvent`]s; each event maps
//! to one target [`ConnectionState`], and [`StatusReporter::apply`] accepts
//! the event only when the transition is legal.
//!
//! # Transitions
//!
//! ```text
//!                 Connecting (from any state)
//!                      │
//!        ┌─────────────┼──────────────┐
//!        ▼             ▼              ▼
//!   Connected ──► Error ──► Disconnected
//!        │                            ▲
//!        └────────────────────────────┘
//! ```
//!
//! Every accepted transition updates the connection status bar entry and
//! appends a line to the host output channel.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::host::{EditorHost, StatusItem};

// ============================================================================
// Constants
// ============================================================================

/// Status bar text shown before any connection attempt.
pub const STATUS_LABEL: &str = "$(radio-tower) Remote Control";

// ============================================================================
// ConnectionState
// ============================================================================

/// State of the client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No connection.
    #[default]
    Disconnected,
    /// Dialing.
    Connecting,
    /// Handshake completed.
    Connected,
    /// Transport reported an error. A close usually follows.
    Error,
}

impl ConnectionState {
    /// Returns `true` if moving from `self` to `next` is allowed.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (_, Self::Connecting)
                | (Self::Connecting, Self::Connected)
                | (Self::Connecting | Self::Connected, Self::Error)
                | (
                    Self::Connecting | Self::Connected | Self::Error,
                    Self::Disconnected
                )
        )
    }

    /// Returns the label used in the status bar.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Error => "Error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// StatusEvent
// ============================================================================

/// Transport activity relevant to the connection state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    /// A connection attempt started.
    Connecting {
        /// Target URL.
        url: String,
    },
    /// The WebSocket handshake completed.
    Opened,
    /// The connection closed.
    Closed,
    /// The transport reported an error.
    Failed {
        /// Error description.
        message: String,
    },
}

impl StatusEvent {
    /// Returns the state this event leads to.
    #[must_use]
    pub const fn target(&self) -> ConnectionState {
        match self {
            Self::Connecting { .. } => ConnectionState::Connecting,
            Self::Opened => ConnectionState::Connected,
            Self::Closed => ConnectionState::Disconnected,
            Self::Failed { .. } => ConnectionState::Error,
        }
    }
}

// ============================================================================
// StatusReporter
// ============================================================================

/// Owns the connection state and mirrors it into the host UI.
pub struct StatusReporter {
    host: Arc<dyn EditorHost>,
    state: ConnectionState,
}

impl fmt::Debug for StatusReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusReporter")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl StatusReporter {
    /// Creates a reporter in the `Disconnected` state.
    #[must_use]
    pub fn new(host: Arc<dyn EditorHost>) -> Self {
        Self {
            host,
            state: ConnectionState::Disconnected,
        }
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Shows the status bar entry with its initial label.
    pub fn show(&self) {
        self.host
            .set_status_item(&StatusItem::connection(STATUS_LABEL));
    }

    /// Applies an event.
    ///
    /// Returns the new state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] if the event is not legal in the
    /// current state; the state and the UI are left untouched.
    pub fn apply(&mut self, event: &StatusEvent) -> Result<ConnectionState> {
        let next = event.target();
        if !self.state.can_transition_to(next) {
            warn!(from = %self.state, to = %next, "Rejected connection state transition");
            return Err(Error::invalid_transition(self.state, next));
        }

        debug!(from = %self.state, to = %next, "Connection state transition");
        self.state = next;
        self.host
            .set_status_item(&StatusItem::connection(format!("{STATUS_LABEL}: {next}")));

        match event {
            StatusEvent::Connecting { url } => {
                info!(%url, "Connecting");
                self.host
                    .append_log(&format!("Connecting to Remote Control server at {url}"));
            }
            StatusEvent::Opened => {
                info!("Connected");
                self.host.append_log("Connected to Remote Control server");
                self.host.show_info("Connected to Remote Control server");
            }
            StatusEvent::Closed => {
                info!("Disconnected");
                self.host.append_log("Disconnected from remote control server");
                self.host
                    .show_warning("Disconnected from remote control server");
            }
            StatusEvent::Failed { message } => {
                warn!(%message, "WebSocket error");
                self.host.append_log(&format!("WebSocket error: {message}"));
                self.host.show_error(&format!("WebSocket error: {message}"));
            }
        }

        Ok(next)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::host::{NotificationLevel, RecordingHost, StatusSlot};

    fn reporter() -> (Arc<RecordingHost>, StatusReporter) {
        let host = Arc::new(RecordingHost::new());
        let reporter = StatusReporter::new(host.clone());
        (host, reporter)
    }

    fn connecting() -> StatusEvent {
        StatusEvent::Connecting {
            url: "ws://127.0.0.1:9000".into(),
        }
    }

    #[test]
    fn test_happy_path() {
        let (host, mut reporter) = reporter();

        assert_eq!(reporter.apply(&connecting()).unwrap(), ConnectionState::Connecting);
        assert_eq!(reporter.apply(&StatusEvent::Opened).unwrap(), ConnectionState::Connected);
        assert_eq!(
            reporter.apply(&StatusEvent::Closed).unwrap(),
            ConnectionState::Disconnected
        );

        assert_eq!(
            host.status_text(StatusSlot::Connection).as_deref(),
            Some("$(radio-tower) Remote Control: Disconnected")
        );
        assert_eq!(
            host.notifications(NotificationLevel::Info),
            vec!["Connected to Remote Control server".to_string()]
        );
        assert_eq!(
            host.notifications(NotificationLevel::Warning),
            vec!["Disconnected from remote control server".to_string()]
        );
        assert_eq!(
            host.logs()[0],
            "Connecting to Remote Control server at ws://127.0.0.1:9000"
        );
    }

    #[test]
    fn test_error_then_close() {
        let (host, mut reporter) = reporter();
        reporter.apply(&connecting()).unwrap();
        reporter
            .apply(&StatusEvent::Failed {
                message: "refused".into(),
            })
            .unwrap();
        assert_eq!(reporter.state(), ConnectionState::Error);
        assert_eq!(
            host.status_text(StatusSlot::Connection).as_deref(),
            Some("$(radio-tower) Remote Control: Error")
        );

        reporter.apply(&StatusEvent::Closed).unwrap();
        assert_eq!(reporter.state(), ConnectionState::Disconnected);
        assert_eq!(
            host.notifications(NotificationLevel::Error),
            vec!["WebSocket error: refused".to_string()]
        );
    }

    #[test]
    fn test_open_requires_connecting() {
        let (host, mut reporter) = reporter();
        let err = reporter.apply(&StatusEvent::Opened).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
        assert_eq!(reporter.state(), ConnectionState::Disconnected);
        assert!(host.calls().is_empty());
    }

    #[test]
    fn test_close_when_disconnected_is_rejected() {
        let (_host, mut reporter) = reporter();
        assert!(reporter.apply(&StatusEvent::Closed).is_err());
    }

    #[test]
    fn test_reconnect_from_any_state() {
        for state in [
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Error,
        ] {
            assert!(state.can_transition_to(ConnectionState::Connecting));
        }
    }

    #[test]
    fn test_illegal_transitions() {
        assert!(!ConnectionState::Disconnected.can_transition_to(ConnectionState::Connected));
        assert!(!ConnectionState::Disconnected.can_transition_to(ConnectionState::Error));
        assert!(!ConnectionState::Error.can_transition_to(ConnectionState::Connected));
        assert!(!ConnectionState::Error.can_transition_to(ConnectionState::Error));
    }

    #[test]
    fn test_show_initial_label() {
        let (host, reporter) = reporter();
        reporter.show();
        assert_eq!(
            host.status_text(StatusSlot::Connection).as_deref(),
            Some(STATUS_LABEL)
        );
    }
}
