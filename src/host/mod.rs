//! Editor host abstraction.
//!
//! Everything the relay does inside the editor goes through [`EditorHost`]:
//! command execution, documents, notifications, the status bar, the log
//! stream, terminals, settings and environment variables. Embedders
//! implement the trait on top of their editor; [`RecordingHost`] is an
//! in-memory implementation that records every call.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`EditorHost`] | Host API consumed by the relay |
//! | [`Terminal`] | Integrated terminal handle |
//! | [`StatusItem`] | Status bar entry |
//! | [`NotificationLevel`] | Severity of a user-visible message |
//! | [`RecordingHost`] | In-memory host that records calls |

// ============================================================================
// Submodules
// ============================================================================

/// In-memory host implementation.
pub mod recording;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use crate::error::Result;
use crate::protocol::CommandArg;

// ============================================================================
// Re-exports
// ============================================================================

pub use recording::{HostCall, RecordingHost, RecordingTerminal};

// ============================================================================
// NotificationLevel
// ============================================================================

/// Severity of a user-visible notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationLevel {
    /// Informational message.
    Info,
    /// Warning message.
    Warning,
    /// Error message.
    Error,
}

impl fmt::Display for NotificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => f.write_str("info"),
            Self::Warning => f.write_str("warning"),
            Self::Error => f.write_str("error"),
        }
    }
}

// ============================================================================
// StatusItem
// ============================================================================

/// Which status bar entry an update targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusSlot {
    /// Client connection state, right-aligned.
    Connection,
    /// Listening port of the local server, left-aligned.
    ServerPort,
}

/// Horizontal placement in the status bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusAlignment {
    /// Left side.
    Left,
    /// Right side.
    Right,
}

/// A status bar entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusItem {
    /// Entry being updated.
    pub slot: StatusSlot,
    /// Placement.
    pub alignment: StatusAlignment,
    /// Ordering priority within the side.
    pub priority: i32,
    /// Visible text, may contain `$(icon)` references.
    pub text: String,
    /// Hover text.
    pub tooltip: Option<String>,
}

impl StatusItem {
    /// Creates the right-aligned connection entry.
    #[must_use]
    pub fn connection(text: impl Into<String>) -> Self {
        Self {
            slot: StatusSlot::Connection,
            alignment: StatusAlignment::Right,
            priority: 100,
            text: text.into(),
            tooltip: Some("Remote Control Extension".to_string()),
        }
    }

    /// Creates the left-aligned server port entry.
    #[must_use]
    pub fn server_port(text: impl Into<String>, tooltip: impl Into<String>) -> Self {
        Self {
            slot: StatusSlot::ServerPort,
            alignment: StatusAlignment::Left,
            priority: 100,
            text: text.into(),
            tooltip: Some(tooltip.into()),
        }
    }
}

// ============================================================================
// Terminal
// ============================================================================

/// Handle to an integrated terminal.
pub trait Terminal: Send + Sync {
    /// Reveals the terminal panel.
    fn show(&self, preserve_focus: bool);

    /// Types `text` into the terminal followed by a newline.
    fn send_text(&self, text: &str);
}

// ============================================================================
// EditorHost
// ============================================================================

/// Editor API consumed by the relay.
///
/// Implementations must be cheap to share; the relay holds them behind an
/// `Arc` and calls them from several tasks.
#[async_trait]
pub trait EditorHost: Send + Sync + 'static {
    /// Executes a host command and returns its result, if any.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Host`] when the command fails or is unknown.
    async fn execute_command(&self, command: &str, args: Vec<CommandArg>) -> Result<Option<Value>>;

    /// Opens the document at `uri` and shows it in an editor.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Host`] when the document cannot be opened.
    async fn open_document(&self, uri: &Url) -> Result<()>;

    /// Returns `true` if the editor window has input focus.
    fn is_focused(&self) -> bool;

    /// Returns the active integrated terminal, if any.
    fn active_terminal(&self) -> Option<Arc<dyn Terminal>>;

    /// Shows a notification without actions.
    fn notify(&self, level: NotificationLevel, message: &str);

    /// Shows a notification with action buttons and waits for the choice.
    ///
    /// Returns the chosen action, or `None` if dismissed.
    async fn notify_with_actions(
        &self,
        level: NotificationLevel,
        message: &str,
        actions: &[&str],
    ) -> Option<String>;

    /// Creates or updates a status bar entry.
    fn set_status_item(&self, item: &StatusItem);

    /// Appends one line to the relay's output channel.
    fn append_log(&self, line: &str);

    /// Sets an environment variable for processes the host spawns.
    fn set_environment_variable(&self, name: &str, value: &str);

    /// Returns the settings section as a JSON object.
    ///
    /// Unset keys may be missing or `null`.
    fn settings(&self, section: &str) -> Value;

    /// Makes a relay command invocable from the editor.
    fn register_command(&self, command: &str);

    /// Shows an informational notification.
    fn show_info(&self, message: &str) {
        self.notify(NotificationLevel::Info, message);
    }

    /// Shows a warning notification.
    fn show_warning(&self, message: &str) {
        self.notify(NotificationLevel::Warning, message);
    }

    /// Shows an error notification.
    fn show_error(&self, message: &str) {
        self.notify(NotificationLevel::Error, message);
    }
}

// ============================================================================
// Tests
// ============================================================================
