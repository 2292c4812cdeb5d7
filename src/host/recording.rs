//! In-memory editor host.
//!
//! [`RecordingHost`] implements [`EditorHost`] without an editor: every call
//! is appended to a log of [`HostCall`]s, command results and failures are
//! scripted up front, and settings can be swapped at runtime. It backs the
//! crate's tests and the `relay` demo.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use editor_remote_control::host::RecordingHost;
//! use serde_json::json;
//!
//! let host = Arc::new(
//!     RecordingHost::new()
//!         .with_settings(json!({ "websocketUrl": "ws://127.0.0.1:9000" }))
//!         .with_response("editor.action.getSelection", json!("hello")),
//! );
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Notify;
use tokio::time::{Instant, timeout_at};
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::CommandArg;

use super::{EditorHost, NotificationLevel, StatusItem, StatusSlot, Terminal};

// ============================================================================
// Constants
// ============================================================================

/// Upper bound for [`RecordingHost::wait_until`].
const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// HostCall
// ============================================================================

/// One recorded interaction with the host.
#[derive(Debug, Clone, PartialEq)]
pub enum HostCall {
    /// `execute_command` was called.
    ExecuteCommand {
        /// Command name.
        command: String,
        /// Arguments as received.
        args: Vec<CommandArg>,
    },
    /// `open_document` was called.
    OpenDocument {
        /// Document URI.
        uri: Url,
    },
    /// A notification was shown.
    Notify {
        /// Severity.
        level: NotificationLevel,
        /// Message text.
        message: String,
    },
    /// A status bar entry was set.
    Status(StatusItem),
    /// A line was appended to the output channel.
    Log(String),
    /// An environment variable was set.
    Environment {
        /// Variable name.
        name: String,
        /// Variable value.
        value: String,
    },
    /// A command was registered.
    RegisterCommand(String),
}

// ============================================================================
// RecordingTerminal
// ============================================================================

/// Terminal that records what it was sent.
#[derive(Debug, Default)]
pub struct RecordingTerminal {
    shown: Mutex<usize>,
    sent: Mutex<Vec<String>>,
}

impl RecordingTerminal {
    /// Returns how many times the terminal was revealed.
    #[must_use]
    pub fn show_count(&self) -> usize {
        *self.shown.lock()
    }

    /// Returns every text sent so far.
    #[must_use]
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }
}

impl Terminal for RecordingTerminal {
    fn show(&self, _preserve_focus: bool) {
        *self.shown.lock() += 1;
    }

    fn send_text(&self, text: &str) {
        self.sent.lock().push(text.to_string());
    }
}

// ============================================================================
// RecordingHost
// ============================================================================

/// Scripted outcome of a host command.
#[derive(Debug, Clone)]
enum Scripted {
    Respond(Value),
    Fail(String),
}

/// In-memory [`EditorHost`].
#[derive(Debug)]
pub struct RecordingHost {
    calls: Mutex<Vec<HostCall>>,
    changed: Notify,
    settings: Mutex<Value>,
    focused: Mutex<bool>,
    terminal: Option<Arc<RecordingTerminal>>,
    scripted: HashMap<String, Scripted>,
    action_choice: Option<String>,
}

impl Default for RecordingHost {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// RecordingHost - Builder
// ============================================================================

impl RecordingHost {
    /// Creates a focused host with empty settings and no terminal.
    #[must_use]
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            changed: Notify::new(),
            settings: Mutex::new(Value::Object(Default::default())),
            focused: Mutex::new(true),
            terminal: None,
            scripted: HashMap::new(),
            action_choice: None,
        }
    }

    /// Sets the settings section returned by [`EditorHost::settings`].
    #[must_use]
    pub fn with_settings(self, settings: Value) -> Self {
        *self.settings.lock() = settings;
        self
    }

    /// Sets whether the window reports focus.
    #[must_use]
    pub fn with_focus(self, focused: bool) -> Self {
        *self.focused.lock() = focused;
        self
    }

    /// Adds an active terminal.
    #[must_use]
    pub fn with_terminal(mut self) -> Self {
        self.terminal = Some(Arc::new(RecordingTerminal::default()));
        self
    }

    /// Makes `command` return `value`.
    #[must_use]
    pub fn with_response(mut self, command: impl Into<String>, value: Value) -> Self {
        self.scripted.insert(command.into(), Scripted::Respond(value));
        self
    }

    /// Makes `command` fail with `message`.
    #[must_use]
    pub fn with_failure(mut self, command: impl Into<String>, message: impl Into<String>) -> Self {
        self.scripted
            .insert(command.into(), Scripted::Fail(message.into()));
        self
    }

    /// Picks `action` whenever a notification offers actions.
    #[must_use]
    pub fn with_action_choice(mut self, action: impl Into<String>) -> Self {
        self.action_choice = Some(action.into());
        self
    }
}

// ============================================================================
// RecordingHost - Runtime Control
// ============================================================================

impl RecordingHost {
    /// Replaces the settings section.
    pub fn set_settings(&self, settings: Value) {
        *self.settings.lock() = settings;
    }

    /// Changes the reported focus.
    pub fn set_focused(&self, focused: bool) {
        *self.focused.lock() = focused;
    }

    /// Returns the recording terminal, if configured.
    #[must_use]
    pub fn terminal(&self) -> Option<Arc<RecordingTerminal>> {
        self.terminal.clone()
    }
}

// ============================================================================
// RecordingHost - Inspection
// ============================================================================

impl RecordingHost {
    /// Returns a snapshot of every recorded call.
    #[must_use]
    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().clone()
    }

    /// Returns the executed commands with their arguments.
    #[must_use]
    pub fn executed(&self) -> Vec<(String, Vec<CommandArg>)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                HostCall::ExecuteCommand { command, args } => Some((command.clone(), args.clone())),
                _ => None,
            })
            .collect()
    }

    /// Returns the messages shown at `level`.
    #[must_use]
    pub fn notifications(&self, level: NotificationLevel) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                HostCall::Notify { level: l, message } if *l == level => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    /// Returns the output channel lines.
    #[must_use]
    pub fn logs(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                HostCall::Log(line) => Some(line.clone()),
                _ => None,
            })
            .collect()
    }

    /// Returns the latest text of a status bar entry.
    #[must_use]
    pub fn status_text(&self, slot: StatusSlot) -> Option<String> {
        self.calls.lock().iter().rev().find_map(|call| match call {
            HostCall::Status(item) if item.slot == slot => Some(item.text.clone()),
            _ => None,
        })
    }

    /// Returns the latest value of an environment variable.
    #[must_use]
    pub fn environment(&self, name: &str) -> Option<String> {
        self.calls.lock().iter().rev().find_map(|call| match call {
            HostCall::Environment { name: n, value } if n == name => Some(value.clone()),
            _ => None,
        })
    }

    /// Waits until `predicate` holds for the recorded calls.
    ///
    /// Returns `false` if it still does not hold after five seconds.
    pub async fn wait_until<F>(&self, predicate: F) -> bool
    where
        F: Fn(&[HostCall]) -> bool,
    {
        let deadline = Instant::now() + WAIT_TIMEOUT;
        loop {
            let notified = self.changed.notified();
            if predicate(&self.calls.lock()) {
                return true;
            }
            if timeout_at(deadline, notified).await.is_err() {
                return predicate(&self.calls.lock());
            }
        }
    }

    fn record(&self, call: HostCall) {
        debug!(?call, "Host call recorded");
        self.calls.lock().push(call);
        self.changed.notify_waiters();
    }
}

// ============================================================================
// EditorHost Implementation
// ============================================================================

#[async_trait]
impl EditorHost for RecordingHost {
    async fn execute_command(&self, command: &str, args: Vec<CommandArg>) -> Result<Option<Value>> {
        self.record(HostCall::ExecuteCommand {
            command: command.to_string(),
            args,
        });

        match self.scripted.get(command) {
            Some(Scripted::Respond(value)) => Ok(Some(value.clone())),
            Some(Scripted::Fail(message)) => Err(Error::host(message.clone())),
            None => Ok(None),
        }
    }

    async fn open_document(&self, uri: &Url) -> Result<()> {
        self.record(HostCall::OpenDocument { uri: uri.clone() });
        Ok(())
    }

    fn is_focused(&self) -> bool {
        *self.focused.lock()
    }

    fn active_terminal(&self) -> Option<Arc<dyn Terminal>> {
        self.terminal
            .clone()
            .map(|terminal| terminal as Arc<dyn Terminal>)
    }

    fn notify(&self, level: NotificationLevel, message: &str) {
        self.record(HostCall::Notify {
            level,
            message: message.to_string(),
        });
    }

    async fn notify_with_actions(
        &self,
        level: NotificationLevel,
        message: &str,
        actions: &[&str],
    ) -> Option<String> {
        self.notify(level, message);
        self.action_choice
            .as_ref()
            .filter(|choice| actions.contains(&choice.as_str()))
            .cloned()
    }

    fn set_status_item(&self, item: &StatusItem) {
        self.record(HostCall::Status(item.clone()));
    }

    fn append_log(&self, line: &str) {
        self.record(HostCall::Log(line.to_string()));
    }

    fn set_environment_variable(&self, name: &str, value: &str) {
        self.record(HostCall::Environment {
            name: name.to_string(),
            value: value.to_string(),
        });
    }

    fn settings(&self, _section: &str) -> Value {
        self.settings.lock().clone()
    }

    fn register_command(&self, command: &str) {
        self.record(HostCall::RegisterCommand(command.to_string()));
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[tokio::test]
    async fn test_scripted_response() {
        let host = RecordingHost::new().with_response("a.b", json!([1, 2]));
        let result = host
            .execute_command("a.b", vec![CommandArg::Undefined])
            .await
            .unwrap();
        assert_eq!(result, Some(json!([1, 2])));
        assert_eq!(
            host.executed(),
            vec![("a.b".to_string(), vec![CommandArg::Undefined])]
        );
    }

    #[tokio::test]
    async fn test_scripted_failure() {
        let host = RecordingHost::new().with_failure("a.b", "boom");
        let err = host.execute_command("a.b", vec![]).await.unwrap_err();
        assert!(matches!(err, Error::Host { .. }));
    }

    #[tokio::test]
    async fn test_action_choice_must_be_offered() {
        let host = RecordingHost::new().with_action_choice("Configure locally");
        let offered = host
            .notify_with_actions(NotificationLevel::Warning, "w", &["Configure locally"])
            .await;
        let not_offered = host
            .notify_with_actions(NotificationLevel::Warning, "w", &["Other"])
            .await;
        assert_eq!(offered.as_deref(), Some("Configure locally"));
        assert_eq!(not_offered, None);
    }

    #[tokio::test]
    async fn test_wait_until_sees_later_call() {
        let host = Arc::new(RecordingHost::new());
        let writer = Arc::clone(&host);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer.append_log("late line");
        });

        let seen = host
            .wait_until(|calls| calls.contains(&HostCall::Log("late line".into())))
            .await;
        assert!(seen);
    }

    #[test]
    fn test_status_text_is_latest() {
        let host = RecordingHost::new();
        host.set_status_item(&StatusItem::connection("one"));
        host.set_status_item(&StatusItem::connection("two"));
        assert_eq!(host.status_text(StatusSlot::Connection).as_deref(), Some("two"));
        assert_eq!(host.status_text(StatusSlot::ServerPort), None);
    }
}
