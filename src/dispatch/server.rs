//! Server-role dispatch.
//!
//! # Rules
//!
//! 1. Focus-gating on and window unfocused: drop
//! 2. Undecodable frame: log, drop
//! 3. `terminal.execute`: type into the active terminal, never answer
//! 4. Anything else: run the host command, answer with its JSON result
//!    when the result is truthy

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde_json::{Value, to_string};
use tracing::{debug, error, trace, warn};

use crate::error::Result;
use crate::host::EditorHost;
use crate::protocol::{ServerMessage, is_truthy};

// ============================================================================
// ServerDispatcher
// ============================================================================

/// Dispatches frames received by the local server.
#[derive(Clone)]
pub struct ServerDispatcher {
    host: Arc<dyn EditorHost>,
    only_when_in_focus: bool,
}

impl fmt::Debug for ServerDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerDispatcher")
            .field("only_when_in_focus", &self.only_when_in_focus)
            .finish_non_exhaustive()
    }
}

impl ServerDispatcher {
    /// Creates a dispatcher.
    #[must_use]
    pub fn new(host: Arc<dyn EditorHost>, only_when_in_focus: bool) -> Self {
        Self {
            host,
            only_when_in_focus,
        }
    }

    /// Handles one text frame.
    ///
    /// Returns the response frame to send back, if any.
    pub async fn handle_frame(&self, frame: &str) -> Option<String> {
        if self.only_when_in_focus && !self.host.is_focused() {
            trace!("Window not focused, frame dropped");
            return None;
        }

        let message = match ServerMessage::decode(frame) {
            Ok(message) => message,
            Err(e) => {
                error!(error = %e, "Error while parsing the incoming data");
                self.host.append_log("Error while parsing the incoming data.");
                self.host.append_log(&e.to_string());
                return None;
            }
        };

        let command = message.command().to_string();
        let result = match self.dispatch(message).await {
            Ok(result) => result,
            Err(e) => {
                error!(%command, error = %e, "Command failed");
                self.host
                    .append_log(&format!("Error while executing \"{command}\": {e}"));
                return None;
            }
        };

        let value = result.filter(is_truthy)?;
        match to_string(&value) {
            Ok(text) => {
                debug!(%command, len = text.len(), "Command result ready");
                Some(text)
            }
            Err(e) => {
                error!(%command, error = %e, "Failed to encode command result");
                self.host.append_log(&e.to_string());
                None
            }
        }
    }

    /// Carries out a decoded message.
    ///
    /// Returns the host command result; terminal input never has one.
    ///
    /// # Errors
    ///
    /// Returns the host's error when the command fails.
    pub async fn dispatch(&self, message: ServerMessage) -> Result<Option<Value>> {
        match message {
            ServerMessage::TerminalExecute { text } => {
                self.run_in_terminal(text.as_deref());
                Ok(None)
            }
            ServerMessage::OpenResource { command, args }
            | ServerMessage::Execute { command, args } => {
                debug!(%command, argc = args.len(), "Executing host command");
                self.host.execute_command(&command, args).await
            }
        }
    }

    fn run_in_terminal(&self, text: Option<&str>) {
        let Some(terminal) = self.host.active_terminal() else {
            warn!("terminal.execute without an active terminal");
            return;
        };
        let Some(text) = text else {
            debug!("terminal.execute without text");
            return;
        };

        terminal.show(true);
        terminal.send_text(text);
    }
}

// ============================================================================
// Tests
// ============================================================================
