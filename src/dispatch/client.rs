//! Client-role dispatch.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde_json::{Value, from_str};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::host::EditorHost;
use crate::protocol::{ClientMessage, CommandArg, file_uri};

// ============================================================================
// Constants
// ============================================================================

/// Host command that receives the text of `cursor` messages.
pub const AGENT_CHAT_COMMAND: &str = "composer.newAgentChat";

// ============================================================================
// ClientDispatcher
// ============================================================================

/// Dispatches frames received from the dialed server.
#[derive(Clone)]
pub struct ClientDispatcher {
    host: Arc<dyn EditorHost>,
}

impl fmt::Debug for ClientDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientDispatcher").finish_non_exhaustive()
    }
}

impl ClientDispatcher {
    /// Creates a dispatcher.
    #[must_use]
    pub fn new(host: Arc<dyn EditorHost>) -> Self {
        Self { host }
    }

    /// Handles one text frame.
    ///
    /// Every frame that parses as JSON is announced to the user before
    /// dispatch, whatever its type.
    pub async fn handle_frame(&self, frame: &str) {
        let value: Value = match from_str(frame) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Error parsing command");
                self.host.append_log(&format!("Error parsing command: {e}"));
                return;
            }
        };

        let rendered = value.to_string();
        self.host
            .append_log(&format!("Received command: {rendered}"));
        self.host
            .show_info(&format!("Command received: {rendered}"));

        let message = match ClientMessage::from_json(value) {
            Ok(message) => message,
            Err(e) => {
                debug!(error = %e, "Unrecognised client message");
                return;
            }
        };

        if let Err(e) = self.dispatch(&message).await {
            warn!(error = %e, ?message, "Client command failed");
            self.host.append_log(&format!("Error handling command: {e}"));
        }
    }

    /// Carries out a decoded message.
    ///
    /// # Errors
    ///
    /// Returns the host's error when opening the document or running the
    /// agent chat command fails.
    pub async fn dispatch(&self, message: &ClientMessage) -> Result<()> {
        if let Some(path) = message.open_path() {
            self.host.show_info(&format!("Opening file: {path}"));
            let uri = file_uri(path).ok_or_else(|| Error::protocol("empty path"))?;
            return self.host.open_document(&uri).await;
        }

        if let Some(text) = message.cursor_text() {
            self.host
                .show_info(&format!("Setting cursor position: {text}"));
            self.host
                .execute_command(
                    AGENT_CHAT_COMMAND,
                    vec![CommandArg::Value(Value::String(text.to_string()))],
                )
                .await?;
            return Ok(());
        }

        debug!(?message, "No action for client message");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
