//! Server-role message types.
//!
//! A controller connected to the local server sends
//! `{"command": "...", "args": ...}` frames. Decoding sorts each frame into
//! one of three shapes:
//!
//! | Command | Variant | Behavior |
//! |---------|---------|----------|
//! | `vscode.open`, `vscode.openFolder`, `markdown.showPreview` | [`ServerMessage::OpenResource`] | first argument rewritten to a file URI |
//! | `terminal.execute` | [`ServerMessage::TerminalExecute`] | text sent to the active terminal |
//! | anything else | [`ServerMessage::Execute`] | forwarded to the host command API |

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Deserializer};
use serde_json::{Value, from_str, from_value};

use crate::error::{Error, Result};

use super::args::{CommandArg, CommandArgs, file_uri};

// ============================================================================
// Constants
// ============================================================================

/// Commands whose first argument is a path that must become a URI.
pub const OPEN_RESOURCE_COMMANDS: &[&str] =
    &["vscode.open", "vscode.openFolder", "markdown.showPreview"];

/// Pseudo-command that types into the active terminal.
pub const TERMINAL_EXECUTE_COMMAND: &str = "terminal.execute";

// ============================================================================
// Wire Format
// ============================================================================

/// Frame as it appears on the wire.
#[derive(Debug, Deserialize)]
struct RawServerMessage {
    command: String,

    /// `Some(Value::Null)` for an explicit `null`, `None` when absent.
    #[serde(default, deserialize_with = "present")]
    args: Option<Value>,
}

/// Keeps an explicit `null` distinct from a missing field.
fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

// ============================================================================
// ServerMessage
// ============================================================================

/// A decoded server-role frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Open-style command with the path argument already rewritten.
    OpenResource {
        /// Host command name.
        command: String,
        /// Host arguments, first one a URI when a path was given.
        args: Vec<CommandArg>,
    },

    /// Type text into the active terminal.
    TerminalExecute {
        /// Text to send, `None` when the frame carried no usable args.
        text: Option<String>,
    },

    /// Any other host command.
    Execute {
        /// Host command name.
        command: String,
        /// Host arguments after spreading.
        args: Vec<CommandArg>,
    },
}

impl ServerMessage {
    /// Decodes a text frame.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the frame is not valid JSON
    /// - [`Error::Protocol`] if the JSON has no string `command`
    pub fn decode(frame: &str) -> Result<Self> {
        let value: Value = from_str(frame)?;
        Self::from_json(value)
    }

    /// Decodes an already parsed JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the JSON has no string `command`.
    pub fn from_json(value: Value) -> Result<Self> {
        let raw: RawServerMessage = from_value(value)
            .map_err(|e| Error::protocol(format!("invalid server message: {e}")))?;

        let args = CommandArgs::from(raw.args);
        let command = raw.command;

        if command == TERMINAL_EXECUTE_COMMAND {
            return Ok(Self::TerminalExecute {
                text: args.to_terminal_text(),
            });
        }

        if OPEN_RESOURCE_COMMANDS.contains(&command.as_str()) {
            return Ok(Self::OpenResource {
                args: rewrite_first_path(args),
                command,
            });
        }

        Ok(Self::Execute {
            command,
            args: args.into_host_args(),
        })
    }

    /// Returns the host command name.
    #[must_use]
    pub fn command(&self) -> &str {
        match self {
            Self::OpenResource { command, .. } | Self::Execute { command, .. } => command,
            Self::TerminalExecute { .. } => TERMINAL_EXECUTE_COMMAND,
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Replaces a non-empty path string in first position with its file URI.
fn rewrite_first_path(args: CommandArgs) -> Vec<CommandArg> {
    let uri = match args.first() {
        Some(Value::String(path)) => file_uri(path),
        _ => None,
    };

    let mut host_args = args.into_host_args();
    if let Some(uri) = uri
        && let Some(first) = host_args.first_mut()
    {
        *first = CommandArg::Uri(uri);
    }
    host_args
}

// ============================================================================
// Tests
// ============================================================================
