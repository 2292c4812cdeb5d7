//! Client-role message types.
//!
//! When dialing out, the editor receives `{"type": "...", ...}` frames.
//! Only a small fixed set of types does anything; everything else decodes
//! to [`ClientMessage::Unknown`] and is ignored.

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;
use serde_json::{Value, from_value};

use crate::error::{Error, Result};

// ============================================================================
// ClientMessage
// ============================================================================

/// A decoded client-role frame.
///
/// # Format
///
/// ```json
/// { "type": "openFile", "path": "/tmp/a.txt" }
/// { "type": "cursor", "text": "move:10" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Open and show a document.
    #[serde(rename = "openFile")]
    OpenFile {
        /// Filesystem path of the document.
        #[serde(default)]
        path: Option<String>,
    },

    /// Hand text to the agent chat command.
    #[serde(rename = "cursor")]
    Cursor {
        /// Text passed as the command's only argument.
        #[serde(default)]
        text: Option<String>,
    },

    /// Generic command execution. Recognised but not acted upon.
    #[serde(rename = "executeCommand")]
    ExecuteCommand {
        /// Host command name.
        #[serde(default)]
        command: Option<String>,
    },

    /// Any other `type`.
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    /// Decodes an already parsed JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the document has no string `type` or a
    /// recognised type carries fields of the wrong JSON type.
    pub fn from_json(value: Value) -> Result<Self> {
        from_value(value).map_err(|e| Error::protocol(format!("invalid client message: {e}")))
    }

    /// Returns the non-empty path of an `openFile` message.
    #[must_use]
    pub fn open_path(&self) -> Option<&str> {
        match self {
            Self::OpenFile { path: Some(path) } if !path.is_empty() => Some(path),
            _ => None,
        }
    }

    /// Returns the non-empty text of a `cursor` message.
    #[must_use]
    pub fn cursor_text(&self) -> Option<&str> {
        match self {
            Self::Cursor { text: Some(text) } if !text.is_empty() => Some(text),
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
