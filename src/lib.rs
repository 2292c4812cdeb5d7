//! Editor Remote Control - WebSocket command relay for editor extensions.
//!
//! This library lets an external program drive an editor over a WebSocket.
//! It runs inside the editor's extension host and plays up to two roles at
//! the same time:
//!
//! - **Client role**: dials a controller, receives `openFile` / `cursor`
//!   messages and turns them into editor actions
//! - **Server role**: listens on a local port, receives command invocations
//!   and sends truthy results back to the controller
//!
//! Key design principles:
//!
//! - The editor is reached only through the [`EditorHost`] trait
//! - At most one client connection and one active server peer at a time
//! - Every connection is tagged with a [`PeerId`]; events of superseded
//!   connections are ignored
//! - A bad frame is logged and dropped, the connection stays open
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use editor_remote_control::{RecordingHost, Result, Session};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let host = Arc::new(RecordingHost::new().with_settings(json!({
//!         "websocketUrl": "ws://127.0.0.1:9000",
//!         "enable": true,
//!         "port": 3710,
//!     })));
//!
//!     let session = Session::new(host);
//!     session.activate().await?;
//!     println!("server port: {:?}", session.server_port());
//!
//!     session.deactivate();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | Settings section and role configuration |
//! | [`dispatch`] | Frame handling for both roles |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`host`] | [`EditorHost`] abstraction and [`RecordingHost`] |
//! | [`identifiers`] | Connection generation ids |
//! | [`protocol`] | Wire message types and argument rewriting |
//! | [`session`] | Lifecycle: activate, commands, deactivate |
//! | [`status`] | Connection state machine and status bar |
//! | [`transport`] | WebSocket client, server and connection loop |

// ============================================================================
// Modules
// ============================================================================

/// Settings section and role configuration.
pub mod config;

/// Frame handling for the client and server roles.
pub mod dispatch;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Editor host abstraction.
///
/// Everything the relay does to the editor goes through [`EditorHost`].
pub mod host;

/// Connection generation ids.
pub mod identifiers;

/// WebSocket protocol message types.
///
/// Inbound message shapes for both roles and command argument rewriting.
pub mod protocol;

/// Session lifecycle.
pub mod session;

/// Connection state machine and status bar reporting.
pub mod status;

/// WebSocket transport layer.
///
/// Outbound client, local server with port fallback and the per-connection
/// event loop.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Configuration
pub use config::{ClientConfig, ServerConfig, Settings};

// Dispatch
pub use dispatch::{ClientDispatcher, ServerDispatcher};

// Error types
pub use error::{Error, Result};

// Host types
pub use host::{
    EditorHost, HostCall, NotificationLevel, RecordingHost, StatusItem, StatusSlot, Terminal,
};

// Identifier types
pub use identifiers::PeerId;

// Protocol types
pub use protocol::{ClientMessage, CommandArg, CommandArgs, ServerMessage};

// Session
pub use session::Session;

// Status
pub use status::{ConnectionState, StatusEvent, StatusReporter};

// Transport types
pub use transport::{PortKind, PortSelection, RemoteClient, RemoteServer};
