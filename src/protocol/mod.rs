//! WebSocket protocol message types.
//!
//! Each WebSocket text frame carries exactly one JSON document. Frames are
//! decoded into a closed set of variants per role; anything that does not
//! fit is dropped.
//!
//! # Protocol Overview
//!
//! | Message | Role | Direction | Shape |
//! |---------|------|-----------|-------|
//! | [`ServerMessage`] | server | controller → editor | `{"command": "...", "args": any \| any[]}` |
//! | response | server | editor → controller | JSON of the command result |
//! | [`ClientMessage`] | client | controller → editor | `{"type": "...", "path"?: "...", "text"?: "..."}` |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `args` | Host command arguments and JSON truthiness |
//! | `client` | Client-role messages |
//! | `server` | Server-role messages |

// ============================================================================
// Submodules
// ============================================================================

/// Host command arguments.
pub mod args;

/// Client-role message types.
pub mod client;

/// Server-role message types.
pub mod server;

// ============================================================================
// Re-exports
// ============================================================================

pub use args::{CommandArg, CommandArgs, file_uri, is_truthy};
pub use client::ClientMessage;
pub use server::ServerMessage;
