//! Command dispatch.
//!
//! Turns decoded frames into host calls. Dispatch never fails outward:
//! decode, host and encode errors are written to the host output channel
//! and to `tracing`, and the frame is dropped.
//!
//! | Type | Role |
//! |------|------|
//! | [`ServerDispatcher`] | frames from a controller connected to the local server |
//! | [`ClientDispatcher`] | frames from the server the editor dialed |

// ============================================================================
// Submodules
// ============================================================================

/// Client-role dispatch.
pub mod client;

/// Server-role dispatch.
pub mod server;

// ============================================================================
// Re-exports
// ============================================================================

pub use client::{AGENT_CHAT_COMMAND, ClientDispatcher};
pub use server::ServerDispatcher;
