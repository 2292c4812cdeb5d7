//! Type-safe identifiers for transport peers.
//!
//! Every WebSocket connection, accepted or dialed, gets a fresh [`PeerId`].
//! The session compares ids to drop events from superseded connections.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

// ============================================================================
// Counters
// ============================================================================

/// Global counter for peer ids. Starts at 1.
static NEXT_PEER_ID: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// PeerId
// ============================================================================

/// Identifier of one WebSocket connection.
///
/// Ids are unique within the process and strictly increasing, so a
/// higher id always belongs to a newer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerId(u64);

impl PeerId {
    /// Allocates the next peer id.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_PEER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
