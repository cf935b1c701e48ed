//! Per-Session Stream Driving
//!
//! Every client connection gets one [`driver::StreamDriver`]: a periodic
//! push loop that emits a screen clear followed by the next frame of the
//! animation, freshly colorized, on a fixed cadence until the session is
//! cancelled.
//!
//! # Session Lifecycle
//!
//! ```text
//!   Idle ──start()──▶ Running ──stop() / sink closed / send error──▶ Stopped
//! ```
//!
//! `Stopped` is terminal. The tick emission and the stop transition are
//! serialized under one lock, so once a stop is observed no further chunk
//! can be emitted, even if a tick was already scheduled.

pub mod driver;

use std::fmt;

use uuid::Uuid;

/// ANSI control sequence that clears the screen and homes the cursor.
///
/// Prefixed to every emitted chunk so each frame fully replaces the last.
pub const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

/// Unique identifier for one streaming session.
///
/// Used purely for log correlation; sessions hold no other identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a fresh random session ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sess-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_unique_and_prefixed() {
        let a = SessionId::new();
        let b = SessionId::new();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("sess-"));
        // sess- (5 chars) + UUID (36 chars)
        assert_eq!(a.to_string().len(), 41);
    }
}
