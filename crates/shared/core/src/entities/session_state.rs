use serde::{Deserialize, Serialize};

/// Lifecycle state of one physical gateway connection
///
/// ```text
/// Disconnected ──► Connecting ──► Connected ──► Resuming ──► Connected
///                       │                           │
///                       └────────► Closed ◄─────────┘
/// ```
///
/// `Closed` is reachable from every state on a fatal close.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// Created, no connect requested yet
    #[default]
    Disconnected,
    /// Socket opening, waiting for READY or RESUMED
    Connecting,
    /// Session established, dispatching events
    Connected,
    /// Transient network loss, attempting an in-place resume
    Resuming,
    /// Fatal close; the shard has to be re-queued
    Closed,
}

impl SessionState {
    /// Check whether moving to `next` is a legal transition
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (_, Closed) => true,
            (Disconnected, Connecting) => true,
            (Connecting, Connected) => true,
            (Connected, Resuming) => true,
            (Resuming, Connected) => true,
            _ => false,
        }
    }

    /// Check whether the session is delivering events
    pub fn is_live(&self) -> bool {
        matches!(self, SessionState::Connected)
    }

    /// Check whether the session can no longer be used
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed)
    }
}
