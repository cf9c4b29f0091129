//! Session lifecycle state.

use serde::{Deserialize, Serialize};

/// Connection state of a client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No live broker connection.
    Disconnected,
    /// Connection requested, acknowledgment not yet observed.
    Connecting,
    /// Session acknowledged; calls may be issued.
    Connected,
    /// `end()` ran; the session will not be reused.
    Ended,
}

impl SessionState {
    /// Whether calls may be issued in this state.
    #[must_use]
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}
