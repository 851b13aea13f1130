//! Connection state for the realtime session

use serde::{Deserialize, Serialize};

/// Single authoritative connection state, mutated only by the session.
///
/// Transitions are monotonic within one attempt; the machine restarts at
/// `Connecting` on every reconnect. `AuthFailed` is terminal for the
/// current credentials, `Error` is terminal until a manual `connect()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No socket
    Disconnected,
    /// Socket opening / handshake in flight
    Connecting,
    /// Socket open, authenticate sent
    Connected,
    /// Server accepted authentication; channels usable
    Authenticated,
    /// Server rejected the configured credential
    AuthFailed,
    /// Attempts exhausted or network unavailable
    Error,
}

impl ConnectionState {
    /// True while a socket exists or is being established
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::Connected | Self::Authenticated
        )
    }

    /// True once channel traffic can flow
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated)
    }

    /// True for the states that end an attempt sequence
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::AuthFailed | Self::Error)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Authenticated => "authenticated",
            Self::AuthFailed => "auth_failed",
            Self::Error => "error",
        };
        write!(f, "{}", s)
    }
}
