//! Session state.

use std::fmt;

use serde::Serialize;

use crate::protocol::QueuingMode;

/// A session the server has issued
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveSession {
    /// Server-issued id
    pub id: String,
    /// Delivery strategy announced at start
    pub queuing: QueuingMode,
}

/// Session state machine
///
/// ```text
/// Uninitialized ──start──▶ Connecting ──SessionStarted──▶ Connected
///                               ▲                            │
///                               └──────────start─────────────┤
///                                                            ├──end / fatal──▶ Disconnected
///                                                            └──Inactive─────▶ Expired
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub enum SessionState {
    /// Nothing attempted yet
    #[default]
    Uninitialized,
    /// StartSession sent (or a retry is armed)
    Connecting,
    /// Session established
    Connected(ActiveSession),
    /// Session closed or lost. A session disconnected by a server error is
    /// remembered so a liveness check can revive it.
    Disconnected(Option<ActiveSession>),
    /// Liveness check found the session gone
    Expired,
}

impl SessionState {
    /// The connected session, if any
    pub fn active(&self) -> Option<&ActiveSession> {
        match self {
            Self::Connected(session) => Some(session),
            _ => None,
        }
    }

    /// Whether a session is connected
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected(_))
    }

    /// Session id known to this client, connected or remembered
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::Connected(session) | Self::Disconnected(Some(session)) => Some(&session.id),
            _ => None,
        }
    }

    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Connecting => "connecting",
            Self::Connected(_) => "connected",
            Self::Disconnected(_) => "disconnected",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> ActiveSession {
        ActiveSession {
            id: "S1".into(),
            queuing: QueuingMode::Inactive,
        }
    }

    #[test]
    fn test_session_id_visibility() {
        assert_eq!(SessionState::Connected(session()).session_id(), Some("S1"));
        assert_eq!(
            SessionState::Disconnected(Some(session())).session_id(),
            Some("S1")
        );
        assert_eq!(SessionState::Disconnected(None).session_id(), None);
        assert_eq!(SessionState::Expired.session_id(), None);
        assert!(SessionState::Disconnected(Some(session())).active().is_none());
    }
}
