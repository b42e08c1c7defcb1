//! Observer-facing session state and notifications

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::Prediction;

/// Connectivity of the current session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No open connection and none in progress
    #[default]
    Disconnected,

    /// A connection attempt is in progress
    Connecting,

    /// The duplex connection is open
    Connected,

    /// The transport reported a fault; a close event follows
    Error,
}

impl ConnectionState {
    /// Lowercase wire-style name
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only view of the session handed to observers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    /// `start()` was issued and `stop()` has not been
    pub active: bool,

    /// Current connectivity
    pub state: ConnectionState,

    /// Identifier assigned by the service for the open connection
    pub session_id: Option<String>,

    /// Sequence number the next captured frame will carry
    pub frame_sequence: u64,

    /// Reconnection attempts since the last successful open
    pub reconnect_attempt: u32,

    /// Latest prediction, replaced on every new one
    pub prediction: Option<Arc<Prediction>>,

    /// Latest user-visible error
    pub error: Option<String>,

    /// A frame was sent and no prediction has arrived since
    pub processing: bool,

    /// Frames handed to the transport this session
    pub frames_sent: u64,

    /// Frames discarded because the connection was not open
    pub frames_dropped: u64,
}

impl SessionSnapshot {
    /// First eight characters of the session id, for compact display
    pub fn short_session_id(&self) -> Option<&str> {
        let id = self.session_id.as_deref()?;
        Some(match id.char_indices().nth(8) {
            Some((end, _)) => &id[..end],
            None => id,
        })
    }
}

/// Category of a user-visible error notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The frame source could not be acquired; the start was aborted
    DeviceUnavailable,

    /// Connection-level fault; reconnection follows if the session is active
    Transport,

    /// `error` message sent by the inference service
    RemoteRejection,
}

/// Discrete notification emitted by the session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Connectivity changed
    StatusChanged(ConnectionState),

    /// The service assigned a session id
    SessionAssigned(String),

    /// A new prediction replaced the previous one
    Prediction(Arc<Prediction>),

    /// A user-visible error occurred
    Error { kind: ErrorKind, message: String },

    /// A reconnection attempt was scheduled
    ReconnectScheduled { attempt: u32, delay: Duration },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_names_match_wire_style() {
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert_eq!(
            serde_json::to_string(&ConnectionState::Disconnected).unwrap(),
            "\"disconnected\""
        );
    }

    #[test]
    fn short_session_id_truncates_to_eight_chars() {
        let mut snapshot = SessionSnapshot::default();
        assert_eq!(snapshot.short_session_id(), None);

        snapshot.session_id = Some("3f2a9c1e-77b0-4c1d".to_string());
        assert_eq!(snapshot.short_session_id(), Some("3f2a9c1e"));

        snapshot.session_id = Some("abc123".to_string());
        assert_eq!(snapshot.short_session_id(), Some("abc123"));
    }
}
