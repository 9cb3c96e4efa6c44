//! Sync engine error types.

use driftline_core::ConnectionError;
use driftline_proto::ProtocolError;
use thiserror::Error;

/// Errors returned by the sync engine.
///
/// Malformed inbound payloads never surface here; they are dropped with a
/// log action so one bad frame cannot wedge the session. Errors are
/// reserved for driver misuse (events fed in an impossible order) and for
/// outbound encoding failures.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Connection state machine rejected the event.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// An outgoing payload could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl SyncError {
    /// Returns true if this error is transient and may succeed on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connection(err) => err.is_transient(),
            Self::Protocol(_) => false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use driftline_core::ConnectionState;

    use super::*;

    #[test]
    fn connection_errors_pass_through() {
        let err = SyncError::from(ConnectionError::InvalidState {
            state: ConnectionState::Disconnected,
            operation: "handshake_succeeded".to_string(),
        });
        assert!(!err.is_transient());
        assert!(err.to_string().contains("handshake_succeeded"));
    }

    #[test]
    fn transport_errors_are_transient() {
        let err = SyncError::from(ConnectionError::Transport("reset by peer".to_string()));
        assert!(err.is_transient());
    }
}
