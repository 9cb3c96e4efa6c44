//! Error types for the connection layer.
//!
//! Strongly-typed errors for the lifecycle state machine. Transport-level
//! failures recover locally through the reconnect policy; state-transition
//! misuse indicates a driver bug and is never retried.

use std::time::Duration;

use thiserror::Error;

use crate::connection::ConnectionState;

/// Errors that can occur during connection state machine operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Invalid state transition attempted.
    #[error("invalid state transition: cannot {operation} from {state:?}")]
    InvalidState {
        /// Current state when the error occurred.
        state: ConnectionState,
        /// Operation that was attempted.
        operation: String,
    },

    /// Transport handshake failed.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// Underlying transport error.
    #[error("transport error: {0}")]
    Transport(String),

    /// Reconnect attempt budget exhausted.
    #[error("gave up after {attempts} reconnect attempts over {elapsed:?}")]
    RetriesExhausted {
        /// Attempts made before giving up.
        attempts: u32,
        /// Total time spent retrying.
        elapsed: Duration,
    },
}

impl ConnectionError {
    /// Returns true if this error is transient and may succeed on retry.
    ///
    /// Handshake and transport failures are retried by the reconnect
    /// policy; invalid transitions indicate a driver bug and exhausted
    /// budgets are terminal.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Handshake(_) | Self::Transport(_))
    }
}
