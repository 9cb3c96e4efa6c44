//! Connection lifecycle state machine.
//!
//! Manages connect, heartbeat, reconnect-with-backoff, and teardown for the
//! single transport session. Uses the action pattern: methods take time as
//! input and return actions for the driver to execute. This keeps the state
//! machine pure (no I/O) and makes testing straightforward.
//!
//! # State Machine
//!
//! ```text
//! ┌──────────────┐ connect  ┌────────────┐ handshake ok ┌───────────┐
//! │ Disconnected │─────────>│ Connecting │─────────────>│ Connected │
//! └──────────────┘          └────────────┘              └───────────┘
//!         ↑                   │        ↑                      │
//!         │ disconnect        │ error  │ backoff done         │ transport
//!         │ (any state)       ↓        │                      ↓ lost
//!         │               ┌────────┐ ┌──────────────┐
//!         │               │ Failed │ │ Reconnecting │<────────┘
//!         │               └────────┘ └──────────────┘
//!         │                (attempts exhausted)
//! ```
//!
//! A handshake failure retries with exponential backoff until the attempt
//! budget is spent, then the machine parks in `Failed` and reports the
//! terminal error exactly once.

use std::{ops::Sub, time::Duration};

use crate::error::ConnectionError;

/// Period between keep-alive publishes while connected.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Base delay before the first reconnect attempt.
pub const DEFAULT_RECONNECT_BASE: Duration = Duration::from_secs(3);

/// Upper bound on the exponential backoff delay.
pub const DEFAULT_RECONNECT_CAP: Duration = Duration::from_secs(30);

/// Handshake attempts before the machine parks in `Failed`.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Pause between tearing down a duplicate session and reopening.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Connection state.
///
/// Exactly one instance per client; the session handle is owned here and
/// never cached by other components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session, nothing scheduled.
    Disconnected,
    /// Transport open requested, handshake in flight.
    Connecting,
    /// Session live, heartbeat armed.
    Connected,
    /// Session lost or torn down, retry scheduled.
    Reconnecting,
    /// Attempt budget exhausted; terminal until the next explicit connect.
    Failed,
}

/// Actions returned by the connection state machine.
///
/// The driver executes these in order:
/// - `OpenTransport`: open the transport and run the handshake, then feed
///   back `handshake_succeeded` or `handshake_failed`
/// - `CloseTransport`: tear down the current transport session
/// - `Heartbeat`: publish one keep-alive
/// - `StateChanged`: surface the new state to the application layer
/// - `Fail`: surface the terminal error (emitted at most once per run)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Open the transport and start the handshake.
    OpenTransport,

    /// Tear down the live transport session.
    CloseTransport {
        /// Why the session is being closed.
        reason: String,
    },

    /// Publish one keep-alive message.
    Heartbeat,

    /// Connection state changed.
    StateChanged(ConnectionState),

    /// Terminal failure after exhausting reconnect attempts.
    Fail {
        /// Description of the last handshake error.
        reason: String,
    },
}

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Keep-alive period while connected.
    pub heartbeat_interval: Duration,
    /// Backoff delay for the first retry; doubles per failed attempt.
    pub reconnect_base: Duration,
    /// Ceiling for the backoff delay.
    pub reconnect_cap: Duration,
    /// Handshake attempts before giving up.
    pub max_reconnect_attempts: u32,
    /// Delay between duplicate-session teardown and the replacement open.
    pub settle_delay: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            reconnect_base: DEFAULT_RECONNECT_BASE,
            reconnect_cap: DEFAULT_RECONNECT_CAP,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }
}

/// Connection lifecycle state machine.
///
/// This is a pure state machine: no I/O, no environment storage. Time is
/// passed as parameters to the methods that need it.
///
/// Generic over `I` to support both real time and virtual time for
/// deterministic testing.
#[derive(Debug, Clone)]
pub struct ConnectionManager<I = std::time::Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Current state.
    state: ConnectionState,
    /// Configuration.
    config: ConnectionConfig,
    /// Session handle assigned by the driver after a successful handshake.
    ///
    /// Retained through `Reconnecting` (the handle names the torn-down
    /// session until replaced) but only answerable while `Connected`.
    session_id: Option<u64>,
    /// Failed handshake attempts since the last success.
    attempts: u32,
    /// When the current retry wait started, with its duration.
    retry: Option<(I, Duration)>,
    /// Last heartbeat send time.
    last_heartbeat: Option<I>,
    /// Terminal failure already surfaced.
    failure_reported: bool,
}

impl<I> ConnectionManager<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create a manager in [`ConnectionState::Disconnected`].
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            config,
            session_id: None,
            attempts: 0,
            retry: None,
            last_heartbeat: None,
            failure_reported: false,
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Live session handle. `None` unless `Connected`.
    ///
    /// Senders must fetch the handle through this accessor on every send;
    /// caching it would allow publishes against a torn-down session.
    #[must_use]
    pub fn session_id(&self) -> Option<u64> {
        match self.state {
            ConnectionState::Connected => self.session_id,
            _ => None,
        }
    }

    /// Failed handshake attempts since the last successful connect.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Begin connecting.
    ///
    /// From `Disconnected` or `Failed` this opens the transport directly.
    /// If a session is already live or being established, it is torn down
    /// first and the replacement open is scheduled after a short settle
    /// delay; two live sessions would double-deliver every event.
    pub fn connect(&mut self, now: I) -> Vec<ConnectionAction> {
        match self.state {
            ConnectionState::Disconnected | ConnectionState::Failed => {
                self.state = ConnectionState::Connecting;
                self.attempts = 0;
                self.retry = None;
                self.failure_reported = false;
                vec![
                    ConnectionAction::StateChanged(ConnectionState::Connecting),
                    ConnectionAction::OpenTransport,
                ]
            },
            ConnectionState::Connected
            | ConnectionState::Connecting
            | ConnectionState::Reconnecting => {
                let had_session = self.session_id.take().is_some() || self.is_opening();
                self.state = ConnectionState::Reconnecting;
                self.attempts = 0;
                self.failure_reported = false;
                self.retry = Some((now, self.config.settle_delay));
                self.last_heartbeat = None;

                let mut actions = Vec::new();
                if had_session {
                    actions.push(ConnectionAction::CloseTransport {
                        reason: "superseded by new connect".to_string(),
                    });
                }
                actions.push(ConnectionAction::StateChanged(ConnectionState::Reconnecting));
                actions
            },
        }
    }

    /// Transport handshake completed.
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::InvalidState`] if not in `Connecting`
    pub fn handshake_succeeded(
        &mut self,
        session_id: u64,
        now: I,
    ) -> Result<Vec<ConnectionAction>, ConnectionError> {
        if self.state != ConnectionState::Connecting {
            return Err(ConnectionError::InvalidState {
                state: self.state,
                operation: "handshake_succeeded".to_string(),
            });
        }

        self.state = ConnectionState::Connected;
        self.session_id = Some(session_id);
        self.attempts = 0;
        self.retry = None;
        self.last_heartbeat = Some(now);

        Ok(vec![ConnectionAction::StateChanged(ConnectionState::Connected)])
    }

    /// Transport handshake failed.
    ///
    /// Schedules a backoff retry while the attempt budget lasts, then parks
    /// in `Failed` and surfaces the error once.
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::InvalidState`] if not in `Connecting`
    pub fn handshake_failed(
        &mut self,
        reason: &str,
        now: I,
    ) -> Result<Vec<ConnectionAction>, ConnectionError> {
        if self.state != ConnectionState::Connecting {
            return Err(ConnectionError::InvalidState {
                state: self.state,
                operation: "handshake_failed".to_string(),
            });
        }

        self.attempts += 1;

        if self.attempts < self.config.max_reconnect_attempts {
            let delay = self.backoff_delay();
            self.state = ConnectionState::Reconnecting;
            self.retry = Some((now, delay));
            return Ok(vec![ConnectionAction::StateChanged(ConnectionState::Reconnecting)]);
        }

        self.state = ConnectionState::Failed;
        self.retry = None;
        let mut actions = vec![ConnectionAction::StateChanged(ConnectionState::Failed)];
        if !self.failure_reported {
            self.failure_reported = true;
            actions.push(ConnectionAction::Fail {
                reason: format!(
                    "handshake failed after {} attempts: {reason}",
                    self.attempts
                ),
            });
        }
        Ok(actions)
    }

    /// Transport dropped out from under an established session.
    ///
    /// Not caller-initiated: schedules a reconnect. A drop while the
    /// handshake is in flight counts against the attempt budget.
    pub fn transport_lost(&mut self, reason: &str, now: I) -> Vec<ConnectionAction> {
        match self.state {
            ConnectionState::Connected => {
                self.state = ConnectionState::Reconnecting;
                self.retry = Some((now, self.backoff_delay()));
                self.last_heartbeat = None;
                vec![ConnectionAction::StateChanged(ConnectionState::Reconnecting)]
            },
            ConnectionState::Connecting => {
                self.handshake_failed(reason, now).unwrap_or_default()
            },
            _ => vec![],
        }
    }

    /// Caller-initiated teardown. Idempotent.
    ///
    /// Stops the heartbeat, cancels any pending retry, and releases the
    /// session. Calling it on an already-disconnected manager is a no-op.
    pub fn disconnect(&mut self) -> Vec<ConnectionAction> {
        if self.state == ConnectionState::Disconnected {
            return vec![];
        }

        let had_session = self.session_id.take().is_some() || self.is_opening();
        self.state = ConnectionState::Disconnected;
        self.attempts = 0;
        self.retry = None;
        self.last_heartbeat = None;
        self.failure_reported = false;

        let mut actions = Vec::new();
        if had_session {
            actions.push(ConnectionAction::CloseTransport {
                reason: "caller disconnect".to_string(),
            });
        }
        actions.push(ConnectionAction::StateChanged(ConnectionState::Disconnected));
        actions
    }

    /// Process periodic maintenance: due retries and due heartbeats.
    pub fn tick(&mut self, now: I) -> Vec<ConnectionAction> {
        let mut actions = Vec::new();

        if self.state == ConnectionState::Reconnecting
            && let Some((started, delay)) = self.retry
            && now - started >= delay
        {
            self.state = ConnectionState::Connecting;
            self.retry = None;
            actions.push(ConnectionAction::StateChanged(ConnectionState::Connecting));
            actions.push(ConnectionAction::OpenTransport);
        }

        if self.state == ConnectionState::Connected {
            let due = match self.last_heartbeat {
                None => true,
                Some(last) => now - last >= self.config.heartbeat_interval,
            };
            if due {
                self.last_heartbeat = Some(now);
                actions.push(ConnectionAction::Heartbeat);
            }
        }

        actions
    }

    /// Backoff delay for the current attempt count, capped.
    fn backoff_delay(&self) -> Duration {
        let exponent = self.attempts.saturating_sub(1).min(16);
        let delay = self.config.reconnect_base.saturating_mul(1u32 << exponent);
        delay.min(self.config.reconnect_cap)
    }

    /// True while an open has been requested but no session exists yet.
    fn is_opening(&self) -> bool {
        self.state == ConnectionState::Connecting
    }
}
