//! Connection lifecycle core for the Driftline sync engine.
//!
//! Provides the [`ConnectionManager`] state machine (connect, heartbeat,
//! reconnect-with-backoff, teardown) and the [`env::Environment`]
//! abstraction that decouples protocol logic from time and randomness.
//!
//! All logic here is sans-IO: methods take the current time as input and
//! return [`ConnectionAction`]s for a driver to execute.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod connection;
pub mod env;
pub mod error;

pub use connection::{ConnectionAction, ConnectionConfig, ConnectionManager, ConnectionState};
pub use env::Environment;
pub use error::ConnectionError;
