//! Client
//!
//! Action-based synchronization engine for the Driftline chat protocol.
//! Manages the connection lifecycle, topic subscriptions, room
//! timelines, presence, typing indicators and read receipts.
//!
//! # Architecture
//!
//! The engine follows the same sans-IO and action-based patterns as
//! [`driftline_core`]. It receives events ([`SyncEvent`]), processes
//! them through pure state machine logic, and returns actions
//! ([`SyncAction`]) for the caller to execute.
//!
//! # Components
//!
//! - [`SyncClient`]: Top-level state machine composing the parts below
//! - [`MessageStore`]: Per-room ordered, deduplicated timelines
//! - [`SubscriptionRouter`]: Topic set lifecycle and send queueing
//! - [`PresenceTracker`]: Online set with snapshot/delta merge
//! - [`TypingCoordinator`]: Local debounce and remote indicator expiry
//! - [`ReadReceiptTracker`]: Orphaned receipt buffering
//!
//! # Transport (optional)
//!
//! With the `transport` feature enabled, this crate also provides:
//! - [`transport::ConnectedSession`]: WebSocket session handle
//! - [`transport::connect`]: Connect to a server

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod client;
mod error;
mod event;
mod presence;
mod receipts;
mod router;
mod timeline;
mod typing;

#[cfg(feature = "transport")]
pub mod transport;

pub use client::{SyncClient, SyncConfig};
pub use driftline_core::{ConnectionConfig, ConnectionState, Environment};
pub use driftline_proto::RoomId;
pub use error::SyncError;
pub use event::{SyncAction, SyncEvent};
pub use presence::PresenceTracker;
pub use receipts::{ORPHAN_CAP, ORPHAN_GRACE, ReadReceiptTracker};
pub use router::{OutboundFrame, SEND_QUEUE_CAP, SubscriptionRouter};
pub use timeline::{
    AppendOutcome, AppliedPage, CursorView, DEFAULT_PAGE_SIZE, FetchRequest, MessageStore,
};
pub use typing::{TYPING_DEBOUNCE, TYPING_TTL, TypingCoordinator, TypingSignal};
