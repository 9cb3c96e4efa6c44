//! Wire model for the Driftline chat protocol.
//!
//! Defines the typed topic set, the outgoing publish destinations, and the
//! JSON payloads exchanged with the messaging backend. This crate has no
//! protocol logic: it only names things on the wire and converts between
//! their string form and their typed form.
//!
//! # Layout
//!
//! - [`Topic`] / [`Destination`]: named channels, incoming and outgoing
//! - [`ChatMessage`], [`TypingEvent`], [`PresenceUpdate`], [`ReadReceipt`],
//!   [`Notification`]: broadcast payloads
//! - [`HistoryPage`]: page shape returned by the history provider

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
mod message;
mod payloads;
mod topic;

pub use error::ProtocolError;
pub use message::{ChatMessage, MessageKind, RoomId};
pub use payloads::{
    HeartbeatPing, HistoryPage, JoinAnnouncement, MarkRoomRead, Notification, PresenceUpdate,
    ReadReceipt, ReceiptCommand, ReceiptKind, TypingCommand, TypingEvent, decode, encode,
};
pub use topic::{Destination, Topic};
