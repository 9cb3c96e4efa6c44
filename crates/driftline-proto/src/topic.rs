//! Incoming topic and outgoing destination paths.

use std::fmt;

use crate::{ProtocolError, RoomId};

/// A named broadcast channel the client can subscribe to.
///
/// The backend addresses channels with slash-delimited paths. Room-scoped
/// topics embed the room id and are re-derived whenever the active room
/// changes; the rest are global.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Shared broadcast feed (`/topic/public`).
    Public,
    /// Per-room message feed (`/topic/room.{id}`).
    RoomFeed(RoomId),
    /// Legacy per-room message feed (`/topic/messages/{id}`).
    ///
    /// The backend may broadcast room messages on either path, so clients
    /// subscribe to both; timeline dedup absorbs the double delivery.
    RoomMessages(RoomId),
    /// Global typing indicator feed (`/topic/typing`).
    GlobalTyping,
    /// Per-room typing indicator feed (`/topic/typing.{id}`).
    RoomTyping(RoomId),
    /// Per-room read/delivery receipt feed (`/topic/read-receipt.{id}`).
    RoomReceipts(RoomId),
    /// Per-user presence deltas (`/topic/presence`).
    Presence,
    /// Online-user snapshot broadcasts (`/topic/online.users`).
    OnlineUsers,
    /// Per-user notification queue (`/user/queue/notifications`).
    Notifications,
}

impl Topic {
    /// Parse a wire path into a typed topic.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnknownTopic`] for paths outside the fixed
    /// topic set.
    pub fn parse(path: &str) -> Result<Self, ProtocolError> {
        match path {
            "/topic/public" => Ok(Self::Public),
            "/topic/typing" => Ok(Self::GlobalTyping),
            "/topic/presence" => Ok(Self::Presence),
            "/topic/online.users" => Ok(Self::OnlineUsers),
            "/user/queue/notifications" => Ok(Self::Notifications),
            _ => {
                if let Some(room) = path.strip_prefix("/topic/room.") {
                    Ok(Self::RoomFeed(RoomId::from(room)))
                } else if let Some(room) = path.strip_prefix("/topic/messages/") {
                    Ok(Self::RoomMessages(RoomId::from(room)))
                } else if let Some(room) = path.strip_prefix("/topic/typing.") {
                    Ok(Self::RoomTyping(RoomId::from(room)))
                } else if let Some(room) = path.strip_prefix("/topic/read-receipt.") {
                    Ok(Self::RoomReceipts(RoomId::from(room)))
                } else {
                    Err(ProtocolError::UnknownTopic(path.to_string()))
                }
            },
        }
    }

    /// Room id embedded in a room-scoped topic, if any.
    pub fn room(&self) -> Option<&RoomId> {
        match self {
            Self::RoomFeed(room)
            | Self::RoomMessages(room)
            | Self::RoomTyping(room)
            | Self::RoomReceipts(room) => Some(room),
            _ => None,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Public => f.write_str("/topic/public"),
            Self::RoomFeed(room) => write!(f, "/topic/room.{room}"),
            Self::RoomMessages(room) => write!(f, "/topic/messages/{room}"),
            Self::GlobalTyping => f.write_str("/topic/typing"),
            Self::RoomTyping(room) => write!(f, "/topic/typing.{room}"),
            Self::RoomReceipts(room) => write!(f, "/topic/read-receipt.{room}"),
            Self::Presence => f.write_str("/topic/presence"),
            Self::OnlineUsers => f.write_str("/topic/online.users"),
            Self::Notifications => f.write_str("/user/queue/notifications"),
        }
    }
}

/// An outgoing publish target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    /// Send a chat message (`/app/chat.send`).
    SendChat,
    /// Announce a user joining (`/app/chat.addUser`).
    AddUser,
    /// Start-typing signal (`/app/chat.typing.start`).
    TypingStart,
    /// Stop-typing signal (`/app/chat.typing.stop`).
    TypingStop,
    /// Mark a whole room read (`/app/chat.markRead`).
    MarkRead,
    /// Per-message read receipt (`/app/chat.message.read`).
    MessageRead,
    /// Per-message delivery receipt (`/app/chat.message.delivered`).
    MessageDelivered,
    /// Session keep-alive (`/app/heartbeat`).
    Heartbeat,
}

impl Destination {
    /// Wire path for this destination.
    pub fn as_path(self) -> &'static str {
        match self {
            Self::SendChat => "/app/chat.send",
            Self::AddUser => "/app/chat.addUser",
            Self::TypingStart => "/app/chat.typing.start",
            Self::TypingStop => "/app/chat.typing.stop",
            Self::MarkRead => "/app/chat.markRead",
            Self::MessageRead => "/app/chat.message.read",
            Self::MessageDelivered => "/app/chat.message.delivered",
            Self::Heartbeat => "/app/heartbeat",
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_path())
    }
}
