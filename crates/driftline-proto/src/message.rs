//! Chat message wire type.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Logical room identifier.
///
/// Rooms are named by the backend with opaque string ids; `"global"` is the
/// shared default room every client can see.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// The shared default room.
    pub const GLOBAL: &'static str = "global";

    /// Create a room id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The default global room.
    pub fn global() -> Self {
        Self(Self::GLOBAL.to_string())
    }

    /// Room id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RoomId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Kind of a chat feed entry.
///
/// Join/leave announcements travel on the same feed as chat messages and
/// render inline in the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageKind {
    /// Ordinary chat message.
    Chat,
    /// User joined the room.
    Join,
    /// User left the room.
    Leave,
}

/// A message on a room feed.
///
/// `id` is absent on a not-yet-acknowledged local echo; the server assigns
/// it on persistence and the echoed copy carries it. `read_by` and
/// `delivered` only ever grow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Server-assigned message id. `None` for unacknowledged local echoes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Room this message belongs to.
    pub room_id: RoomId,

    /// Sender username.
    pub sender: String,

    /// Message body.
    pub content: String,

    /// Sender timestamp, epoch milliseconds.
    pub timestamp: i64,

    /// Entry kind.
    #[serde(rename = "type")]
    pub kind: MessageKind,

    /// Attachment URL, if the message carries a file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,

    /// Attachment display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,

    /// Usernames that have read this message. Grows monotonically.
    #[serde(default)]
    pub read_by: BTreeSet<String>,

    /// Whether the message has been delivered to at least one recipient.
    #[serde(default)]
    pub delivered: bool,
}

impl ChatMessage {
    /// Create a plain chat message without an id (local echo form).
    pub fn chat(
        room_id: RoomId,
        sender: impl Into<String>,
        content: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            id: None,
            room_id,
            sender: sender.into(),
            content: content.into(),
            timestamp,
            kind: MessageKind::Chat,
            file_url: None,
            file_name: None,
            read_by: BTreeSet::new(),
            delivered: false,
        }
    }

    /// True for join/leave announcements.
    pub fn is_system(&self) -> bool {
        matches!(self.kind, MessageKind::Join | MessageKind::Leave)
    }
}
