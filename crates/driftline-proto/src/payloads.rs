//! Broadcast and command payloads.

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{ChatMessage, ProtocolError, RoomId};

/// Typing indicator broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingEvent {
    /// User whose typing state changed.
    pub username: String,
    /// Room the indicator applies to.
    pub room_id: RoomId,
    /// `true` for start typing, `false` for stop.
    pub typing: bool,
    /// Broadcast timestamp, epoch milliseconds.
    #[serde(default)]
    pub timestamp: i64,
}

/// Incremental presence change for a single user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUpdate {
    /// Affected user.
    pub username: String,
    /// New online state.
    pub online: bool,
    /// Last-seen timestamp, epoch milliseconds. Absent while online.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<i64>,
}

/// Kind of message acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReceiptKind {
    /// Message reached the recipient's client.
    Delivered,
    /// Message was read by the recipient.
    Read,
}

/// A read/delivery acknowledgment attributed to a message by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    /// Id of the acknowledged message.
    pub message_id: String,
    /// User acknowledging the message.
    pub username: String,
    /// Delivered or read.
    #[serde(default = "ReadReceipt::default_kind")]
    pub kind: ReceiptKind,
}

impl ReadReceipt {
    fn default_kind() -> ReceiptKind {
        ReceiptKind::Read
    }
}

/// Per-user notification queue entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Notification id, if persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Recipient username.
    pub username: String,
    /// Notification body.
    pub content: String,
    /// Creation timestamp, epoch milliseconds.
    #[serde(default)]
    pub timestamp: i64,
}

/// One page of message history from the request/response channel.
///
/// Items arrive newest-first; the consumer reverses them to ascending time
/// before merging into a timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    /// Page contents in descending-time order.
    #[serde(rename = "content")]
    pub items: Vec<ChatMessage>,
    /// `true` when no older pages remain.
    #[serde(rename = "last")]
    pub is_last: bool,
}

/// Join announcement published on connect (`/app/chat.addUser`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinAnnouncement {
    /// Entry kind, always `JOIN`.
    #[serde(rename = "type")]
    pub kind: crate::MessageKind,
    /// Joining user.
    pub sender: String,
    /// Display text for the announcement.
    pub content: String,
    /// Announcement timestamp, epoch milliseconds.
    pub timestamp: i64,
    /// Room being joined.
    pub room_id: RoomId,
}

/// Typing start/stop command body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingCommand {
    /// Room the command applies to.
    pub room_id: RoomId,
}

/// Per-message receipt command body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptCommand {
    /// Acknowledged message id.
    pub message_id: String,
    /// Room owning the message.
    pub room_id: RoomId,
}

/// Whole-room mark-read command body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkRoomRead {
    /// Room to mark read.
    pub room_id: RoomId,
}

/// Keep-alive body sent on the heartbeat destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatPing {
    /// Active room at the time of the heartbeat.
    pub room_id: RoomId,
}

/// Decode a payload received on `topic`.
///
/// # Errors
///
/// Returns [`ProtocolError::Decode`] when the body is not valid JSON for
/// the expected type.
pub fn decode<T: DeserializeOwned>(topic: &str, body: &str) -> Result<T, ProtocolError> {
    serde_json::from_str(body)
        .map_err(|source| ProtocolError::Decode { topic: topic.to_string(), source })
}

/// Encode an outgoing payload for `destination`.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] when serialization fails.
pub fn encode<T: Serialize>(destination: &str, payload: &T) -> Result<String, ProtocolError> {
    serde_json::to_string(payload)
        .map_err(|source| ProtocolError::Encode { destination: destination.to_string(), source })
}
