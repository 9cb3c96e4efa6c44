//! Sync engine events and actions.

use driftline_core::ConnectionState;
use driftline_proto::{
    ChatMessage, Destination, HistoryPage, Notification, PresenceUpdate, ReceiptKind, RoomId,
    Topic,
};

/// Events the caller feeds into the engine.
///
/// The caller is responsible for:
/// - Receiving topic payloads from the transport and forwarding them
/// - Completing history/presence fetches and feeding the results back
/// - Driving time forward via ticks
/// - Forwarding application intents (send, switch room, typing input)
///
/// Generic over `I` (instant type) to support both production
/// (`std::time::Instant`) and simulation environments.
#[derive(Debug, Clone)]
pub enum SyncEvent<I = std::time::Instant> {
    /// Application wants to establish the session.
    Connect,

    /// Application wants to tear the session down.
    Disconnect,

    /// The transport handshake completed.
    HandshakeSucceeded {
        /// Driver-assigned handle for the new session.
        session_id: u64,
    },

    /// The transport handshake failed.
    HandshakeFailed {
        /// Failure description.
        reason: String,
    },

    /// The transport dropped an established session.
    TransportLost {
        /// Failure description.
        reason: String,
    },

    /// A payload arrived on a subscribed topic.
    PayloadReceived {
        /// Topic path the payload arrived on.
        topic: String,
        /// Raw JSON body.
        body: String,
    },

    /// A history fetch completed.
    HistoryPage {
        /// Id of the [`crate::SyncAction::FetchHistory`] this answers.
        request_id: u64,
        /// Room the page belongs to.
        room_id: RoomId,
        /// Page contents, newest-first.
        page: HistoryPage,
    },

    /// A history fetch failed.
    HistoryFailed {
        /// Id of the failed fetch.
        request_id: u64,
        /// Room the fetch was for.
        room_id: RoomId,
        /// Failure description.
        reason: String,
    },

    /// The online-user snapshot fetch completed.
    OnlineUsersFetched {
        /// Currently online usernames.
        usernames: Vec<String>,
    },

    /// Application switched the active room.
    SwitchRoom {
        /// Room to activate.
        room_id: RoomId,
    },

    /// Application wants the next older history page for the active room.
    LoadOlder,

    /// Application wants to send a chat message to the active room.
    SendChat {
        /// Message body.
        content: String,
        /// Attachment (URL, display name), if any.
        attachment: Option<(String, String)>,
    },

    /// Application wants to announce itself in the active room.
    Announce,

    /// The local composer changed.
    LocalInput {
        /// Whether the composer currently holds text.
        has_text: bool,
    },

    /// Application marked one message as read.
    MarkMessageRead {
        /// Message id.
        message_id: String,
    },

    /// Application marked one message as delivered.
    MarkMessageDelivered {
        /// Message id.
        message_id: String,
    },

    /// Application marked the whole active room as read.
    MarkRoomRead,

    /// Time tick for timeout processing.
    ///
    /// The caller should send ticks periodically so the engine can fire
    /// reconnect backoff, heartbeats, typing auto-stop and expiry, and
    /// orphan receipt cleanup.
    Tick {
        /// Current time from the environment.
        now: I,
    },
}

/// Actions the engine produces for the caller to execute.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncAction {
    /// Open the transport and run the handshake, then feed back
    /// [`SyncEvent::HandshakeSucceeded`] or [`SyncEvent::HandshakeFailed`].
    OpenTransport,

    /// Tear down the live transport session.
    CloseTransport {
        /// Why the session is being closed.
        reason: String,
    },

    /// Subscribe to a topic on the current session.
    Subscribe {
        /// Topic to subscribe.
        topic: Topic,
    },

    /// Unsubscribe from a topic on the current session.
    Unsubscribe {
        /// Topic to drop.
        topic: Topic,
    },

    /// Publish a payload on the current session.
    Publish {
        /// Destination path.
        destination: Destination,
        /// JSON body.
        body: String,
    },

    /// Fetch one history page from the request/response channel.
    ///
    /// The caller feeds the result back as [`SyncEvent::HistoryPage`] or
    /// [`SyncEvent::HistoryFailed`], echoing `request_id`.
    FetchHistory {
        /// Correlates the eventual response; stale ids are discarded.
        request_id: u64,
        /// Room to fetch for.
        room_id: RoomId,
        /// Zero-based page index, newest page first.
        page: u32,
        /// Fixed page size.
        size: u32,
    },

    /// Fetch the online-user snapshot from the request/response channel.
    FetchOnlineUsers,

    /// Best-effort REST mirror of a whole-room mark-read.
    ///
    /// The transport publish is authoritative; failures here are ignored.
    MirrorMarkRead {
        /// Room being marked.
        room_id: RoomId,
        /// Reading user.
        username: String,
    },

    /// Connection state changed.
    StateChanged(ConnectionState),

    /// A new message entered a room timeline.
    MessageReceived {
        /// The inserted message.
        message: ChatMessage,
    },

    /// A history page was merged into a room timeline.
    HistoryApplied {
        /// Room the page merged into.
        room_id: RoomId,
        /// Messages actually inserted (duplicates excluded).
        inserted: usize,
        /// Whether older pages remain.
        has_more: bool,
    },

    /// A history fetch failed; the cursor was reset to allow retry.
    HistoryError {
        /// Room the fetch was for.
        room_id: RoomId,
        /// Failure description.
        reason: String,
    },

    /// The active room changed and its timeline restarted.
    TimelineReset {
        /// Newly active room.
        room_id: RoomId,
    },

    /// One user's presence changed.
    PresenceChanged {
        /// The applied delta.
        update: PresenceUpdate,
    },

    /// The online-user set was replaced by a snapshot.
    OnlineUsersChanged {
        /// Sorted online usernames.
        online: Vec<String>,
    },

    /// The set of users typing in a room changed.
    TypingChanged {
        /// Affected room.
        room_id: RoomId,
        /// Sorted usernames currently typing.
        users: Vec<String>,
    },

    /// A receipt was attributed to a message.
    ReceiptApplied {
        /// Room owning the message.
        room_id: RoomId,
        /// Acknowledged message id.
        message_id: String,
        /// Acknowledging user.
        username: String,
        /// Delivered or read.
        kind: ReceiptKind,
    },

    /// A notification arrived on the per-user queue.
    NotificationReceived {
        /// The notification.
        notification: Notification,
    },

    /// Terminal connection failure after exhausting reconnect attempts.
    Failed {
        /// Description of the last error.
        reason: String,
    },

    /// Log message for debugging.
    Log {
        /// Log message.
        message: String,
    },
}
