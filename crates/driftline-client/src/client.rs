//! The sync engine.
//!
//! [`SyncClient`] composes the connection state machine, subscription
//! router, message store, presence tracker, typing coordinator and
//! receipt tracker into a single event-in/actions-out core. It performs
//! no I/O: the driver executes the returned actions against a transport
//! and feeds completions back as events.

use std::collections::HashMap;

use driftline_core::{
    ConnectionAction, ConnectionConfig, ConnectionManager, ConnectionState, Environment,
};
use driftline_proto::{
    ChatMessage, Destination, HeartbeatPing, HistoryPage, JoinAnnouncement, MarkRoomRead,
    MessageKind, Notification, PresenceUpdate, ReadReceipt, ReceiptCommand, ReceiptKind, RoomId,
    Topic, TypingCommand, TypingEvent, decode, encode,
};

use crate::error::SyncError;
use crate::event::{SyncAction, SyncEvent};
use crate::presence::PresenceTracker;
use crate::receipts::ReadReceiptTracker;
use crate::router::SubscriptionRouter;
use crate::timeline::{AppendOutcome, DEFAULT_PAGE_SIZE, FetchRequest, MessageStore};
use crate::typing::{TypingCoordinator, TypingSignal};

/// Sync engine configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Local username; used for announcements, receipts and to filter
    /// the user's own typing broadcasts.
    pub username: String,
    /// Room activated on the first session.
    pub initial_room: RoomId,
    /// Connection policy.
    pub connection: ConnectionConfig,
    /// History page size.
    pub page_size: u32,
}

impl SyncConfig {
    /// Config for `username` with the global room active and default
    /// connection policy.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            initial_room: RoomId::global(),
            connection: ConnectionConfig::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Sans-IO chat synchronization engine.
///
/// Feed it [`SyncEvent`]s via [`handle`](Self::handle); execute the
/// returned [`SyncAction`]s in order.
pub struct SyncClient<E: Environment> {
    env: E,
    username: String,
    active_room: RoomId,
    connection: ConnectionManager<E::Instant>,
    router: SubscriptionRouter,
    store: MessageStore,
    presence: PresenceTracker,
    typing: TypingCoordinator<E::Instant>,
    receipts: ReadReceiptTracker<E::Instant>,
    /// Last typing set surfaced per room, for change detection.
    reported_typists: HashMap<RoomId, Vec<String>>,
}

impl<E: Environment> SyncClient<E> {
    /// Create an engine in the disconnected state.
    pub fn new(env: E, config: SyncConfig) -> Self {
        Self {
            env,
            username: config.username,
            active_room: config.initial_room,
            connection: ConnectionManager::new(config.connection),
            router: SubscriptionRouter::new(),
            store: MessageStore::new(config.page_size),
            presence: PresenceTracker::new(),
            typing: TypingCoordinator::new(),
            receipts: ReadReceiptTracker::new(),
            reported_typists: HashMap::new(),
        }
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Currently active room.
    pub fn active_room(&self) -> &RoomId {
        &self.active_room
    }

    /// Ordered timeline of the active room.
    pub fn timeline(&self) -> Vec<&ChatMessage> {
        self.store.timeline(&self.active_room)
    }

    /// Ordered timeline of `room_id`. Empty if the room is not tracked.
    pub fn timeline_in(&self, room_id: &RoomId) -> Vec<&ChatMessage> {
        self.store.timeline(room_id)
    }

    /// Sorted usernames currently online.
    pub fn online_users(&self) -> Vec<String> {
        self.presence.online_users()
    }

    /// True if the user is currently online. Unknown users are offline.
    pub fn is_online(&self, username: &str) -> bool {
        self.presence.is_online(username)
    }

    /// Last-seen timestamp (epoch milliseconds) for an offline user.
    pub fn last_seen(&self, username: &str) -> Option<i64> {
        self.presence.last_seen(username)
    }

    /// Sorted remote users typing in the active room right now.
    pub fn typists(&self) -> Vec<String> {
        self.typing.typists(&self.active_room, self.env.now())
    }

    /// Sorted remote users typing in `room_id` right now.
    pub fn typists_in(&self, room_id: &RoomId) -> Vec<String> {
        self.typing.typists(room_id, self.env.now())
    }

    /// Process one event.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Connection`] when the event is impossible in
    /// the current connection state, or [`SyncError::Protocol`] when an
    /// outgoing payload fails to encode. Malformed inbound payloads are
    /// not errors; they produce [`SyncAction::Log`] and are dropped.
    pub fn handle(
        &mut self,
        event: SyncEvent<E::Instant>,
    ) -> Result<Vec<SyncAction>, SyncError> {
        match event {
            SyncEvent::Connect => self.on_connect(),
            SyncEvent::Disconnect => self.on_disconnect(),
            SyncEvent::HandshakeSucceeded { session_id } => self.on_handshake_succeeded(session_id),
            SyncEvent::HandshakeFailed { reason } => {
                let now = self.env.now();
                self.router.teardown();
                let actions = self.connection.handshake_failed(&reason, now)?;
                Ok(map_connection_actions(actions))
            },
            SyncEvent::TransportLost { reason } => self.on_transport_lost(&reason),
            SyncEvent::PayloadReceived { topic, body } => Ok(self.on_payload(&topic, &body)),
            SyncEvent::HistoryPage { request_id, room_id, page } => {
                Ok(self.on_history_page(request_id, &room_id, page))
            },
            SyncEvent::HistoryFailed { request_id, room_id, reason } => {
                if self.store.page_failed(request_id, &room_id) {
                    Ok(vec![SyncAction::HistoryError { room_id, reason }])
                } else {
                    Ok(Vec::new())
                }
            },
            SyncEvent::OnlineUsersFetched { usernames } => {
                self.presence.apply_snapshot(usernames);
                Ok(vec![SyncAction::OnlineUsersChanged { online: self.presence.online_users() }])
            },
            SyncEvent::SwitchRoom { room_id } => self.on_switch_room(room_id),
            SyncEvent::LoadOlder => {
                let Some(request) = self.store.load_older(&self.active_room) else {
                    return Ok(Vec::new());
                };
                Ok(vec![fetch_action(request)])
            },
            SyncEvent::SendChat { content, attachment } => self.on_send_chat(content, attachment),
            SyncEvent::Announce => self.on_announce(),
            SyncEvent::LocalInput { has_text } => self.on_local_input(has_text),
            SyncEvent::MarkMessageRead { message_id } => {
                self.on_message_receipt(message_id, ReceiptKind::Read)
            },
            SyncEvent::MarkMessageDelivered { message_id } => {
                self.on_message_receipt(message_id, ReceiptKind::Delivered)
            },
            SyncEvent::MarkRoomRead => self.on_mark_room_read(),
            SyncEvent::Tick { now } => self.on_tick(now),
        }
    }

    fn on_connect(&mut self) -> Result<Vec<SyncAction>, SyncError> {
        let now = self.env.now();
        // A connect over a live or opening session supersedes it; the
        // subscriptions die with the old transport, so sends issued
        // during the settle gap must queue rather than hit the torn-down
        // session.
        if !matches!(
            self.connection.state(),
            ConnectionState::Disconnected | ConnectionState::Failed
        ) {
            self.router.teardown();
            self.typing.drain_local();
            self.typing.reset_remote();
        }
        let mut actions = Vec::new();
        self.report_typing_resets(&mut actions);
        actions.extend(map_connection_actions(self.connection.connect(now)));
        Ok(actions)
    }

    fn on_disconnect(&mut self) -> Result<Vec<SyncAction>, SyncError> {
        let mut actions = Vec::new();
        // Stop open typing bursts while the session can still carry them
        for room_id in self.typing.drain_local() {
            if self.router.is_ready() {
                let body = encode(Destination::TypingStop.as_path(), &TypingCommand { room_id })?;
                actions.push(SyncAction::Publish { destination: Destination::TypingStop, body });
            }
        }
        self.router.reset();
        self.typing.reset_remote();
        self.reported_typists.clear();
        self.receipts.clear();
        actions.extend(map_connection_actions(self.connection.disconnect()));
        Ok(actions)
    }

    fn on_handshake_succeeded(&mut self, session_id: u64) -> Result<Vec<SyncAction>, SyncError> {
        let now = self.env.now();
        let mut actions =
            map_connection_actions(self.connection.handshake_succeeded(session_id, now)?);

        // A fresh session starts from a clean slate: presence re-snapshots
        // and remote typing indicators cannot be trusted across the gap.
        self.presence.reset();
        self.typing.reset_remote();
        self.report_typing_resets(&mut actions);

        let (topics, flushed) = self.router.establish(&self.active_room);
        for topic in topics {
            actions.push(SyncAction::Subscribe { topic });
        }
        for (destination, body) in flushed {
            actions.push(SyncAction::Publish { destination, body });
        }

        actions.push(SyncAction::FetchOnlineUsers);

        // The timeline refetches from the newest page; anything missed
        // while disconnected comes back through history.
        let request = self.store.switch_room(self.active_room.clone());
        actions.push(SyncAction::TimelineReset { room_id: self.active_room.clone() });
        actions.push(fetch_action(request));

        Ok(actions)
    }

    fn on_transport_lost(&mut self, reason: &str) -> Result<Vec<SyncAction>, SyncError> {
        let now = self.env.now();
        self.router.teardown();
        self.typing.drain_local();
        self.typing.reset_remote();

        let mut actions = Vec::new();
        self.report_typing_resets(&mut actions);
        actions.extend(map_connection_actions(self.connection.transport_lost(reason, now)));
        Ok(actions)
    }

    fn on_payload(&mut self, topic: &str, body: &str) -> Vec<SyncAction> {
        let parsed = match Topic::parse(topic) {
            Ok(parsed) => parsed,
            Err(err) => return vec![SyncAction::Log { message: format!("dropped payload: {err}") }],
        };

        match parsed {
            Topic::Public | Topic::RoomFeed(_) | Topic::RoomMessages(_) => {
                match decode::<ChatMessage>(topic, body) {
                    Ok(message) => self.on_chat_message(message),
                    Err(err) => log_drop(err),
                }
            },
            Topic::GlobalTyping | Topic::RoomTyping(_) => {
                match decode::<TypingEvent>(topic, body) {
                    Ok(event) => self.on_typing_event(&event),
                    Err(err) => log_drop(err),
                }
            },
            Topic::RoomReceipts(room_id) => match decode::<ReadReceipt>(topic, body) {
                Ok(receipt) => self.on_receipt(room_id, receipt),
                Err(err) => log_drop(err),
            },
            Topic::Presence => match decode::<PresenceUpdate>(topic, body) {
                Ok(update) => {
                    if self.presence.apply_update(update.clone()) {
                        vec![SyncAction::PresenceChanged { update }]
                    } else {
                        Vec::new()
                    }
                },
                Err(err) => log_drop(err),
            },
            Topic::OnlineUsers => match decode::<Vec<String>>(topic, body) {
                Ok(usernames) => {
                    self.presence.apply_snapshot(usernames);
                    vec![SyncAction::OnlineUsersChanged { online: self.presence.online_users() }]
                },
                Err(err) => log_drop(err),
            },
            Topic::Notifications => match decode::<Notification>(topic, body) {
                Ok(notification) => vec![SyncAction::NotificationReceived { notification }],
                Err(err) => log_drop(err),
            },
        }
    }

    fn on_chat_message(&mut self, message: ChatMessage) -> Vec<SyncAction> {
        let room_id = message.room_id.clone();
        let message_id = message.id.clone();
        let outcome = self.store.append_live(message.clone());

        let mut actions = Vec::new();
        if outcome == AppendOutcome::Inserted {
            actions.push(SyncAction::MessageReceived { message });
        }
        if let Some(id) = message_id {
            self.claim_deferred_receipts(&room_id, &id, &mut actions);
        }
        actions
    }

    fn on_typing_event(&mut self, event: &TypingEvent) -> Vec<SyncAction> {
        // The user's own broadcasts echo back; they are not "someone else
        // is typing".
        if event.username == self.username {
            return Vec::new();
        }
        let now = self.env.now();
        self.typing.remote_event(event, now);
        self.typing_delta(event.room_id.clone(), now).into_iter().collect()
    }

    fn on_receipt(&mut self, room_id: RoomId, receipt: ReadReceipt) -> Vec<SyncAction> {
        let now = self.env.now();
        if self.store.mark_receipt(&room_id, &receipt.message_id, &receipt.username, receipt.kind) {
            vec![SyncAction::ReceiptApplied {
                room_id,
                message_id: receipt.message_id,
                username: receipt.username,
                kind: receipt.kind,
            }]
        } else {
            // The message has not arrived yet; hold the receipt for it
            self.receipts.defer(room_id, receipt, now);
            Vec::new()
        }
    }

    fn on_history_page(
        &mut self,
        request_id: u64,
        room_id: &RoomId,
        page: HistoryPage,
    ) -> Vec<SyncAction> {
        let Some(applied) = self.store.apply_page(request_id, room_id, page) else {
            return vec![SyncAction::Log {
                message: format!("discarded stale history response for {room_id}"),
            }];
        };

        let mut actions = vec![SyncAction::HistoryApplied {
            room_id: room_id.clone(),
            inserted: applied.inserted.len(),
            has_more: applied.has_more,
        }];
        for message in &applied.inserted {
            if let Some(id) = &message.id {
                self.claim_deferred_receipts(room_id, id, &mut actions);
            }
        }
        actions
    }

    fn on_switch_room(&mut self, room_id: RoomId) -> Result<Vec<SyncAction>, SyncError> {
        if room_id == self.active_room {
            return Ok(Vec::new());
        }

        let mut actions = Vec::new();

        // Leave the old room's typing burst cleanly
        if self.typing.input(&self.active_room, false, self.env.now()).is_some()
            && self.router.is_ready()
        {
            let body = encode(
                Destination::TypingStop.as_path(),
                &TypingCommand { room_id: self.active_room.clone() },
            )?;
            actions.push(SyncAction::Publish { destination: Destination::TypingStop, body });
        }
        self.reported_typists.remove(&self.active_room);

        self.active_room = room_id.clone();

        // Room-bound subscriptions move in place; the session stays up
        let (dropped, added) = self.router.switch_room(&room_id);
        for topic in dropped {
            actions.push(SyncAction::Unsubscribe { topic });
        }
        for topic in added {
            actions.push(SyncAction::Subscribe { topic });
        }

        let request = self.store.switch_room(room_id.clone());
        actions.push(SyncAction::TimelineReset { room_id });
        actions.push(fetch_action(request));
        Ok(actions)
    }

    fn on_send_chat(
        &mut self,
        content: String,
        attachment: Option<(String, String)>,
    ) -> Result<Vec<SyncAction>, SyncError> {
        if matches!(
            self.connection.state(),
            ConnectionState::Disconnected | ConnectionState::Failed
        ) {
            return Ok(vec![SyncAction::Log {
                message: "dropped outgoing message: not connected".to_string(),
            }]);
        }

        let mut message = ChatMessage::chat(
            self.active_room.clone(),
            self.username.clone(),
            content,
            self.env.unix_millis(),
        );
        if let Some((url, name)) = attachment {
            message.file_url = Some(url);
            message.file_name = Some(name);
        }

        let body = encode(Destination::SendChat.as_path(), &message)?;
        let mut actions = Vec::new();
        if let Some((destination, body)) = self.router.publish(Destination::SendChat, body) {
            actions.push(SyncAction::Publish { destination, body });
        }

        // Sending ends the typing burst
        if self.typing.input(&self.active_room, false, self.env.now()).is_some()
            && self.router.is_ready()
        {
            let stop = encode(
                Destination::TypingStop.as_path(),
                &TypingCommand { room_id: self.active_room.clone() },
            )?;
            actions.push(SyncAction::Publish { destination: Destination::TypingStop, body: stop });
        }
        Ok(actions)
    }

    fn on_announce(&mut self) -> Result<Vec<SyncAction>, SyncError> {
        let announcement = JoinAnnouncement {
            kind: MessageKind::Join,
            sender: self.username.clone(),
            content: format!("{} joined the chat", self.username),
            timestamp: self.env.unix_millis(),
            room_id: self.active_room.clone(),
        };
        let body = encode(Destination::AddUser.as_path(), &announcement)?;
        Ok(self
            .router
            .publish(Destination::AddUser, body)
            .map(|(destination, body)| SyncAction::Publish { destination, body })
            .into_iter()
            .collect())
    }

    fn on_local_input(&mut self, has_text: bool) -> Result<Vec<SyncAction>, SyncError> {
        let now = self.env.now();
        let Some(signal) = self.typing.input(&self.active_room, has_text, now) else {
            return Ok(Vec::new());
        };
        // Typing signals are ephemeral: a queued start would arrive stale,
        // so they only go out on a live session.
        if !self.router.is_ready() {
            return Ok(Vec::new());
        }
        let destination = match signal {
            TypingSignal::Start => Destination::TypingStart,
            TypingSignal::Stop => Destination::TypingStop,
        };
        let body =
            encode(destination.as_path(), &TypingCommand { room_id: self.active_room.clone() })?;
        Ok(vec![SyncAction::Publish { destination, body }])
    }

    fn on_message_receipt(
        &mut self,
        message_id: String,
        kind: ReceiptKind,
    ) -> Result<Vec<SyncAction>, SyncError> {
        let destination = match kind {
            ReceiptKind::Read => Destination::MessageRead,
            ReceiptKind::Delivered => Destination::MessageDelivered,
        };
        let command = ReceiptCommand {
            message_id: message_id.clone(),
            room_id: self.active_room.clone(),
        };
        let body = encode(destination.as_path(), &command)?;

        let mut actions = Vec::new();
        if let Some((destination, body)) = self.router.publish(destination, body) {
            actions.push(SyncAction::Publish { destination, body });
        }
        // Apply locally too; the broadcast echo will dedup into a no-op
        if self.store.mark_receipt(&self.active_room, &message_id, &self.username, kind) {
            actions.push(SyncAction::ReceiptApplied {
                room_id: self.active_room.clone(),
                message_id,
                username: self.username.clone(),
                kind,
            });
        }
        Ok(actions)
    }

    fn on_mark_room_read(&mut self) -> Result<Vec<SyncAction>, SyncError> {
        let command = MarkRoomRead { room_id: self.active_room.clone() };
        let body = encode(Destination::MarkRead.as_path(), &command)?;

        let mut actions = Vec::new();
        if let Some((destination, body)) = self.router.publish(Destination::MarkRead, body) {
            actions.push(SyncAction::Publish { destination, body });
        }
        // The transport publish is authoritative; the mirror covers the
        // window where the socket drops before the frame lands.
        actions.push(SyncAction::MirrorMarkRead {
            room_id: self.active_room.clone(),
            username: self.username.clone(),
        });
        Ok(actions)
    }

    fn on_tick(&mut self, now: E::Instant) -> Result<Vec<SyncAction>, SyncError> {
        let mut actions = Vec::new();

        for action in self.connection.tick(now) {
            match action {
                ConnectionAction::Heartbeat => {
                    let body = encode(
                        Destination::Heartbeat.as_path(),
                        &HeartbeatPing { room_id: self.active_room.clone() },
                    )?;
                    actions.push(SyncAction::Publish { destination: Destination::Heartbeat, body });
                },
                other => actions.extend(map_connection_action(other)),
            }
        }

        // Quiet local bursts auto-stop
        for room_id in self.typing.tick_local(now) {
            if self.router.is_ready() {
                let body = encode(Destination::TypingStop.as_path(), &TypingCommand {
                    room_id: room_id.clone(),
                })?;
                actions.push(SyncAction::Publish { destination: Destination::TypingStop, body });
            }
        }

        // Remote indicators past their lifetime clear without a stop event
        self.typing.expire_remote(now);
        let mut rooms: Vec<RoomId> = self.reported_typists.keys().cloned().collect();
        for room_id in self.typing.rooms_with_typists() {
            if !rooms.contains(&room_id) {
                rooms.push(room_id);
            }
        }
        for room_id in rooms {
            if let Some(action) = self.typing_delta(room_id, now) {
                actions.push(action);
            }
        }

        self.receipts.expire(now);
        Ok(actions)
    }

    /// Emit a `TypingChanged` if the visible set for `room_id` moved
    /// since the last report.
    fn typing_delta(&mut self, room_id: RoomId, now: E::Instant) -> Option<SyncAction> {
        let current = self.typing.typists(&room_id, now);
        let previous = self.reported_typists.get(&room_id);
        if previous.is_some_and(|p| *p == current) || (previous.is_none() && current.is_empty()) {
            return None;
        }
        if current.is_empty() {
            self.reported_typists.remove(&room_id);
        } else {
            self.reported_typists.insert(room_id.clone(), current.clone());
        }
        Some(SyncAction::TypingChanged { room_id, users: current })
    }

    /// Clear every previously reported typing set.
    fn report_typing_resets(&mut self, actions: &mut Vec<SyncAction>) {
        for (room_id, _) in std::mem::take(&mut self.reported_typists) {
            actions.push(SyncAction::TypingChanged { room_id, users: Vec::new() });
        }
    }

    fn claim_deferred_receipts(
        &mut self,
        room_id: &RoomId,
        message_id: &str,
        actions: &mut Vec<SyncAction>,
    ) {
        let now = self.env.now();
        for receipt in self.receipts.claim(room_id, message_id, now) {
            if self.store.mark_receipt(room_id, &receipt.message_id, &receipt.username, receipt.kind)
            {
                actions.push(SyncAction::ReceiptApplied {
                    room_id: room_id.clone(),
                    message_id: receipt.message_id,
                    username: receipt.username,
                    kind: receipt.kind,
                });
            }
        }
    }
}

fn map_connection_actions(actions: Vec<ConnectionAction>) -> Vec<SyncAction> {
    actions.into_iter().filter_map(map_connection_action).collect()
}

/// Heartbeats need the active room encoded into the body, so the tick
/// path handles them before mapping; everywhere else they cannot occur.
fn map_connection_action(action: ConnectionAction) -> Option<SyncAction> {
    match action {
        ConnectionAction::OpenTransport => Some(SyncAction::OpenTransport),
        ConnectionAction::CloseTransport { reason } => Some(SyncAction::CloseTransport { reason }),
        ConnectionAction::StateChanged(state) => Some(SyncAction::StateChanged(state)),
        ConnectionAction::Fail { reason } => Some(SyncAction::Failed { reason }),
        ConnectionAction::Heartbeat => None,
    }
}

fn fetch_action(request: FetchRequest) -> SyncAction {
    SyncAction::FetchHistory {
        request_id: request.request_id,
        room_id: request.room_id,
        page: request.page,
        size: request.size,
    }
}

fn log_drop(err: driftline_proto::ProtocolError) -> Vec<SyncAction> {
    vec![SyncAction::Log { message: format!("dropped payload: {err}") }]
}
