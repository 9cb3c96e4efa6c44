//! Subscription lifecycle and outbound send gating.
//!
//! The router owns the set of topics the client must be subscribed to
//! for a given active room, diffs that set on room switches so
//! room-independent subscriptions survive untouched, and gates outbound
//! publishes: sends attempted before the session's subscriptions are
//! established are queued and flushed once they are.

use std::collections::VecDeque;

use driftline_proto::{Destination, RoomId, Topic};

/// Maximum queued outbound frames while subscriptions are down.
pub const SEND_QUEUE_CAP: usize = 64;

/// An outbound frame: destination plus encoded body.
pub type OutboundFrame = (Destination, String);

/// Tracks active subscriptions and queues sends until they exist.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionRouter {
    /// Topics currently subscribed, in subscription order.
    active: Vec<Topic>,
    ready: bool,
    queued: VecDeque<OutboundFrame>,
}

impl SubscriptionRouter {
    /// Create a router with no subscriptions.
    pub fn new() -> Self {
        Self::default()
    }

    /// The full topic set required while `room_id` is active.
    ///
    /// Room-independent topics come first; the order is fixed so a
    /// reconnect reproduces the same subscription sequence.
    pub fn desired_topics(room_id: &RoomId) -> Vec<Topic> {
        vec![
            Topic::Public,
            Topic::GlobalTyping,
            Topic::OnlineUsers,
            Topic::Presence,
            Topic::Notifications,
            Topic::RoomFeed(room_id.clone()),
            Topic::RoomMessages(room_id.clone()),
            Topic::RoomTyping(room_id.clone()),
            Topic::RoomReceipts(room_id.clone()),
        ]
    }

    /// Establish the full subscription set for a freshly connected
    /// session.
    ///
    /// Returns the topics to subscribe plus any frames queued while the
    /// session was down, in original send order.
    pub fn establish(&mut self, room_id: &RoomId) -> (Vec<Topic>, Vec<OutboundFrame>) {
        self.active = Self::desired_topics(room_id);
        self.ready = true;
        let flushed = self.queued.drain(..).collect();
        (self.active.clone(), flushed)
    }

    /// Re-evaluate subscriptions for a new active room.
    ///
    /// Returns `(unsubscribe, subscribe)`: topics bound to the old room
    /// leave, topics for the new room join, and everything
    /// room-independent is left alone. Both lists are empty when the
    /// room did not change.
    pub fn switch_room(&mut self, room_id: &RoomId) -> (Vec<Topic>, Vec<Topic>) {
        if !self.ready {
            return (Vec::new(), Vec::new());
        }
        let desired = Self::desired_topics(room_id);
        let dropped: Vec<Topic> =
            self.active.iter().filter(|t| !desired.contains(t)).cloned().collect();
        let added: Vec<Topic> =
            desired.iter().filter(|t| !self.active.contains(t)).cloned().collect();
        self.active = desired;
        (dropped, added)
    }

    /// Route an outbound frame.
    ///
    /// Returns the frame when it can go out now; otherwise queues it for
    /// the next [`establish`](Self::establish). The queue is bounded with
    /// oldest-first eviction.
    pub fn publish(&mut self, destination: Destination, body: String) -> Option<OutboundFrame> {
        if self.ready {
            return Some((destination, body));
        }
        if self.queued.len() >= SEND_QUEUE_CAP {
            self.queued.pop_front();
        }
        self.queued.push_back((destination, body));
        None
    }

    /// Mark subscriptions dead after a transport loss.
    ///
    /// Queued frames are kept; they flush when the session comes back.
    pub fn teardown(&mut self) {
        self.active.clear();
        self.ready = false;
    }

    /// Drop subscriptions and any queued frames.
    pub fn reset(&mut self) {
        self.teardown();
        self.queued.clear();
    }

    /// Whether subscriptions are currently established.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Whether the given topic is currently subscribed.
    pub fn is_subscribed(&self, topic: &Topic) -> bool {
        self.active.contains(topic)
    }

    /// Topics currently subscribed, in subscription order.
    pub fn subscriptions(&self) -> &[Topic] {
        &self.active
    }

    /// Number of frames waiting for the session.
    pub fn queued_len(&self) -> usize {
        self.queued.len()
    }
}
