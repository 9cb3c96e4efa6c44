//! Per-room message timelines with pagination and live merge.
//!
//! The store keeps one ordered, deduplicated timeline per room and merges
//! two sources into it: paginated history (fetched newest-page-first over
//! the request/response channel) and live messages from the subscription
//! feed. Ordering is ascending by timestamp with a stable arrival-order
//! tie-break; no two entries ever share a message id.

use std::collections::HashMap;

use driftline_proto::{ChatMessage, HistoryPage, ReceiptKind, RoomId};

/// Default history page size.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// One history fetch the caller must perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Correlates the eventual response.
    pub request_id: u64,
    /// Room to fetch for.
    pub room_id: RoomId,
    /// Zero-based page index.
    pub page: u32,
    /// Page size.
    pub size: u32,
}

/// Outcome of a live append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The message was new and inserted in order.
    Inserted,
    /// An entry with the same id existed and was replaced in place.
    Replaced,
}

/// Result of merging a history page.
#[derive(Debug, Clone)]
pub struct AppliedPage {
    /// Messages actually inserted, in ascending order.
    pub inserted: Vec<ChatMessage>,
    /// Whether older pages remain.
    pub has_more: bool,
}

/// Pagination cursor view for one room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorView {
    /// Highest page index fetched so far. `None` before the first page.
    pub page: Option<u32>,
    /// Whether older pages remain.
    pub has_more: bool,
    /// Whether a fetch is currently in flight.
    pub loading: bool,
}

#[derive(Debug, Clone)]
struct Entry {
    /// Arrival sequence, strictly increasing per store.
    seq: u64,
    message: ChatMessage,
}

#[derive(Debug, Clone)]
struct InFlight {
    request_id: u64,
    page: u32,
}

#[derive(Debug, Clone)]
struct RoomTimeline {
    /// Sorted ascending by `(timestamp, seq)`.
    entries: Vec<Entry>,
    /// Highest fetched page index.
    last_page: Option<u32>,
    has_more: bool,
    in_flight: Option<InFlight>,
}

impl RoomTimeline {
    fn new() -> Self {
        Self { entries: Vec::new(), last_page: None, has_more: true, in_flight: None }
    }

    fn insert(&mut self, seq: u64, message: ChatMessage) {
        let key = (message.timestamp, seq);
        let idx = self.entries.partition_point(|e| (e.message.timestamp, e.seq) <= key);
        self.entries.insert(idx, Entry { seq, message });
    }

    fn position_of(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.message.id.as_deref() == Some(id))
    }
}

/// Authoritative per-room timeline store.
///
/// Exactly one history fetch may be outstanding per room; responses are
/// correlated by request id so a fetch cancelled by a room switch can
/// never apply late.
#[derive(Debug, Clone)]
pub struct MessageStore {
    rooms: HashMap<RoomId, RoomTimeline>,
    active: Option<RoomId>,
    page_size: u32,
    next_seq: u64,
    next_request_id: u64,
}

impl MessageStore {
    /// Create an empty store with the given history page size.
    pub fn new(page_size: u32) -> Self {
        Self {
            rooms: HashMap::new(),
            active: None,
            page_size,
            next_seq: 0,
            next_request_id: 1,
        }
    }

    /// Currently active room.
    pub fn active_room(&self) -> Option<&RoomId> {
        self.active.as_ref()
    }

    /// Ordered timeline for a room. Empty if the room is not tracked.
    pub fn timeline(&self, room_id: &RoomId) -> Vec<&ChatMessage> {
        self.rooms
            .get(room_id)
            .map(|t| t.entries.iter().map(|e| &e.message).collect())
            .unwrap_or_default()
    }

    /// Pagination cursor for a room, if tracked.
    pub fn cursor(&self, room_id: &RoomId) -> Option<CursorView> {
        self.rooms.get(room_id).map(|t| CursorView {
            page: t.last_page,
            has_more: t.has_more,
            loading: t.in_flight.is_some(),
        })
    }

    /// True if the room timeline contains a message with this id.
    pub fn contains(&self, room_id: &RoomId, message_id: &str) -> bool {
        self.rooms.get(room_id).is_some_and(|t| t.position_of(message_id).is_some())
    }

    /// Activate `room_id`, dropping the previous room's timeline.
    ///
    /// The superseded timeline (and any fetch in flight for it) is
    /// discarded entirely; a fresh most-recent-page fetch is issued for
    /// the new room. Switching never reuses stale state.
    pub fn switch_room(&mut self, room_id: RoomId) -> FetchRequest {
        if let Some(old) = self.active.take() {
            self.rooms.remove(&old);
        }

        let request_id = self.fresh_request_id();
        let mut timeline = RoomTimeline::new();
        timeline.in_flight = Some(InFlight { request_id, page: 0 });
        self.rooms.insert(room_id.clone(), timeline);
        self.active = Some(room_id.clone());

        FetchRequest { request_id, room_id, page: 0, size: self.page_size }
    }

    /// Request the next older page for a room.
    ///
    /// Returns `None` (and issues nothing) while a fetch is in flight or
    /// once the backend reported the last page.
    pub fn load_older(&mut self, room_id: &RoomId) -> Option<FetchRequest> {
        let request_id = self.fresh_request_id();
        let size = self.page_size;
        let timeline = self.rooms.get_mut(room_id)?;
        if timeline.in_flight.is_some() || !timeline.has_more {
            return None;
        }

        let page = timeline.last_page.map_or(0, |p| p + 1);
        timeline.in_flight = Some(InFlight { request_id, page });
        Some(FetchRequest { request_id, room_id: room_id.clone(), page, size })
    }

    /// Merge a fetched page into a room timeline.
    ///
    /// Returns `None` when the response does not match the in-flight
    /// request (late response to a cancelled fetch); such pages must be
    /// discarded, not applied. Items arrive newest-first and are reversed
    /// to ascending order before the merge; ids already present are
    /// skipped.
    pub fn apply_page(
        &mut self,
        request_id: u64,
        room_id: &RoomId,
        page: HistoryPage,
    ) -> Option<AppliedPage> {
        let timeline = self.rooms.get_mut(room_id)?;
        let in_flight = timeline.in_flight.as_ref()?;
        if in_flight.request_id != request_id {
            return None;
        }

        let fetched_page = in_flight.page;
        timeline.in_flight = None;
        timeline.last_page = Some(fetched_page);
        timeline.has_more = !page.is_last;

        let mut inserted = Vec::new();
        for message in page.items.into_iter().rev() {
            let duplicate = message
                .id
                .as_deref()
                .is_some_and(|id| timeline.position_of(id).is_some());
            if duplicate {
                continue;
            }
            let seq = self.next_seq;
            self.next_seq += 1;
            timeline.insert(seq, message.clone());
            inserted.push(message);
        }

        Some(AppliedPage { inserted, has_more: timeline.has_more })
    }

    /// Reset the loading flag after a failed fetch so a retry can issue.
    ///
    /// Returns `false` for a stale request id.
    pub fn page_failed(&mut self, request_id: u64, room_id: &RoomId) -> bool {
        let Some(timeline) = self.rooms.get_mut(room_id) else {
            return false;
        };
        match &timeline.in_flight {
            Some(in_flight) if in_flight.request_id == request_id => {
                timeline.in_flight = None;
                true
            },
            _ => false,
        }
    }

    /// Insert a message arriving from the live subscription.
    ///
    /// A message whose id already exists replaces the existing entry in
    /// place, with the receipt state of both copies unioned: the local
    /// echo and the server copy must collapse to one entry, and the
    /// backend may double-deliver on the legacy feed. New messages are
    /// inserted in ascending-timestamp order, after existing entries with
    /// an equal timestamp.
    pub fn append_live(&mut self, message: ChatMessage) -> AppendOutcome {
        let seq = self.next_seq;
        self.next_seq += 1;

        let timeline =
            self.rooms.entry(message.room_id.clone()).or_insert_with(RoomTimeline::new);

        if let Some(id) = message.id.as_deref()
            && let Some(idx) = timeline.position_of(id)
        {
            let existing = &mut timeline.entries[idx];
            let mut merged = message;
            merged.read_by.extend(existing.message.read_by.iter().cloned());
            merged.delivered |= existing.message.delivered;
            let same_slot = merged.timestamp == existing.message.timestamp;
            if same_slot {
                existing.message = merged;
            } else {
                // Timestamp moved; reposition under the entry's original seq
                let old_seq = existing.seq;
                timeline.entries.remove(idx);
                timeline.insert(old_seq, merged);
            }
            return AppendOutcome::Replaced;
        }

        timeline.insert(seq, message);
        AppendOutcome::Inserted
    }

    /// Attribute a receipt to a message by id.
    ///
    /// Returns `true` when the message was found; `read_by` and
    /// `delivered` only ever grow.
    pub fn mark_receipt(
        &mut self,
        room_id: &RoomId,
        message_id: &str,
        username: &str,
        kind: ReceiptKind,
    ) -> bool {
        let Some(timeline) = self.rooms.get_mut(room_id) else {
            return false;
        };
        let Some(idx) = timeline.position_of(message_id) else {
            return false;
        };
        let message = &mut timeline.entries[idx].message;
        match kind {
            ReceiptKind::Read => {
                message.read_by.insert(username.to_string());
            },
            ReceiptKind::Delivered => {
                message.delivered = true;
            },
        }
        true
    }

    fn fresh_request_id(&mut self) -> u64 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }
}
