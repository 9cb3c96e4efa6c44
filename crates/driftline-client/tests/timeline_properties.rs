//! Property tests for timeline ordering and deduplication.

#![allow(clippy::unwrap_used, clippy::panic)]

use std::collections::HashSet;

use driftline_client::{DEFAULT_PAGE_SIZE, MessageStore};
use driftline_proto::{ChatMessage, HistoryPage, RoomId};
use proptest::prelude::*;

fn message(id: u32, timestamp: i64) -> ChatMessage {
    let mut m = ChatMessage::chat(RoomId::global(), "ada", "x", timestamp);
    m.id = Some(format!("m{id}"));
    m
}

fn assert_invariants(store: &MessageStore) {
    let timeline = store.timeline(&RoomId::global());

    // Ascending by timestamp
    for pair in timeline.windows(2) {
        assert!(pair[0].timestamp <= pair[1].timestamp);
    }

    // No id appears twice
    let mut seen = HashSet::new();
    for m in &timeline {
        if let Some(id) = &m.id {
            assert!(seen.insert(id.clone()), "duplicate id {id}");
        }
    }
}

proptest! {
    /// Any interleaving of live appends keeps the timeline sorted and
    /// free of duplicate ids. Ids are drawn from a small pool to force
    /// collisions.
    #[test]
    fn live_appends_stay_sorted_and_deduped(
        ops in prop::collection::vec((0u32..16, 0i64..1_000), 1..200),
    ) {
        let mut store = MessageStore::new(DEFAULT_PAGE_SIZE);
        for (id, timestamp) in ops {
            store.append_live(message(id, timestamp));
        }
        assert_invariants(&store);
    }

    /// Replacing an existing id never changes the timeline length.
    #[test]
    fn replace_by_id_keeps_length(
        seed in prop::collection::vec((0u32..8, 0i64..100), 1..50),
        replays in prop::collection::vec((0u32..8, 0i64..100), 1..50),
    ) {
        let mut store = MessageStore::new(DEFAULT_PAGE_SIZE);
        let mut inserted = HashSet::new();
        for (id, timestamp) in seed {
            store.append_live(message(id, timestamp));
            inserted.insert(id);
        }
        let len = store.timeline(&RoomId::global()).len();

        for (id, timestamp) in replays {
            if inserted.contains(&id) {
                store.append_live(message(id, timestamp));
                assert_eq!(store.timeline(&RoomId::global()).len(), len);
            }
        }
        assert_invariants(&store);
    }

    /// History pages and live messages interleave without breaking order
    /// or introducing duplicates, even when pages repeat ids.
    #[test]
    fn history_and_live_interleave(
        page_items in prop::collection::vec((0u32..16, 0i64..1_000), 0..30),
        live in prop::collection::vec((0u32..16, 0i64..1_000), 0..30),
    ) {
        let room = RoomId::global();
        let mut store = MessageStore::new(DEFAULT_PAGE_SIZE);
        let request = store.switch_room(room.clone());

        for (id, timestamp) in &live {
            store.append_live(message(*id, *timestamp));
        }

        let mut items: Vec<ChatMessage> =
            page_items.iter().map(|(id, ts)| message(*id, *ts)).collect();
        // Backend pages are newest-first
        items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        store.apply_page(request.request_id, &room, HistoryPage { items, is_last: false });

        assert_invariants(&store);
    }

    /// Equal timestamps preserve arrival order among live appends.
    #[test]
    fn equal_timestamps_are_arrival_ordered(count in 1usize..30) {
        let room = RoomId::global();
        let mut store = MessageStore::new(DEFAULT_PAGE_SIZE);
        for id in 0..count {
            let mut m = ChatMessage::chat(room.clone(), "ada", "x", 42);
            m.id = Some(format!("m{id}"));
            store.append_live(m);
        }
        let ids: Vec<String> =
            store.timeline(&room).iter().filter_map(|m| m.id.clone()).collect();
        let expected: Vec<String> = (0..count).map(|id| format!("m{id}")).collect();
        assert_eq!(ids, expected);
    }
}
