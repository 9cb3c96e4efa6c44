//! Read/delivery receipt attribution with an orphan buffer.
//!
//! Receipts race the messages they refer to: a peer can read a message
//! and emit the receipt before this client has merged the message into
//! its timeline. Receipts with no matching message are held as orphans
//! and re-applied when the message arrives; orphans past a grace period
//! are silently dropped, and the buffer is bounded with oldest-first
//! eviction.

use std::collections::VecDeque;
use std::time::Duration;

use driftline_proto::{ReadReceipt, RoomId};

/// Maximum orphaned receipts held at once.
pub const ORPHAN_CAP: usize = 256;

/// How long an orphaned receipt waits for its message.
pub const ORPHAN_GRACE: Duration = Duration::from_secs(30);

/// A receipt waiting for its message to arrive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Orphan<I> {
    /// Room the receipt was observed in.
    pub room_id: RoomId,
    /// The receipt itself.
    pub receipt: ReadReceipt,
    received: I,
}

/// Buffers receipts that arrive before their messages.
#[derive(Debug, Clone)]
pub struct ReadReceiptTracker<I> {
    /// Oldest first.
    orphans: VecDeque<Orphan<I>>,
}

impl<I> Default for ReadReceiptTracker<I> {
    fn default() -> Self {
        Self { orphans: VecDeque::new() }
    }
}

impl<I> ReadReceiptTracker<I>
where
    I: Copy + Ord + std::ops::Sub<Output = Duration>,
{
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer a receipt whose message is not in the timeline yet.
    ///
    /// When full, the oldest orphan is evicted first.
    pub fn defer(&mut self, room_id: RoomId, receipt: ReadReceipt, now: I) {
        if self.orphans.len() >= ORPHAN_CAP {
            self.orphans.pop_front();
        }
        self.orphans.push_back(Orphan { room_id, receipt, received: now });
    }

    /// Take every buffered receipt for a newly arrived message.
    ///
    /// Expired orphans for the message are dropped, not returned.
    pub fn claim(&mut self, room_id: &RoomId, message_id: &str, now: I) -> Vec<ReadReceipt> {
        let mut claimed = Vec::new();
        self.orphans.retain(|orphan| {
            if orphan.room_id == *room_id && orphan.receipt.message_id == message_id {
                if now - orphan.received < ORPHAN_GRACE {
                    claimed.push(orphan.receipt.clone());
                }
                false
            } else {
                true
            }
        });
        claimed
    }

    /// Drop orphans past the grace period.
    pub fn expire(&mut self, now: I) {
        self.orphans.retain(|orphan| now - orphan.received < ORPHAN_GRACE);
    }

    /// Number of receipts currently buffered.
    pub fn len(&self) -> usize {
        self.orphans.len()
    }

    /// True when no receipts are buffered.
    pub fn is_empty(&self) -> bool {
        self.orphans.is_empty()
    }

    /// Forget all buffered receipts.
    pub fn clear(&mut self) {
        self.orphans.clear();
    }
}
