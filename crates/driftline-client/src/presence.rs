//! Online-user presence state.
//!
//! Presence merges two sources: a full snapshot of currently online users
//! fetched once per session, and incremental per-user updates from the
//! presence topic. Deltas that arrive before the snapshot are buffered and
//! replayed on top of it so the race between the two cannot lose a
//! transition.

use std::collections::{BTreeMap, BTreeSet};

use driftline_proto::PresenceUpdate;

/// Tracks which users are online and when offline users were last seen.
#[derive(Debug, Clone, Default)]
pub struct PresenceTracker {
    online: BTreeSet<String>,
    last_seen: BTreeMap<String, i64>,
    snapshot_applied: bool,
    /// Deltas received before the snapshot, in arrival order.
    pending: Vec<PresenceUpdate>,
}

impl PresenceTracker {
    /// Create an empty tracker awaiting its snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Usernames currently online, sorted.
    pub fn online_users(&self) -> Vec<String> {
        self.online.iter().cloned().collect()
    }

    /// True if the user is currently online.
    pub fn is_online(&self, username: &str) -> bool {
        self.online.contains(username)
    }

    /// Last-seen timestamp (epoch milliseconds) for an offline user.
    pub fn last_seen(&self, username: &str) -> Option<i64> {
        self.last_seen.get(username).copied()
    }

    /// Apply the full online-users snapshot.
    ///
    /// Replaces the online set wholesale and replays any buffered deltas
    /// on top, so ordering between the fetch and the live topic does not
    /// matter. Returns `true` if the visible online set changed.
    pub fn apply_snapshot(&mut self, usernames: Vec<String>) -> bool {
        let before = self.online.clone();
        self.online = usernames.into_iter().collect();
        self.snapshot_applied = true;
        for update in std::mem::take(&mut self.pending) {
            self.merge(update);
        }
        before != self.online
    }

    /// Apply an incremental presence update.
    ///
    /// Before the snapshot arrives the update is buffered. Returns `true`
    /// if the visible online set changed.
    pub fn apply_update(&mut self, update: PresenceUpdate) -> bool {
        if !self.snapshot_applied {
            self.pending.push(update);
            return false;
        }
        self.merge(update)
    }

    /// Drop all state for a fresh session.
    ///
    /// The next session fetches its own snapshot; carrying the old set
    /// across a reconnect would show users online that went away while the
    /// transport was down.
    pub fn reset(&mut self) {
        self.online.clear();
        self.last_seen.clear();
        self.pending.clear();
        self.snapshot_applied = false;
    }

    fn merge(&mut self, update: PresenceUpdate) -> bool {
        if update.online {
            self.last_seen.remove(&update.username);
            self.online.insert(update.username)
        } else {
            if let Some(ts) = update.last_seen {
                self.last_seen.insert(update.username.clone(), ts);
            }
            self.online.remove(&update.username)
        }
    }
}
