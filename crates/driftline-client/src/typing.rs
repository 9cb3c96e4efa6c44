//! Local typing debounce and remote typing indicator expiry.
//!
//! The local side turns raw input notifications into at most one
//! start/stop signal pair per typing burst: a start fires on the first
//! keystroke and a stop fires when the composer empties or after a quiet
//! period with no input. The remote side records per-user typing events
//! and expires them after a fixed lifetime, so a peer whose stop event
//! was lost in transit self-heals instead of typing forever.

use std::collections::HashMap;
use std::time::Duration;

use driftline_proto::{RoomId, TypingEvent};

/// How long after the last keystroke a local typing burst ends.
pub const TYPING_DEBOUNCE: Duration = Duration::from_millis(1000);

/// How long a remote typing indicator stays visible without refresh.
pub const TYPING_TTL: Duration = Duration::from_millis(3000);

/// Outbound typing transition the caller must publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingSignal {
    /// The local user started typing in this room.
    Start,
    /// The local user stopped typing in this room.
    Stop,
}

#[derive(Debug, Clone, Copy)]
struct LocalTyping<I> {
    last_input: I,
}

/// Tracks typing state for the local user and all remote peers.
#[derive(Debug, Clone)]
pub struct TypingCoordinator<I> {
    local: HashMap<RoomId, LocalTyping<I>>,
    /// Remote typists per room, keyed by username, valued by last refresh.
    remote: HashMap<RoomId, HashMap<String, I>>,
}

impl<I> Default for TypingCoordinator<I> {
    fn default() -> Self {
        Self { local: HashMap::new(), remote: HashMap::new() }
    }
}

impl<I> TypingCoordinator<I>
where
    I: Copy + Ord + std::ops::Sub<Output = Duration>,
{
    /// Create an empty coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a local composer change.
    ///
    /// `has_text` is whether the composer currently holds any text.
    /// Returns the transition to publish, if any; repeated keystrokes
    /// inside a burst refresh the debounce window without re-signalling.
    pub fn input(&mut self, room_id: &RoomId, has_text: bool, now: I) -> Option<TypingSignal> {
        match (has_text, self.local.get_mut(room_id)) {
            (true, Some(state)) => {
                state.last_input = now;
                None
            },
            (true, None) => {
                self.local.insert(room_id.clone(), LocalTyping { last_input: now });
                Some(TypingSignal::Start)
            },
            (false, Some(_)) => {
                self.local.remove(room_id);
                Some(TypingSignal::Stop)
            },
            (false, None) => None,
        }
    }

    /// Expire quiet local bursts.
    ///
    /// Returns the rooms whose bursts ended; each needs a stop published.
    pub fn tick_local(&mut self, now: I) -> Vec<RoomId> {
        let mut stopped = Vec::new();
        self.local.retain(|room_id, state| {
            if now - state.last_input >= TYPING_DEBOUNCE {
                stopped.push(room_id.clone());
                false
            } else {
                true
            }
        });
        stopped
    }

    /// Record a remote typing event.
    ///
    /// A `typing: true` event inserts or refreshes the user; `false`
    /// removes them immediately.
    pub fn remote_event(&mut self, event: &TypingEvent, now: I) {
        if event.typing {
            self.remote
                .entry(event.room_id.clone())
                .or_default()
                .insert(event.username.clone(), now);
        } else if let Some(room) = self.remote.get_mut(&event.room_id) {
            room.remove(&event.username);
            if room.is_empty() {
                self.remote.remove(&event.room_id);
            }
        }
    }

    /// Drop remote indicators past their lifetime.
    pub fn expire_remote(&mut self, now: I) {
        self.remote.retain(|_, users| {
            users.retain(|_, refreshed| now - *refreshed < TYPING_TTL);
            !users.is_empty()
        });
    }

    /// Remote users currently typing in a room, sorted.
    ///
    /// Indicators past their lifetime are excluded even if not yet swept.
    pub fn typists(&self, room_id: &RoomId, now: I) -> Vec<String> {
        let Some(users) = self.remote.get(room_id) else {
            return Vec::new();
        };
        let mut names: Vec<String> = users
            .iter()
            .filter(|(_, refreshed)| now - **refreshed < TYPING_TTL)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort_unstable();
        names
    }

    /// Rooms that currently have any remote typists recorded.
    pub fn rooms_with_typists(&self) -> Vec<RoomId> {
        self.remote.keys().cloned().collect()
    }

    /// Local typing rooms that must be stopped before the state is
    /// dropped, e.g. on disconnect.
    pub fn drain_local(&mut self) -> Vec<RoomId> {
        self.local.drain().map(|(room_id, _)| room_id).collect()
    }

    /// Forget all remote indicators, e.g. on reconnect.
    pub fn reset_remote(&mut self) {
        self.remote.clear();
    }
}
