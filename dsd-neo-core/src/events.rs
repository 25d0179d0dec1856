//! Event history & snapshot publisher.
//!
//! Two fixed-size rings (one per slot) of self-contained UI/logging events;
//! the publisher deep-copies both into a second backing store before handing
//! the UI a read-only snapshot, so the UI thread never aliases mutating
//! decoder state.

use std::time::{Duration, SystemTime};

pub const EVENT_HISTORY_CAPACITY: usize = 255;
pub const MAX_MESSAGE_LEN: usize = 2000;

/// Coarse system/protocol-family tag on an event, mirroring the C `systype`
/// byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemType {
    P25Phase1,
    P25Phase2,
    Dmr,
    Nxdn,
    Dpmr,
    Ysf,
    DStar,
    M17,
    Edacs,
}

/// Event subtype, the other half of the C `(systype, subtype)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSubtype {
    Grant,
    Release,
    CcSync,
    SyncLost,
    Registration,
    DataCall,
    EncryptionUpdate,
    NeighborUpdate,
    Other,
}

/// Hierarchical system identity carried on every event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdentityHierarchy {
    pub wacn: u32,
    pub sysid: u16,
    pub nac_or_cc: u16,
    pub rfss: u8,
    pub site: u8,
}

/// A single self-contained history event.
#[derive(Debug, Clone)]
pub struct Event {
    pub systype: SystemType,
    pub subtype: EventSubtype,
    pub identity: IdentityHierarchy,
    pub group_call: bool,
    pub encrypted: bool,
    pub source_id: u32,
    pub target_id: u32,
    pub wall_clock: SystemTime,
    pub monotonic: Duration,
    pub message: String,
}

impl Event {
    /// Truncates `message` to [`MAX_MESSAGE_LEN`] bytes without splitting a UTF-8 code point.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        let mut s: String = message.into();
        if s.len() > MAX_MESSAGE_LEN {
            let mut end = MAX_MESSAGE_LEN;
            while !s.is_char_boundary(end) {
                end -= 1;
            }
            s.truncate(end);
        }
        self.message = s;
        self
    }
}

/// A fixed-capacity ring where the newest event overwrites the oldest once
/// full.
#[derive(Debug, Default, Clone)]
pub struct EventRing {
    events: Vec<Event>,
    capacity: usize,
}

impl EventRing {
    pub fn new() -> Self {
        Self { events: Vec::with_capacity(EVENT_HISTORY_CAPACITY), capacity: EVENT_HISTORY_CAPACITY }
    }

    pub fn push(&mut self, event: Event) {
        if self.events.len() >= self.capacity {
            self.events.remove(0);
        }
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }
}

/// Per-slot event history: one ring per P25/DMR TDMA slot.
#[derive(Debug, Default)]
pub struct EventHistory {
    pub slots: [EventRing; 2],
}

impl EventHistory {
    pub fn new() -> Self {
        Self { slots: [EventRing::new(), EventRing::new()] }
    }

    pub fn push(&mut self, slot: usize, event: Event) {
        if let Some(ring) = self.slots.get_mut(slot) {
            ring.push(event);
        }
    }
}

/// A fully owned, read-only copy of [`EventHistory`].
#[derive(Debug, Clone, Default)]
pub struct EventHistorySnapshot {
    pub slots: [Vec<Event>; 2],
}

/// Deep-copies the live event history into an owned snapshot for UI
/// consumption.
pub fn publish_snapshot(history: &EventHistory) -> EventHistorySnapshot {
    EventHistorySnapshot {
        slots: [
            history.slots[0].iter().cloned().collect(),
            history.slots[1].iter().cloned().collect(),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event(n: u32) -> Event {
        Event {
            systype: SystemType::P25Phase1,
            subtype: EventSubtype::Grant,
            identity: IdentityHierarchy::default(),
            group_call: true,
            encrypted: false,
            source_id: n,
            target_id: 0,
            wall_clock: SystemTime::UNIX_EPOCH,
            monotonic: Duration::from_secs(n as u64),
            message: String::new(),
        }
    }

    #[test]
    fn ring_overwrites_oldest_when_full() {
        let mut ring = EventRing::new();
        for i in 0..(EVENT_HISTORY_CAPACITY as u32 + 5) {
            ring.push(sample_event(i));
        }
        assert_eq!(ring.len(), EVENT_HISTORY_CAPACITY);
        let first = ring.iter().next().unwrap();
        assert_eq!(first.source_id, 5);
    }

    #[test]
    fn snapshot_is_fully_owned_and_independent() {
        let mut history = EventHistory::new();
        history.push(0, sample_event(1));
        let snapshot = publish_snapshot(&history);
        history.push(0, sample_event(2));
        assert_eq!(snapshot.slots[0].len(), 1);
        assert_eq!(snapshot.slots[0][0].source_id, 1);
    }

    #[test]
    fn message_truncates_at_cap() {
        let long = "x".repeat(MAX_MESSAGE_LEN + 500);
        let event = sample_event(0).with_message(long);
        assert_eq!(event.message.len(), MAX_MESSAGE_LEN);
    }
}
