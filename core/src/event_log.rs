//! Permanent, append-only record of everything the engine emitted.

use std::slice;

use serde::{Deserialize, Serialize};
use vow_types::EngineEvent;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedEvent {
    /// 1-based, gapless, never reused.
    pub seq: u64,
    pub event: EngineEvent,
}

/// Event log with a monotonic sequence counter.
///
/// There is no removal API. Sequence numbers survive persistence, so a
/// consumer can resume from the last `seq` it has seen.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventLog {
    entries: Vec<LoggedEvent>,
}

impl EventLog {
    #[inline]
    #[must_use]
    pub fn entries(&self) -> &[LoggedEvent] {
        &self.entries
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> slice::Iter<'_, LoggedEvent> {
        self.entries.iter()
    }

    #[inline]
    #[must_use]
    pub fn last_seq(&self) -> u64 {
        self.entries.last().map_or(0, |entry| entry.seq)
    }

    /// The most recent `count` entries, oldest first.
    #[must_use]
    pub fn tail(&self, count: usize) -> &[LoggedEvent] {
        let start = self.entries.len().saturating_sub(count);
        &self.entries[start..]
    }

    /// Entries with `seq` strictly greater than `seq`.
    #[must_use]
    pub fn since(&self, seq: u64) -> &[LoggedEvent] {
        let start = self.entries.partition_point(|entry| entry.seq <= seq);
        &self.entries[start..]
    }

    pub fn append(&mut self, events: &[EngineEvent]) {
        let mut seq = self.last_seq();
        self.entries.extend(events.iter().map(|event| {
            seq += 1;
            LoggedEvent {
                seq,
                event: event.clone(),
            }
        }));
    }
}

impl<'a> IntoIterator for &'a EventLog {
    type Item = &'a LoggedEvent;
    type IntoIter = slice::Iter<'a, LoggedEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
