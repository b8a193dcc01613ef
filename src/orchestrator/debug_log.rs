//! Bounded debug log owned by one orchestrator instance.
//!
//! A 500-entry ring buffer recording phase transitions, task parses,
//! agent lifecycle, prompt previews, stream open/close, stops, and
//! errors. Never shared across workspaces.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

pub const DEBUG_LOG_CAPACITY: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugKind {
    Phase,
    TaskParse,
    AgentStart,
    AgentComplete,
    Prompt,
    StreamOpen,
    StreamClose,
    Stop,
    Error,
}

#[derive(Debug, Clone)]
pub struct DebugEntry {
    pub timestamp: DateTime<Utc>,
    pub kind: DebugKind,
    pub message: String,
}

pub struct DebugLog {
    entries: Mutex<VecDeque<DebugEntry>>,
    capacity: usize,
}

impl Default for DebugLog {
    fn default() -> Self {
        Self::new(DEBUG_LOG_CAPACITY)
    }
}

impl DebugLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            capacity,
        }
    }

    pub fn record(&self, kind: DebugKind, message: impl Into<String>) {
        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(DebugEntry {
            timestamp: Utc::now(),
            kind,
            message: message.into(),
        });
    }

    pub fn entries(&self) -> Vec<DebugEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Entries whose message contains `needle`, oldest first.
    pub fn matching(&self, needle: &str) -> Vec<DebugEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|entry| entry.message.contains(needle))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_drops_oldest() {
        let log = DebugLog::new(3);
        for i in 0..5 {
            log.record(DebugKind::Phase, format!("entry {}", i));
        }
        assert_eq!(log.len(), 3);
        let entries = log.entries();
        assert_eq!(entries[0].message, "entry 2");
        assert_eq!(entries[2].message, "entry 4");
    }

    #[test]
    fn test_matching() {
        let log = DebugLog::default();
        log.record(DebugKind::TaskParse, "TASK planned: one");
        log.record(DebugKind::AgentStart, "CRAFTER running: one");
        log.record(DebugKind::TaskParse, "TASK planned: two");
        assert_eq!(log.matching("TASK planned").len(), 2);
        assert_eq!(log.matching("CRAFTER running").len(), 1);
    }
}
