//! Cooperative cancellation flags keyed by agent id.
//!
//! Loops call `begin` when they start, poll `is_cancelled` at iteration
//! and chunk boundaries, and `finish` on exit so the active-agent map
//! converges after an interrupt.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use tracing::debug;

#[derive(Default)]
pub struct CancellationRegistry {
    flags: DashMap<String, Arc<AtomicBool>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an agent as active with a cleared flag, unless an interrupt
    /// already arrived for it.
    pub fn begin(&self, agent_id: &str) {
        self.flags
            .entry(agent_id.to_string())
            .or_insert_with(|| Arc::new(AtomicBool::new(false)));
    }

    /// Request cancellation. Unknown agents get a pre-set flag so a loop
    /// registering later observes the interrupt immediately.
    pub fn interrupt(&self, agent_id: &str) {
        debug!(agent_id, "Interrupt requested");
        self.flags
            .entry(agent_id.to_string())
            .or_insert_with(|| Arc::new(AtomicBool::new(false)))
            .store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self, agent_id: &str) -> bool {
        self.flags
            .get(agent_id)
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Remove an agent from the active map after its loop exits.
    pub fn finish(&self, agent_id: &str) {
        self.flags.remove(agent_id);
    }

    pub fn active_agents(&self) -> Vec<String> {
        self.flags.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Interrupt everything currently active.
    pub fn interrupt_all(&self) {
        for entry in self.flags.iter() {
            entry.value().store(true, Ordering::SeqCst);
        }
    }

    /// Clear all flags. Shutdown path.
    pub fn clear(&self) {
        self.flags.clear();
    }
}
