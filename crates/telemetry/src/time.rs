//! A simple RAII timer for measuring the duration of a scope, logged via
//! `tracing` on drop rather than tied to one specific metrics sink — several
//! components (commitment engine phases, checkpoint hashing, storage
//! snapshotting) want scope timing without each needing its own sink
//! sub-trait method.

use std::time::Instant;

pub struct Timer {
    label: &'static str,
    start: Instant,
}

impl Timer {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            start: Instant::now(),
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        tracing::debug!(
            label = self.label,
            elapsed_ms = self.start.elapsed().as_secs_f64() * 1000.0,
            "scope timer"
        );
    }
}
