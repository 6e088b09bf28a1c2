//! Bounded, human-readable activity log for one session.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

/// Default number of lines retained.
pub const DEFAULT_ACTIVITY_CAPACITY: usize = 256;

/// Ring buffer of activity lines, shared between the session and its tasks.
///
/// Every line is mirrored into `tracing`.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    inner: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_ACTIVITY_CAPACITY)
    }
}

impl ActivityLog {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn push(&self, line: impl Into<String>) {
        let line = line.into();
        if line.starts_with("[error]") || line.starts_with("connect failed") {
            warn!(target: "realtime::activity", "{line}");
        } else {
            info!(target: "realtime::activity", "{line}");
        }

        let mut lines = self.inner.lock();
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    /// Snapshot of the retained lines, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.inner.lock().iter().cloned().collect()
    }

    pub fn contains(&self, line: &str) -> bool {
        self.inner.lock().iter().any(|l| l == line)
    }

    pub fn count(&self, line: &str) -> usize {
        self.inner.lock().iter().filter(|l| *l == line).count()
    }

    pub fn last(&self) -> Option<String> {
        self.inner.lock().back().cloned()
    }
}
