//! Worker definitions
//!
//! A worker is one pool slot's current connection. Each worker owns its
//! handle exclusively for its whole lifetime.

use std::time::{Duration, Instant};

/// Lifecycle state of a pool slot
///
/// ```text
/// Connecting -> Idle <-> Leased
///                 |         |
///                 v         v
///             Checking -> Closing -> Connecting (replacement)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerState {
    /// A connection for this slot is being opened
    Connecting,

    /// Available for lease
    Idle,

    /// Exclusively held by one caller
    Leased,

    /// Out of the idle set while its liveness probe runs
    Checking,

    /// Handle closed; awaiting replacement (or the pool is stopping)
    Closing,
}

pub(crate) struct Worker<H> {
    pub(crate) slot: usize,
    pub(crate) id: u64,
    pub(crate) handle: H,
    last_checked: Instant,
}

impl<H> Worker<H> {
    pub(crate) fn new(slot: usize, id: u64, handle: H) -> Self {
        Self {
            slot,
            id,
            handle,
            last_checked: Instant::now(),
        }
    }

    /// Record a successful liveness probe
    pub(crate) fn mark_checked(&mut self) {
        self.last_checked = Instant::now();
    }

    /// Whether the last probe is at least `interval` old
    pub(crate) fn check_due(&self, interval: Duration) -> bool {
        self.last_checked.elapsed() >= interval
    }
}
