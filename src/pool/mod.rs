//! Pool Module
//!
//! A fixed-size set of workers, each wrapping one exclusively owned
//! connection, leased to callers one at a time.
//!
//! ## Responsibilities
//! - Open `pool_size` connections at start; fail start if any cannot open
//! - Lease idle workers in FIFO order with a bounded wait
//! - Take workers back on every exit path (RAII [`Lease`])
//! - Probe idle workers periodically; retire and replace failing ones
//! - Close everything on stop
//!
//! ## Slot lifecycle
//! ```text
//! Connecting -> Idle <-> Leased -> (Idle | Checking)
//! Idle -> Checking -> (Idle | Closing)
//! Closing -> Connecting        (replacement, unless stopping)
//! ```

mod health;
mod lease;
mod manager;
mod worker;

pub use health::{HealthReport, HealthStatus};
pub use lease::Lease;
pub use manager::{Pool, PoolStats};
pub use worker::WorkerState;
