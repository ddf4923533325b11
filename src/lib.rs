//! # kvpool
//!
//! A managed pool of persistent connections to one Redis-compatible
//! key-value endpoint:
//! - Fixed-size worker pool with FIFO, time-bounded leasing
//! - Single-command and pipelined execution with bounded retries
//! - Periodic liveness probes that retire and replace broken connections
//! - A closed, structured error taxonomy
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  KvClient / callers                          │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ execute / execute_batch
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                 Command Executor                             │
//! │          (lease → send → classify → retry → return)          │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │    Pool     │          │  Classifier │
//!   │  (workers)  │          │ (ErrorKind) │
//!   └──────┬──────┘          └─────────────┘
//!          │
//!          ▼
//!   ┌─────────────┐
//!   │  Protocol   │
//!   │   Client    │
//!   └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use kvpool::{Command, ExecOptions, MemoryClient, Pool, PoolConfig, Reply};
//!
//! let config = PoolConfig::builder("cache", "redis://127.0.0.1:6379")
//!     .pool_size(2)
//!     .build();
//! let pool = Pool::start(config, MemoryClient::new()).unwrap();
//!
//! let opts = ExecOptions::default();
//! pool.execute(&Command::new(["SET", "k", "v"]), &opts).unwrap();
//! assert_eq!(pool.execute(&Command::new(["GET", "k"]), &opts).unwrap(), Reply::bulk("v"));
//! pool.stop();
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod classify;
pub mod protocol;
pub mod pool;
pub mod executor;
pub mod client;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use classify::{classify, Failure};
pub use client::KvClient;
pub use config::{ConfigError, Endpoint, ExecOptions, PoolConfig};
pub use error::{ErrorKind, Result, StructuredError};
pub use pool::{HealthReport, HealthStatus, Lease, Pool, PoolStats, WorkerState};
pub use protocol::{Command, ConnError, MemoryClient, ProtocolClient, Reply, RespClient};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of kvpool
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
