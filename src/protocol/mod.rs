//! Protocol Module
//!
//! The protocol client the pool is built on: it opens one connection to the
//! data store, sends commands and pipelines over it, and reports
//! connection-level failures separately from command-level ones.
//!
//! ## Wire Format (RESP2)
//!
//! ### Request
//! ```text
//! *<argc>\r\n
//! $<len>\r\n<arg bytes>\r\n      (repeated argc times)
//! ```
//!
//! ### Replies
//! - `+OK\r\n`            status
//! - `-ERR msg\r\n`       error (command-level failure)
//! - `:42\r\n`            integer
//! - `$5\r\nhello\r\n`    bulk (`$-1` is nil)
//! - `*2\r\n...`          array (`*-1` is nil)
//!
//! ## Implementations
//! - [`RespClient`]: blocking TCP client
//! - [`MemoryClient`]: in-process loopback store

mod command;
mod connection;
mod memory;
mod reply;
mod resp;

pub use command::Command;
pub use connection::{RespClient, RespConnection};
pub use memory::{MemoryClient, MemoryHandle};
pub use reply::Reply;
pub use resp::{encode_command, read_reply};

use thiserror::Error;

use crate::config::Endpoint;

/// Connection-level failure reported by a protocol client
#[derive(Debug, Error)]
pub enum ConnError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Could not resolve {0}")]
    Resolve(String),

    #[error("Authentication rejected: {0}")]
    Auth(String),

    #[error("Handshake rejected: {0}")]
    Handshake(String),

    #[error("Connection closed")]
    Closed,

    #[error("Timed out: {0}")]
    Timeout(String),
}

/// A client able to open and drive single connections to the data store
///
/// The pool owns every handle it opens and never shares one between workers,
/// so implementations only need `&self` plus exclusive access to the handle.
pub trait ProtocolClient: Send + Sync + 'static {
    /// One open connection
    type Handle: Send + 'static;

    /// Open a connection, including any handshake (AUTH, SELECT)
    fn open(&self, endpoint: &Endpoint) -> Result<Self::Handle, ConnError>;

    /// Send one command and read its reply
    fn send(&self, handle: &mut Self::Handle, command: &Command) -> Result<Reply, ConnError>;

    /// Send all commands in one round trip; one reply per command, in order
    fn send_batch(
        &self,
        handle: &mut Self::Handle,
        commands: &[Command],
    ) -> Result<Vec<Reply>, ConnError>;

    /// Close the connection
    fn close(&self, handle: Self::Handle);
}
