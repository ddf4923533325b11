//! Error Classifier
//!
//! Pure mapping from raw failures to the closed [`ErrorKind`] taxonomy.
//!
//! | Raw failure                                   | Kind                   |
//! |-----------------------------------------------|------------------------|
//! | refused / unreachable / DNS / framing faults  | `connection_error`     |
//! | AUTH rejected, `NOAUTH`/`WRONGPASS`/`NOPERM`  | `authentication_error` |
//! | reset / broken pipe / EOF / closed handle     | `network_error`        |
//! | peer not found (`io::ErrorKind::NotFound`)    | `network_error`        |
//! | socket or lease timeouts                      | `timeout_error`        |
//! | server error reply                            | `command_error`        |
//! | stopped pool, bad configuration               | `pool_error`           |
//! | anything else                                 | `unknown_error`        |
//!
//! `classify` never panics and is idempotent on already classified errors.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ConfigError;
use crate::error::{Cause, ErrorKind, StructuredError};
use crate::protocol::ConnError;

/// Error reply prefixes the server uses for credential problems
const AUTH_REPLY_PREFIXES: [&str; 3] = ["NOAUTH", "WRONGPASS", "NOPERM"];

/// A raw failure waiting to be classified
#[derive(Debug)]
pub enum Failure {
    /// Transport or connection-level failure from the protocol client
    Conn(ConnError),

    /// Error reply returned by the server for a command
    Reply(String),

    /// Invalid command or pipeline rejected before it was sent
    InvalidCommand(String),

    /// No worker became idle within the lease timeout
    LeaseTimeout(Duration),

    /// The pool has been stopped
    PoolStopped(String),

    /// The pool configuration was rejected
    Config(ConfigError),

    /// An error that has already been classified
    Classified(StructuredError),

    /// Any other failure, kept as an opaque cause
    Other(Cause),
}

impl From<ConnError> for Failure {
    fn from(err: ConnError) -> Self {
        Failure::Conn(err)
    }
}

impl From<ConfigError> for Failure {
    fn from(err: ConfigError) -> Self {
        Failure::Config(err)
    }
}

impl From<StructuredError> for Failure {
    fn from(err: StructuredError) -> Self {
        Failure::Classified(err)
    }
}

/// Classify a raw failure into a structured error
pub fn classify(failure: impl Into<Failure>) -> StructuredError {
    match failure.into() {
        Failure::Classified(err) => err,
        Failure::Conn(err) => classify_conn(err),
        Failure::Reply(message) => {
            let kind = if is_auth_reply(&message) {
                ErrorKind::Authentication
            } else {
                ErrorKind::Command
            };
            StructuredError::new(kind, message, None)
        }
        Failure::InvalidCommand(message) => StructuredError::new(ErrorKind::Command, message, None),
        Failure::LeaseTimeout(waited) => StructuredError::new(
            ErrorKind::Timeout,
            format!("no idle worker within {} ms", waited.as_millis()),
            None,
        ),
        Failure::PoolStopped(name) => StructuredError::new(
            ErrorKind::Pool,
            format!("pool {:?} is stopped", name),
            None,
        ),
        Failure::Config(err) => StructuredError::new(
            ErrorKind::Pool,
            format!("invalid configuration: {}", err),
            Some(Arc::new(err)),
        ),
        Failure::Other(cause) => StructuredError::new(
            ErrorKind::Unknown,
            format!("unrecognized failure: {}", cause),
            Some(cause),
        ),
    }
}

fn classify_conn(err: ConnError) -> StructuredError {
    let kind = match &err {
        ConnError::Io(io_err) => io_kind(io_err),
        ConnError::Protocol(_) | ConnError::Resolve(_) | ConnError::Handshake(_) => {
            ErrorKind::Connection
        }
        ConnError::Auth(_) => ErrorKind::Authentication,
        ConnError::Closed => ErrorKind::Network,
        ConnError::Timeout(_) => ErrorKind::Timeout,
    };
    StructuredError::new(kind, err.to_string(), Some(Arc::new(err)))
}

fn io_kind(err: &io::Error) -> ErrorKind {
    match err.kind() {
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::AddrNotAvailable
        | io::ErrorKind::AddrInUse => ErrorKind::Connection,

        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::NotConnected
        | io::ErrorKind::UnexpectedEof
        | io::ErrorKind::NotFound => ErrorKind::Network,

        // Socket read/write timeouts surface as WouldBlock on Unix.
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ErrorKind::Timeout,

        _ if looks_like_resolution_failure(err) => ErrorKind::Connection,
        _ => ErrorKind::Unknown,
    }
}

fn looks_like_resolution_failure(err: &io::Error) -> bool {
    let text = err.to_string().to_ascii_lowercase();
    ["lookup", "resolve", "name or service not known", "no such host", "unreachable"]
        .iter()
        .any(|needle| text.contains(needle))
}

fn is_auth_reply(message: &str) -> bool {
    let code = message.split_whitespace().next().unwrap_or_default();
    AUTH_REPLY_PREFIXES.contains(&code)
}
