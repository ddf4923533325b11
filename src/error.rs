//! Error types for kvpool
//!
//! Every failure handed back to a caller is a [`StructuredError`] carrying one
//! of the seven [`ErrorKind`]s. Raw transport failures never escape the crate;
//! they are turned into structured values by [`crate::classify`].

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Result type alias using StructuredError
pub type Result<T> = std::result::Result<T, StructuredError>;

/// Opaque underlying reason attached to a structured error
pub type Cause = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Closed taxonomy of failure kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Connection could not be established or broke in a generic way
    Connection,

    /// The server rejected a command (wrong type, arity, unknown command, ...)
    Command,

    /// An explicit timeout (lease wait, socket read/write)
    Timeout,

    /// The socket was closed underneath us
    Network,

    /// The server rejected our credentials
    Authentication,

    /// Pool-level failure (stopped pool, invalid configuration)
    Pool,

    /// Anything the classifier does not recognize
    Unknown,
}

impl ErrorKind {
    /// Every kind, in declaration order
    pub const ALL: [ErrorKind; 7] = [
        ErrorKind::Connection,
        ErrorKind::Command,
        ErrorKind::Timeout,
        ErrorKind::Network,
        ErrorKind::Authentication,
        ErrorKind::Pool,
        ErrorKind::Unknown,
    ];

    /// Stable snake_case name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Connection => "connection_error",
            ErrorKind::Command => "command_error",
            ErrorKind::Timeout => "timeout_error",
            ErrorKind::Network => "network_error",
            ErrorKind::Authentication => "authentication_error",
            ErrorKind::Pool => "pool_error",
            ErrorKind::Unknown => "unknown_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified, immutable error value
///
/// Built only by the classifier; callers can inspect it but never construct
/// or mutate one.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct StructuredError {
    kind: ErrorKind,
    message: String,
    #[source]
    cause: Option<Cause>,
}

impl StructuredError {
    pub(crate) fn new(kind: ErrorKind, message: impl Into<String>, cause: Option<Cause>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause,
        }
    }

    /// The classified kind
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Human readable description
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The underlying reason, kept for diagnostics
    pub fn cause(&self) -> Option<&Cause> {
        self.cause.as_ref()
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == ErrorKind::Timeout
    }
}
