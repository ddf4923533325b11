//! Reply definitions
//!
//! Represents replies read back from the data store.

use bytes::Bytes;

/// A decoded reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `$-1` / `*-1`, e.g. GET on a missing key
    Nil,

    /// `+OK`, `+PONG`
    Status(String),

    /// `:123`
    Integer(i64),

    /// `$...` binary-safe bulk string
    Bulk(Bytes),

    /// `*...` nested replies
    Array(Vec<Reply>),

    /// `-ERR ...` command-level failure reported by the server
    Error(String),
}

impl Reply {
    /// Create a status reply
    pub fn status(text: impl Into<String>) -> Self {
        Reply::Status(text.into())
    }

    /// Create a bulk reply by copying the given bytes
    pub fn bulk(data: impl AsRef<[u8]>) -> Self {
        Reply::Bulk(Bytes::copy_from_slice(data.as_ref()))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Reply::Nil)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    /// Payload bytes for status and bulk replies
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Reply::Status(text) => Some(text.as_bytes()),
            Reply::Bulk(data) => Some(data),
            _ => None,
        }
    }

    /// Payload as UTF-8 text for status and bulk replies
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|data| std::str::from_utf8(data).ok())
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Reply::Integer(value) => Some(*value),
            _ => None,
        }
    }
}
