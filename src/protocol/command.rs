//! Command definitions
//!
//! A command is an ordered, immutable sequence of binary-safe arguments.

use std::fmt;

use bytes::Bytes;

/// A command to send, e.g. `["SET", "key", "value"]`
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Command {
    args: Vec<Bytes>,
}

impl Command {
    /// Build a command from its arguments
    pub fn new<I, A>(args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        Self {
            args: args
                .into_iter()
                .map(|arg| Bytes::copy_from_slice(arg.as_ref()))
                .collect(),
        }
    }

    /// Build a command from already owned arguments
    pub fn from_bytes(args: Vec<Bytes>) -> Self {
        Self { args }
    }

    /// Parse a whitespace separated line, e.g. `"SET key value"`
    pub fn from_line(line: &str) -> Self {
        Self::new(line.split_whitespace())
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl AsRef<[u8]>) -> Self {
        self.args.push(Bytes::copy_from_slice(arg.as_ref()));
        self
    }

    pub fn args(&self) -> &[Bytes] {
        &self.args
    }

    /// Upper-cased command name, if any
    pub fn name(&self) -> Option<String> {
        self.args
            .first()
            .map(|name| String::from_utf8_lossy(name).to_ascii_uppercase())
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.args.iter().map(|arg| String::from_utf8_lossy(arg)))
            .finish()
    }
}
