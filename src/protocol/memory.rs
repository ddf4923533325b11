//! In-process protocol client
//!
//! A loopback store speaking the same command vocabulary as a real server,
//! for tests, benchmarks and embedders that want a pool without a network.
//! All handles opened from one client (and its clones) share one keyspace.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::config::Endpoint;

use super::{Command, ConnError, ProtocolClient, Reply};

/// Loopback protocol client backed by a shared in-memory map
#[derive(Debug, Clone, Default)]
pub struct MemoryClient {
    data: Arc<Mutex<HashMap<Bytes, Bytes>>>,
    next_handle: Arc<AtomicU64>,
}

/// One "connection" to a [`MemoryClient`]
#[derive(Debug)]
pub struct MemoryHandle {
    id: u64,
    closed: bool,
}

impl MemoryHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Simulate the peer dropping the connection
    pub fn sever(&mut self) {
        self.closed = true;
    }
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored
    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }

    fn apply(&self, command: &Command) -> Reply {
        let args = command.args();
        let Some(name) = command.name() else {
            return Reply::Error("ERR empty command".to_string());
        };
        let argc = args.len();
        let mut data = self.data.lock();

        match (name.as_str(), argc) {
            ("PING", 1) => Reply::status("PONG"),
            ("PING", 2) | ("ECHO", 2) => Reply::Bulk(args[1].clone()),
            ("GET", 2) => data.get(&args[1]).cloned().map_or(Reply::Nil, Reply::Bulk),
            ("SET", 3) => {
                data.insert(args[1].clone(), args[2].clone());
                Reply::status("OK")
            }
            ("DEL", n) if n >= 2 => {
                let removed = args[1..].iter().filter(|key| data.remove(*key).is_some()).count();
                Reply::Integer(removed as i64)
            }
            ("EXISTS", n) if n >= 2 => {
                let found = args[1..].iter().filter(|key| data.contains_key(*key)).count();
                Reply::Integer(found as i64)
            }
            ("MGET", n) if n >= 2 => Reply::Array(
                args[1..]
                    .iter()
                    .map(|key| data.get(key).cloned().map_or(Reply::Nil, Reply::Bulk))
                    .collect(),
            ),
            ("INCR", 2) => {
                let current = match data.get(&args[1]) {
                    None => 0,
                    Some(raw) => match std::str::from_utf8(raw).ok().and_then(|s| s.parse::<i64>().ok()) {
                        Some(value) => value,
                        None => {
                            return Reply::Error(
                                "ERR value is not an integer or out of range".to_string(),
                            )
                        }
                    },
                };
                let Some(next) = current.checked_add(1) else {
                    return Reply::Error("ERR increment or decrement would overflow".to_string());
                };
                data.insert(args[1].clone(), Bytes::from(next.to_string()));
                Reply::Integer(next)
            }
            ("FLUSHALL", 1) => {
                data.clear();
                Reply::status("OK")
            }
            ("PING" | "ECHO" | "GET" | "SET" | "DEL" | "EXISTS" | "MGET" | "INCR" | "FLUSHALL", _) => {
                Reply::Error(format!(
                    "ERR wrong number of arguments for '{}' command",
                    name.to_ascii_lowercase()
                ))
            }
            _ => Reply::Error(format!(
                "ERR unknown command '{}'",
                String::from_utf8_lossy(&args[0])
            )),
        }
    }
}

impl ProtocolClient for MemoryClient {
    type Handle = MemoryHandle;

    fn open(&self, _endpoint: &Endpoint) -> Result<MemoryHandle, ConnError> {
        let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
        Ok(MemoryHandle { id, closed: false })
    }

    fn send(&self, handle: &mut MemoryHandle, command: &Command) -> Result<Reply, ConnError> {
        if handle.closed {
            return Err(ConnError::Closed);
        }
        Ok(self.apply(command))
    }

    fn send_batch(
        &self,
        handle: &mut MemoryHandle,
        commands: &[Command],
    ) -> Result<Vec<Reply>, ConnError> {
        if handle.closed {
            return Err(ConnError::Closed);
        }
        Ok(commands.iter().map(|command| self.apply(command)).collect())
    }

    fn close(&self, handle: MemoryHandle) {
        tracing::trace!("Closed memory handle {}", handle.id);
    }
}
