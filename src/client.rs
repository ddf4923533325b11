//! Client facade
//!
//! `KvClient` composes a [`Pool`] with default execution options and offers
//! typed helpers for the common commands. Every call leases a worker,
//! executes, and returns the worker.

use bytes::Bytes;

use crate::classify::{classify, Failure};
use crate::config::{ExecOptions, PoolConfig};
use crate::error::Result;
use crate::pool::Pool;
use crate::protocol::{Command, ConnError, ProtocolClient, Reply, RespClient};

/// Pooled client for a single endpoint
pub struct KvClient<C: ProtocolClient = RespClient> {
    pool: Pool<C>,
    options: ExecOptions,
}

impl<C: ProtocolClient> Clone for KvClient<C> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            options: self.options,
        }
    }
}

impl KvClient<RespClient> {
    /// Start a TCP pool using the socket timeouts from `config`
    pub fn connect(config: PoolConfig) -> Result<Self> {
        let client = RespClient::from_config(&config);
        Self::with_client(config, client)
    }
}

impl<C: ProtocolClient> KvClient<C> {
    /// Start a pool over the given protocol client
    pub fn with_client(config: PoolConfig, client: C) -> Result<Self> {
        Ok(Self {
            pool: Pool::start(config, client)?,
            options: ExecOptions::default(),
        })
    }

    /// Wrap an already running pool
    pub fn from_pool(pool: Pool<C>) -> Self {
        Self {
            pool,
            options: ExecOptions::default(),
        }
    }

    /// Replace the default execution options
    pub fn with_options(mut self, options: ExecOptions) -> Self {
        self.options = options;
        self
    }

    pub fn pool(&self) -> &Pool<C> {
        &self.pool
    }

    pub fn options(&self) -> &ExecOptions {
        &self.options
    }

    /// Run an arbitrary command
    pub fn command(&self, command: &Command) -> Result<Reply> {
        self.pool.execute(command, &self.options)
    }

    /// Run several commands in one round trip
    pub fn pipeline(&self, commands: &[Command]) -> Result<Vec<Reply>> {
        self.pool.execute_batch(commands, &self.options)
    }

    /// Fetches a value by key; `None` when the key is missing
    pub fn get(&self, key: impl AsRef<[u8]>) -> Result<Option<Bytes>> {
        match self.command(&Command::new(["GET".as_bytes(), key.as_ref()]))? {
            Reply::Nil => Ok(None),
            Reply::Bulk(data) => Ok(Some(data)),
            other => Err(unexpected("GET", other)),
        }
    }

    /// Sets a value for a key
    pub fn set(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<()> {
        match self.command(&Command::new(["SET".as_bytes(), key.as_ref(), value.as_ref()]))? {
            Reply::Status(_) => Ok(()),
            other => Err(unexpected("SET", other)),
        }
    }

    /// Deletes a key. Returns true when a key was removed.
    pub fn del(&self, key: impl AsRef<[u8]>) -> Result<bool> {
        match self.command(&Command::new(["DEL".as_bytes(), key.as_ref()]))? {
            Reply::Integer(count) => Ok(count > 0),
            other => Err(unexpected("DEL", other)),
        }
    }

    pub fn exists(&self, key: impl AsRef<[u8]>) -> Result<bool> {
        match self.command(&Command::new(["EXISTS".as_bytes(), key.as_ref()]))? {
            Reply::Integer(count) => Ok(count > 0),
            other => Err(unexpected("EXISTS", other)),
        }
    }

    /// Increments an integer value, returning the new value
    pub fn incr(&self, key: impl AsRef<[u8]>) -> Result<i64> {
        match self.command(&Command::new(["INCR".as_bytes(), key.as_ref()]))? {
            Reply::Integer(value) => Ok(value),
            other => Err(unexpected("INCR", other)),
        }
    }

    /// Pings the server. Returns the raw response payload.
    pub fn ping(&self) -> Result<String> {
        match self.command(&Command::new(["PING"]))? {
            Reply::Status(text) => Ok(text),
            Reply::Bulk(data) => Ok(String::from_utf8_lossy(&data).into_owned()),
            other => Err(unexpected("PING", other)),
        }
    }

    /// Stop the underlying pool
    pub fn stop(&self) {
        self.pool.stop();
    }
}

fn unexpected(command: &str, reply: Reply) -> crate::StructuredError {
    // A reply of the wrong shape means the stream is out of sync with us.
    classify(Failure::Conn(ConnError::Protocol(format!(
        "unexpected reply to {}: {:?}",
        command, reply
    ))))
}
