//! TCP protocol client
//!
//! Opens blocking TCP connections speaking RESP2 and performs the AUTH /
//! SELECT handshake the connection string asks for.

use std::io::{BufReader, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::config::{Endpoint, PoolConfig};

use super::resp::{encode_command, read_reply};
use super::{Command, ConnError, ProtocolClient, Reply};

/// Protocol client over TCP
#[derive(Debug, Clone, Default)]
pub struct RespClient {
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
}

impl RespClient {
    pub fn new(
        connect_timeout: Option<Duration>,
        read_timeout: Option<Duration>,
        write_timeout: Option<Duration>,
    ) -> Self {
        Self {
            connect_timeout,
            read_timeout,
            write_timeout,
        }
    }

    /// Take socket timeouts from a pool configuration
    pub fn from_config(config: &PoolConfig) -> Self {
        Self::new(
            config.connect_timeout(),
            config.read_timeout(),
            config.write_timeout(),
        )
    }

    fn connect_stream(&self, endpoint: &Endpoint) -> Result<TcpStream, ConnError> {
        let address = endpoint.address();
        let addrs: Vec<SocketAddr> = address
            .to_socket_addrs()
            .map_err(|e| ConnError::Resolve(format!("{}: {}", address, e)))?
            .collect();
        if addrs.is_empty() {
            return Err(ConnError::Resolve(address));
        }

        // Try each resolved address, keeping the last failure.
        let mut last_err = None;
        for addr in &addrs {
            let attempt = match self.connect_timeout {
                Some(timeout) => TcpStream::connect_timeout(addr, timeout),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(stream) => return Ok(stream),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.map(ConnError::Io).unwrap_or(ConnError::Resolve(address)))
    }
}

/// One open connection with reusable buffers
#[derive(Debug)]
pub struct RespConnection {
    // Buffered reader reduces syscalls while still allowing direct writes.
    reader: BufReader<TcpStream>,
    line_buf: Vec<u8>,
    write_buf: Vec<u8>,
    peer_addr: String,
}

impl RespConnection {
    fn new(stream: TcpStream) -> Self {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        Self {
            reader: BufReader::new(stream),
            line_buf: Vec::with_capacity(128),
            write_buf: Vec::with_capacity(256),
            peer_addr,
        }
    }

    /// Peer address string, for logging
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    fn flush_commands(&mut self) -> Result<(), ConnError> {
        let stream = self.reader.get_mut();
        stream.write_all(&self.write_buf)?;
        stream.flush()?;
        Ok(())
    }

    fn exec(&mut self, command: &Command) -> Result<Reply, ConnError> {
        self.write_buf.clear();
        encode_command(command, &mut self.write_buf);
        self.flush_commands()?;
        read_reply(&mut self.reader, &mut self.line_buf)
    }

    fn exec_batch(&mut self, commands: &[Command]) -> Result<Vec<Reply>, ConnError> {
        self.write_buf.clear();
        for command in commands {
            encode_command(command, &mut self.write_buf);
        }
        self.flush_commands()?;

        let mut replies = Vec::with_capacity(commands.len());
        for _ in commands {
            replies.push(read_reply(&mut self.reader, &mut self.line_buf)?);
        }
        Ok(replies)
    }

    fn handshake(&mut self, endpoint: &Endpoint) -> Result<(), ConnError> {
        if let Some(password) = &endpoint.password {
            let auth = match &endpoint.username {
                Some(username) => Command::new(["AUTH", username.as_str(), password.as_str()]),
                None => Command::new(["AUTH", password.as_str()]),
            };
            if let Reply::Error(message) = self.exec(&auth)? {
                return Err(ConnError::Auth(message));
            }
        }

        if endpoint.database != 0 {
            let select = Command::new(["SELECT".to_string(), endpoint.database.to_string()]);
            if let Reply::Error(message) = self.exec(&select)? {
                return Err(ConnError::Handshake(message));
            }
        }

        Ok(())
    }
}

impl ProtocolClient for RespClient {
    type Handle = RespConnection;

    fn open(&self, endpoint: &Endpoint) -> Result<RespConnection, ConnError> {
        let stream = self.connect_stream(endpoint)?;
        if let Some(timeout) = self.read_timeout {
            stream.set_read_timeout(Some(timeout))?;
        }
        if let Some(timeout) = self.write_timeout {
            stream.set_write_timeout(Some(timeout))?;
        }
        // Disable Nagle to keep request latency low for small payloads.
        stream.set_nodelay(true)?;

        let mut conn = RespConnection::new(stream);
        conn.handshake(endpoint)?;
        tracing::debug!("Connected to {}", conn.peer_addr);
        Ok(conn)
    }

    fn send(&self, handle: &mut RespConnection, command: &Command) -> Result<Reply, ConnError> {
        tracing::trace!("Sending {:?} to {}", command, handle.peer_addr);
        handle.exec(command)
    }

    fn send_batch(
        &self,
        handle: &mut RespConnection,
        commands: &[Command],
    ) -> Result<Vec<Reply>, ConnError> {
        tracing::trace!("Sending pipeline of {} to {}", commands.len(), handle.peer_addr);
        handle.exec_batch(commands)
    }

    fn close(&self, handle: RespConnection) {
        let stream = handle.reader.into_inner();
        let _ = stream.shutdown(std::net::Shutdown::Both);
        tracing::debug!("Closed connection to {}", handle.peer_addr);
    }
}
