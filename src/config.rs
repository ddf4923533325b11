//! Configuration for kvpool
//!
//! Pool configuration with sensible defaults, plus per-call execution options
//! and the parsed form of the connection string.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

/// Default number of workers in a pool
pub const DEFAULT_POOL_SIZE: usize = 10;

/// Default port for `redis://` URLs without an explicit port
pub const DEFAULT_PORT: u16 = 6379;

/// Errors raised while validating a [`PoolConfig`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("pool name is missing")]
    MissingName,

    #[error("connection url is missing")]
    MissingUrl,

    #[error("invalid connection url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("unsupported url scheme {0:?} (expected \"redis\")")]
    UnsupportedScheme(String),

    #[error("invalid database index {0:?}")]
    InvalidDatabase(String),

    #[error("pool size must be at least 1, got {0}")]
    InvalidPoolSize(usize),
}

/// Main configuration for a pool instance
///
/// Immutable once the pool has started.
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    // -------------------------------------------------------------------------
    // Identity
    // -------------------------------------------------------------------------
    /// Pool name, used in logs and thread names
    pub name: String,

    /// Connection string: `redis://[[user]:password@]host[:port][/db]`
    pub url: String,

    // -------------------------------------------------------------------------
    // Sizing
    // -------------------------------------------------------------------------
    /// Number of workers (one connection each)
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    // -------------------------------------------------------------------------
    // Health checks
    // -------------------------------------------------------------------------
    /// How often idle workers are probed (milliseconds, 0 disables the
    /// background monitor)
    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,

    // -------------------------------------------------------------------------
    // Socket timeouts (0 = none)
    // -------------------------------------------------------------------------
    /// TCP connect timeout (milliseconds)
    #[serde(default = "default_socket_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Socket read timeout (milliseconds)
    #[serde(default = "default_socket_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Socket write timeout (milliseconds)
    #[serde(default = "default_socket_timeout_ms")]
    pub write_timeout_ms: u64,
}

fn default_pool_size() -> usize {
    DEFAULT_POOL_SIZE
}

fn default_health_check_interval_ms() -> u64 {
    10_000
}

fn default_socket_timeout_ms() -> u64 {
    5_000
}

impl PoolConfig {
    /// Create a new config builder for the given name and connection string
    pub fn builder(name: impl Into<String>, url: impl Into<String>) -> ConfigBuilder {
        ConfigBuilder {
            config: PoolConfig {
                name: name.into(),
                url: url.into(),
                pool_size: DEFAULT_POOL_SIZE,
                health_check_interval_ms: default_health_check_interval_ms(),
                connect_timeout_ms: default_socket_timeout_ms(),
                read_timeout_ms: default_socket_timeout_ms(),
                write_timeout_ms: default_socket_timeout_ms(),
            },
        }
    }

    /// Validate the configuration and parse the endpoint.
    ///
    /// Runs before any worker is created.
    pub fn validate(&self) -> Result<Endpoint, ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::MissingName);
        }
        if self.url.trim().is_empty() {
            return Err(ConfigError::MissingUrl);
        }
        if self.pool_size == 0 {
            return Err(ConfigError::InvalidPoolSize(self.pool_size));
        }
        Endpoint::parse(&self.url)
    }

    /// Health check cadence, `None` when the background monitor is disabled
    pub fn health_check_interval(&self) -> Option<Duration> {
        millis(self.health_check_interval_ms)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        millis(self.write_timeout_ms)
    }
}

fn millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

/// Builder for PoolConfig
pub struct ConfigBuilder {
    config: PoolConfig,
}

impl ConfigBuilder {
    /// Set the number of workers
    pub fn pool_size(mut self, size: usize) -> Self {
        self.config.pool_size = size;
        self
    }

    /// Set the idle health check interval (in milliseconds, 0 disables)
    pub fn health_check_interval_ms(mut self, ms: u64) -> Self {
        self.config.health_check_interval_ms = ms;
        self
    }

    /// Set the connect timeout (in milliseconds)
    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.connect_timeout_ms = ms;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    pub fn build(self) -> PoolConfig {
        self.config
    }
}

/// Per-call options for the command executor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExecOptions {
    /// How long to wait for an idle worker (milliseconds)
    pub lease_timeout_ms: u64,

    /// How many times a transport fault is retried on a fresh lease
    pub retry_count: u32,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            lease_timeout_ms: 5_000,
            retry_count: 0,
        }
    }
}

impl ExecOptions {
    pub fn lease_timeout_ms(mut self, ms: u64) -> Self {
        self.lease_timeout_ms = ms;
        self
    }

    pub fn retry_count(mut self, count: u32) -> Self {
        self.retry_count = count;
        self
    }

    pub fn lease_timeout(&self) -> Duration {
        Duration::from_millis(self.lease_timeout_ms)
    }
}

/// Parsed connection string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: u32,
}

impl Endpoint {
    /// Parse `redis://[[user]:password@]host[:port][/db]`
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let url = Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;

        if url.scheme() != "redis" {
            return Err(ConfigError::UnsupportedScheme(url.scheme().to_string()));
        }

        let host = match url.host_str() {
            Some(host) if !host.is_empty() => host.trim_matches(|c| c == '[' || c == ']'),
            _ => {
                return Err(ConfigError::InvalidUrl {
                    url: raw.to_string(),
                    reason: "missing host".to_string(),
                })
            }
        };

        let username = Some(url.username())
            .filter(|user| !user.is_empty())
            .map(str::to_string);
        let password = url.password().map(str::to_string);

        let database = match url.path().trim_start_matches('/') {
            "" => 0,
            segment => segment
                .parse::<u32>()
                .map_err(|_| ConfigError::InvalidDatabase(segment.to_string()))?,
        };

        Ok(Self {
            host: host.to_string(),
            port: url.port().unwrap_or(DEFAULT_PORT),
            username,
            password,
            database,
        })
    }

    /// `host:port` suitable for socket address resolution
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}
