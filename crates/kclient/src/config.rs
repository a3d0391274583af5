//! # Client Configuration
//!
//! Where to connect and how long to wait. Values come from code through the
//! builder methods, or from `KRPC_*` environment variables.

use std::time::Duration;

use kproto::MAX_CLIENT_NAME_LEN;

use crate::error::Error;
use crate::error::Result;

pub const DEFAULT_ADDRESS: &str = "127.0.0.1";
pub const DEFAULT_RPC_PORT: u16 = 50000;
pub const DEFAULT_STREAM_PORT: u16 = 50001;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Shown by the server in its client list.
    pub name: String,
    pub address: String,
    pub rpc_port: u16,
    /// `0` opens no stream connection; streams are then unavailable.
    pub stream_port: u16,
    /// Bounds the TCP connect and each handshake.
    pub connect_timeout: Duration,
    /// Applied to every call unless the call sets its own.
    pub call_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            address: DEFAULT_ADDRESS.to_owned(),
            rpc_port: DEFAULT_RPC_PORT,
            stream_port: DEFAULT_STREAM_PORT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            call_timeout: None,
        }
    }
}

impl ClientConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn rpc_port(mut self, port: u16) -> Self {
        self.rpc_port = port;
        self
    }

    pub fn stream_port(mut self, port: u16) -> Self {
        self.stream_port = port;
        self
    }

    pub fn without_streams(self) -> Self {
        self.stream_port(0)
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    pub fn has_streams(&self) -> bool {
        self.stream_port != 0
    }

    /// Reads `KRPC_NAME`, `KRPC_ADDRESS`, `KRPC_RPC_PORT` and `KRPC_STREAM_PORT`
    /// over the defaults. Unset variables keep their default.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(name) = lookup("KRPC_NAME") {
            config.name = name;
        }
        if let Some(address) = lookup("KRPC_ADDRESS") {
            config.address = address;
        }
        if let Some(port) = lookup("KRPC_RPC_PORT") {
            config.rpc_port = parse_port("KRPC_RPC_PORT", &port)?;
        }
        if let Some(port) = lookup("KRPC_STREAM_PORT") {
            config.stream_port = parse_port("KRPC_STREAM_PORT", &port)?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.len() > MAX_CLIENT_NAME_LEN {
            return Err(Error::Config(format!(
                "client name is {} bytes, at most {} allowed",
                self.name.len(),
                MAX_CLIENT_NAME_LEN
            )));
        }
        if self.address.is_empty() {
            return Err(Error::Config("empty server address".into()));
        }
        if self.rpc_port == 0 {
            return Err(Error::Config("rpc port must not be 0".into()));
        }
        Ok(())
    }
}

fn parse_port(key: &str, value: &str) -> Result<u16> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} is not a port number: {:?}", key, value)))
}
