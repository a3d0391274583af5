//! # Transport Abstraction
//!
//! A minimal async interface for moving framed messages between the client and
//! the server. Each connection has one transport per channel.
//!
//! ## Philosophy
//!
//! - **Message-Oriented**: `send` and `recv` move whole payloads. Framing, if the
//!   medium needs it, is the transport's business.
//! - **Content-Blind**: A transport never looks inside a payload.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The peer is unreachable or the connection was dropped.
    ConnectionLost(String),
    /// The operation timed out.
    Timeout,
    /// The payload exceeds what the transport can carry.
    PayloadTooLarge(usize),
    /// Generic I/O error or internal transport failure.
    Io(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionLost(msg) => write!(f, "Connection lost: {}", msg),
            Self::Timeout => write!(f, "Transport timed out"),
            Self::PayloadTooLarge(len) => write!(f, "Payload of {} bytes too large for transport", len),
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// A bidirectional message channel.
///
/// Object-safe, so connections hold it as `Arc<dyn Transport>`.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Sends one message.
    ///
    /// Concurrent sends must not interleave: each payload arrives whole.
    async fn send(&self, payload: &[u8]) -> Result<()>;

    /// Receives the next message, or `None` once the peer closed the channel.
    async fn recv(&self) -> Result<Option<Vec<u8>>>;

    /// Closes the channel. Later sends fail; the peer observes end of stream.
    async fn close(&self);
}
