//! # Error Definitions
//!
//! Failures while building or parsing protocol messages.

use kpack::Error as WireError;

/// Operational failures within the protocol layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The underlying wire encoding failed.
    Wire(WireError),
    /// A record was missing a required field.
    MissingField(&'static str),
    /// An unknown enum variant or status was encountered.
    UnknownVariant(String),
    /// The structure of the message was malformed.
    ProtocolViolation(String),
    /// A frame header announced more bytes than `frame::MAX_FRAME_LEN`.
    FrameTooLarge(usize),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Wire(e) => write!(f, "wire error: {}", e),
            Self::MissingField(name) => write!(f, "missing field '{}'", name),
            Self::UnknownVariant(v) => write!(f, "unknown variant '{}'", v),
            Self::ProtocolViolation(msg) => write!(f, "protocol violation: {}", msg),
            Self::FrameTooLarge(n) => write!(f, "frame of {} bytes exceeds limit", n),
        }
    }
}

impl std::error::Error for Error {}

impl From<WireError> for Error {
    fn from(e: WireError) -> Self { Self::Wire(e) }
}

/// A specialized Result type for protocol operations.
pub type Result<T> = std::result::Result<T, Error>;
