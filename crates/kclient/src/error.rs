//! # Client Errors
//!
//! One error type for every operation of the runtime. Server faults arrive as
//! `Error::Rpc`, carrying a typed payload when the fault's exception type was
//! registered on the connection.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use kproto::Fault;

use crate::transport;

#[derive(Debug, Clone)]
pub enum Error {
    /// A value did not have the expected wire shape.
    Encoding(EncodingError),
    /// A frame on one of the channels could not be understood.
    Protocol(kproto::Error),
    Transport(transport::Error),
    /// The connection could not be established.
    Connection(String),
    /// Invalid client configuration.
    Config(String),
    /// A procedure failed on the server.
    Rpc(RpcError),
    Stream(StreamError),
    Timeout,
    /// The connection is closed; no further calls can complete.
    Disconnected,
}

impl Error {
    /// True when a stream handle can no longer produce values.
    pub fn is_stream_invalid(&self) -> bool {
        matches!(self, Self::Stream(_))
    }

    /// True when the failure was caused by the connection going away.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Stream(StreamError::Disconnected))
    }

    pub fn rpc(&self) -> Option<&RpcError> {
        match self {
            Self::Rpc(e) => Some(e),
            _ => None,
        }
    }

    /// Shortcut for `self.rpc()` followed by `RpcError::downcast_ref`.
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.rpc().and_then(|e| e.downcast_ref::<E>())
    }

    /// Names the type being decoded on an encoding error that has none yet.
    pub(crate) fn expecting(self, ty: &'static str) -> Self {
        match self {
            Self::Encoding(mut e) if e.expected.is_empty() => {
                e.expected = ty;
                Self::Encoding(e)
            }
            other => other,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encoding(e) => write!(f, "Encoding error: {}", e),
            Self::Protocol(e) => write!(f, "Protocol error: {}", e),
            Self::Transport(e) => write!(f, "Transport error: {}", e),
            Self::Connection(msg) => write!(f, "Connection error: {}", msg),
            Self::Config(msg) => write!(f, "Invalid configuration: {}", msg),
            Self::Rpc(e) => write!(f, "RPC error: {}", e),
            Self::Stream(e) => write!(f, "Stream error: {}", e),
            Self::Timeout => write!(f, "Operation timed out"),
            Self::Disconnected => write!(f, "Connection closed"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Encoding(e) => Some(e),
            Self::Protocol(e) => Some(e),
            Self::Transport(e) => Some(e),
            Self::Rpc(e) => Some(e),
            Self::Stream(e) => Some(e),
            _ => None,
        }
    }
}

impl From<transport::Error> for Error {
    fn from(e: transport::Error) -> Self {
        Self::Transport(e)
    }
}

impl From<kproto::Error> for Error {
    fn from(e: kproto::Error) -> Self {
        Self::Protocol(e)
    }
}

impl From<kpack::Error> for Error {
    fn from(e: kpack::Error) -> Self {
        Self::Encoding(EncodingError::new(EncodingErrorKind::Wire(e)))
    }
}

impl From<EncodingError> for Error {
    fn from(e: EncodingError) -> Self {
        Self::Encoding(e)
    }
}

impl From<StreamError> for Error {
    fn from(e: StreamError) -> Self {
        Self::Stream(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A value could not be encoded or decoded as the requested type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingError {
    /// The Rust type being decoded, empty when unknown.
    pub expected: &'static str,
    pub kind: EncodingErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodingErrorKind {
    Wire(kpack::Error),
    Message(kproto::Error),
    /// Object id 0 where a non-optional object was required.
    NullObject,
    UnknownEnumValue(i32),
    /// A list had more or fewer items than the tuple it decodes into.
    Arity { expected: usize, found: usize },
    /// A set or dictionary repeated a key.
    DuplicateEntry,
}

impl EncodingError {
    pub fn new(kind: EncodingErrorKind) -> Self {
        Self { expected: "", kind }
    }

    pub fn of(expected: &'static str, kind: EncodingErrorKind) -> Self {
        Self { expected, kind }
    }
}

impl fmt::Display for EncodingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.expected.is_empty() {
            write!(f, "cannot decode {}: ", self.expected)?;
        }
        match &self.kind {
            EncodingErrorKind::Wire(e) => write!(f, "{}", e),
            EncodingErrorKind::Message(e) => write!(f, "{}", e),
            EncodingErrorKind::NullObject => write!(f, "null object reference"),
            EncodingErrorKind::UnknownEnumValue(v) => write!(f, "unknown enumeration value {}", v),
            EncodingErrorKind::Arity { expected, found } => {
                write!(f, "expected {} items, found {}", expected, found)
            }
            EncodingErrorKind::DuplicateEntry => write!(f, "duplicate entry"),
        }
    }
}

impl StdError for EncodingError {}

/// A fault raised by a remote procedure.
///
/// When the fault's exception type was registered on the connection, the typed
/// error built by the registered factory is available through `downcast_ref`.
#[derive(Clone)]
pub struct RpcError {
    fault: Fault,
    typed: Option<Arc<dyn StdError + Send + Sync>>,
}

impl RpcError {
    pub(crate) fn new(fault: Fault, typed: Option<Arc<dyn StdError + Send + Sync>>) -> Self {
        Self { fault, typed }
    }

    /// Service declaring the exception type, empty for untyped faults.
    pub fn service(&self) -> &str {
        &self.fault.service
    }

    /// Exception type name, empty for untyped faults.
    pub fn name(&self) -> &str {
        &self.fault.name
    }

    pub fn message(&self) -> &str {
        &self.fault.description
    }

    pub fn stack_trace(&self) -> &str {
        &self.fault.stack_trace
    }

    pub fn fault(&self) -> &Fault {
        &self.fault
    }

    pub fn is_typed(&self) -> bool {
        self.typed.is_some()
    }

    pub fn is<E: StdError + 'static>(&self) -> bool {
        self.downcast_ref::<E>().is_some()
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.typed.as_deref().and_then(|e| e.downcast_ref::<E>())
    }
}

impl fmt::Debug for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcError")
            .field("service", &self.fault.service)
            .field("name", &self.fault.name)
            .field("message", &self.fault.description)
            .field("typed", &self.typed.is_some())
            .finish()
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.fault.name.is_empty() {
            write!(f, "{}", self.fault.description)
        } else {
            write!(f, "{}.{}: {}", self.fault.service, self.fault.name, self.fault.description)
        }
    }
}

impl StdError for RpcError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.typed.as_deref().map(|e| e as &(dyn StdError + 'static))
    }
}

/// Why a stream handle stopped producing values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamError {
    /// The stream was removed.
    Removed,
    /// The stream connection closed.
    Disconnected,
    /// The client was opened without a stream connection.
    Unavailable,
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Removed => write!(f, "Stream does not exist or was removed"),
            Self::Disconnected => write!(f, "Stream connection closed"),
            Self::Unavailable => write!(f, "Client has no stream connection"),
        }
    }
}

impl StdError for StreamError {}
