//! # kproto
//!
//! The messages exchanged between a client and the server, and the frame
//! header that delimits them on a byte stream.
//!
//! ## Architecture
//!
//! Every message is a `kpack` Record of named fields. Decoders skip fields they
//! do not know, so newer servers can add fields without breaking older clients.
//! Procedure arguments and results are opaque, pre-encoded `kpack` items: this
//! crate moves them around but never interprets them.
//!
//! - RPC channel: client sends `Request`, server answers `Response` in order.
//! - Stream channel: server pushes `StreamUpdate`.
//! - Both channels open with `ConnectionRequest` / `ConnectionResponse`.

use kpack::Decoder;
use kpack::Encoder;

mod call;
mod error;
mod fields;
pub mod frame;
mod handshake;
mod schema;
mod stream;

#[cfg(test)]
mod tests;

pub use call::Argument;
pub use call::Fault;
pub use call::ProcedureCall;
pub use call::ProcedureResult;
pub use call::Request;
pub use call::Response;
pub use error::Error;
pub use error::Result;
pub use handshake::ConnectionKind;
pub use handshake::ConnectionRequest;
pub use handshake::ConnectionResponse;
pub use handshake::ConnectionStatus;
pub use handshake::MAX_CLIENT_NAME_LEN;
pub use schema::EnumerationInfo;
pub use schema::ParameterInfo;
pub use schema::ProcedureInfo;
pub use schema::ServiceInfo;
pub use schema::Services;
pub use schema::Status;
pub use stream::EventInfo;
pub use stream::StreamInfo;
pub use stream::StreamResult;
pub use stream::StreamUpdate;

/// A protocol message with a canonical `kpack` encoding.
pub trait Message: Sized {
    /// Writes the message as a single item.
    fn encode(&self, enc: &mut Encoder) -> Result<()>;

    /// Reads a single message item.
    fn decode(dec: &mut Decoder<'_>) -> Result<Self>;

    /// Encodes the message into a standalone buffer.
    fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut enc = Encoder::new();
        self.encode(&mut enc)?;
        Ok(enc.into_bytes()?)
    }

    /// Decodes a standalone buffer. Trailing bytes are an error.
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut dec = Decoder::new(bytes);
        let msg = Self::decode(&mut dec)?;
        dec.finish()?;
        Ok(msg)
    }
}
