//! # Connection Handshake
//!
//! The first message on each channel. The RPC channel introduces the client by
//! name and receives an identifier; the stream channel presents that identifier
//! so the server can route a client's push updates to it.

use kpack::Decoder;
use kpack::Encoder;

use crate::Message;
use crate::error::Error;
use crate::error::Result;
use crate::fields::bytes_field;
use crate::fields::field;
use crate::fields::required;
use crate::fields::str_field;

/// Client names longer than this (in UTF-8 bytes) are rejected.
pub const MAX_CLIENT_NAME_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionKind {
    Rpc,
    Stream,
}

impl ConnectionKind {
    fn as_tag(self) -> &'static str {
        match self {
            Self::Rpc => "Rpc",
            Self::Stream => "Stream",
        }
    }

    fn from_tag(tag: &str) -> Result<Self> {
        match tag {
            "Rpc" => Ok(Self::Rpc),
            "Stream" => Ok(Self::Stream),
            other => Err(Error::UnknownVariant(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Ok,
    MalformedMessage,
    Timeout,
    WrongType,
}

impl ConnectionStatus {
    fn as_tag(self) -> &'static str {
        match self {
            Self::Ok => "Ok",
            Self::MalformedMessage => "MalformedMessage",
            Self::Timeout => "Timeout",
            Self::WrongType => "WrongType",
        }
    }

    fn from_tag(tag: &str) -> Result<Self> {
        match tag {
            "Ok" => Ok(Self::Ok),
            "MalformedMessage" => Ok(Self::MalformedMessage),
            "Timeout" => Ok(Self::Timeout),
            "WrongType" => Ok(Self::WrongType),
            other => Err(Error::UnknownVariant(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRequest {
    pub kind: ConnectionKind,
    /// Only meaningful on the RPC channel.
    pub client_name: String,
    /// Only meaningful on the stream channel.
    pub client_identifier: Vec<u8>,
}

impl ConnectionRequest {
    pub fn rpc(client_name: impl Into<String>) -> Self {
        Self {
            kind: ConnectionKind::Rpc,
            client_name: client_name.into(),
            client_identifier: Vec::new(),
        }
    }

    pub fn stream(client_identifier: Vec<u8>) -> Self {
        Self {
            kind: ConnectionKind::Stream,
            client_name: String::new(),
            client_identifier,
        }
    }
}

impl Message for ConnectionRequest {
    fn encode(&self, enc: &mut Encoder) -> Result<()> {
        enc.record_begin()?;
        field(enc, "kind", |e| encode_unit_variant(e, self.kind.as_tag()))?;
        str_field(enc, "client_name", &self.client_name)?;
        bytes_field(enc, "client_identifier", &self.client_identifier)?;
        enc.record_end()?;
        Ok(())
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        let mut fields = dec.record()?;
        let mut kind = None;
        let mut client_name = String::new();
        let mut client_identifier = Vec::new();
        while let Some((key, mut val)) = fields.next()? {
            match key {
                "kind" => kind = Some(ConnectionKind::from_tag(decode_unit_variant(&mut val)?)?),
                "client_name" => client_name = val.str()?.to_owned(),
                "client_identifier" => client_identifier = val.bytes()?.to_vec(),
                _ => val.skip()?,
            }
        }
        Ok(ConnectionRequest {
            kind: required(kind, "kind")?,
            client_name,
            client_identifier,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionResponse {
    pub status: ConnectionStatus,
    pub message: String,
    pub client_identifier: Vec<u8>,
}

impl ConnectionResponse {
    pub fn ok(client_identifier: Vec<u8>) -> Self {
        Self {
            status: ConnectionStatus::Ok,
            message: String::new(),
            client_identifier,
        }
    }

    pub fn rejected(status: ConnectionStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            client_identifier: Vec::new(),
        }
    }
}

impl Message for ConnectionResponse {
    fn encode(&self, enc: &mut Encoder) -> Result<()> {
        enc.record_begin()?;
        field(enc, "status", |e| encode_unit_variant(e, self.status.as_tag()))?;
        str_field(enc, "message", &self.message)?;
        bytes_field(enc, "client_identifier", &self.client_identifier)?;
        enc.record_end()?;
        Ok(())
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        let mut fields = dec.record()?;
        let mut status = None;
        let mut message = String::new();
        let mut client_identifier = Vec::new();
        while let Some((key, mut val)) = fields.next()? {
            match key {
                "status" => status = Some(ConnectionStatus::from_tag(decode_unit_variant(&mut val)?)?),
                "message" => message = val.str()?.to_owned(),
                "client_identifier" => client_identifier = val.bytes()?.to_vec(),
                _ => val.skip()?,
            }
        }
        Ok(ConnectionResponse {
            status: required(status, "status")?,
            message,
            client_identifier,
        })
    }
}

/// Encode a unit variant (variant with no payload).
fn encode_unit_variant(enc: &mut Encoder, tag: &str) -> Result<()> {
    enc.variant_begin(tag)?;
    enc.unit()?;
    enc.variant_end()?;
    Ok(())
}

/// Decode a unit variant and return its tag.
fn decode_unit_variant<'a>(dec: &mut Decoder<'a>) -> Result<&'a str> {
    let (tag, mut body) = dec.variant()?;
    body.unit()?;
    Ok(tag)
}
