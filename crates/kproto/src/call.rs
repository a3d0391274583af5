//! # Procedure Calls
//!
//! The request/response envelope of the RPC channel.
//!
//! ## Invariants
//! - A `ProcedureCall` is immutable once built. Its arguments are already encoded,
//!   so the same call can be sent many times (directly, or as a stream registration).
//! - Argument positions match the remote procedure's declared parameter order.

use kpack::Decoder;
use kpack::Encoder;

use crate::Message;
use crate::error::Error;
use crate::error::Result;
use crate::fields::bytes_field;
use crate::fields::field;
use crate::fields::list_field;
use crate::fields::read_list;
use crate::fields::required;
use crate::fields::str_field;

/// One pre-encoded argument of a call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Argument {
    pub position: u32,
    /// A single encoded `kpack` item.
    pub value: Vec<u8>,
}

/// An immutable call descriptor: service, procedure, ordered encoded arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProcedureCall {
    service: String,
    procedure: String,
    arguments: Vec<Argument>,
}

impl ProcedureCall {
    /// Builds a call, assigning positions in the order the arguments are given.
    pub fn new(
        service: impl Into<String>,
        procedure: impl Into<String>,
        args: impl IntoIterator<Item = Vec<u8>>,
    ) -> Self {
        let arguments = args
            .into_iter()
            .enumerate()
            .map(|(i, value)| Argument { position: i as u32, value })
            .collect();
        Self {
            service: service.into(),
            procedure: procedure.into(),
            arguments,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn procedure(&self) -> &str {
        &self.procedure
    }

    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    /// Returns the encoded argument at `position`, if present.
    pub fn argument(&self, position: u32) -> Option<&[u8]> {
        self.arguments
            .iter()
            .find(|a| a.position == position)
            .map(|a| a.value.as_slice())
    }
}

impl Message for Argument {
    fn encode(&self, enc: &mut Encoder) -> Result<()> {
        enc.record_begin()?;
        field(enc, "position", |e| Ok(e.u32(self.position)?))?;
        bytes_field(enc, "value", &self.value)?;
        enc.record_end()?;
        Ok(())
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        let mut fields = dec.record()?;
        let mut position = None;
        let mut value = None;
        while let Some((key, mut val)) = fields.next()? {
            match key {
                "position" => position = Some(val.u32()?),
                "value" => value = Some(val.bytes()?.to_vec()),
                _ => val.skip()?,
            }
        }
        Ok(Argument {
            position: required(position, "position")?,
            value: required(value, "value")?,
        })
    }
}

impl Message for ProcedureCall {
    fn encode(&self, enc: &mut Encoder) -> Result<()> {
        enc.record_begin()?;
        str_field(enc, "service", &self.service)?;
        str_field(enc, "procedure", &self.procedure)?;
        list_field(enc, "arguments", &self.arguments)?;
        enc.record_end()?;
        Ok(())
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        let mut fields = dec.record()?;
        let mut service = None;
        let mut procedure = None;
        let mut arguments = Vec::new();
        while let Some((key, mut val)) = fields.next()? {
            match key {
                "service" => service = Some(val.str()?.to_owned()),
                "procedure" => procedure = Some(val.str()?.to_owned()),
                "arguments" => arguments = read_list(&mut val)?,
                _ => val.skip()?,
            }
        }
        Ok(ProcedureCall {
            service: required(service, "service")?,
            procedure: required(procedure, "procedure")?,
            arguments,
        })
    }
}

/// A batch of calls sent in one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub calls: Vec<ProcedureCall>,
}

impl Request {
    pub fn new(calls: Vec<ProcedureCall>) -> Self {
        Self { calls }
    }

    /// Encodes a request frame straight from borrowed calls.
    pub fn encode_calls(calls: &[ProcedureCall]) -> Result<Vec<u8>> {
        let mut enc = Encoder::new();
        write_request(&mut enc, calls)?;
        Ok(enc.into_bytes()?)
    }
}

fn write_request(enc: &mut Encoder, calls: &[ProcedureCall]) -> Result<()> {
    enc.record_begin()?;
    list_field(enc, "calls", calls)?;
    enc.record_end()?;
    Ok(())
}

impl Message for Request {
    fn encode(&self, enc: &mut Encoder) -> Result<()> {
        write_request(enc, &self.calls)
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        let mut fields = dec.record()?;
        let mut calls = Vec::new();
        while let Some((key, mut val)) = fields.next()? {
            match key {
                "calls" => calls = read_list(&mut val)?,
                _ => val.skip()?,
            }
        }
        Ok(Request { calls })
    }
}

/// A fault reported by the server.
///
/// `service` and `name` identify the exception type so the client can map it
/// to a typed error; `description` is the human readable message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fault {
    pub service: String,
    pub name: String,
    pub description: String,
    pub stack_trace: String,
}

impl Fault {
    /// A fault with no exception type, only a message.
    pub fn message(description: impl Into<String>) -> Self {
        Self { description: description.into(), ..Self::default() }
    }

    /// A fault naming a service exception type.
    pub fn typed(
        service: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            name: name.into(),
            description: description.into(),
            stack_trace: String::new(),
        }
    }
}

impl Message for Fault {
    fn encode(&self, enc: &mut Encoder) -> Result<()> {
        enc.record_begin()?;
        str_field(enc, "service", &self.service)?;
        str_field(enc, "name", &self.name)?;
        str_field(enc, "description", &self.description)?;
        if !self.stack_trace.is_empty() {
            str_field(enc, "stack_trace", &self.stack_trace)?;
        }
        enc.record_end()?;
        Ok(())
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        let mut fields = dec.record()?;
        let mut fault = Fault::default();
        while let Some((key, mut val)) = fields.next()? {
            match key {
                "service" => fault.service = val.str()?.to_owned(),
                "name" => fault.name = val.str()?.to_owned(),
                "description" => fault.description = val.str()?.to_owned(),
                "stack_trace" => fault.stack_trace = val.str()?.to_owned(),
                _ => val.skip()?,
            }
        }
        Ok(fault)
    }
}

/// The outcome of one procedure call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcedureResult(pub std::result::Result<Vec<u8>, Fault>);

impl ProcedureResult {
    pub fn value(bytes: Vec<u8>) -> Self {
        Self(Ok(bytes))
    }

    pub fn fault(fault: Fault) -> Self {
        Self(Err(fault))
    }
}

impl Message for ProcedureResult {
    fn encode(&self, enc: &mut Encoder) -> Result<()> {
        enc.record_begin()?;
        match &self.0 {
            Ok(bytes) => bytes_field(enc, "value", bytes)?,
            Err(fault) => field(enc, "error", |e| fault.encode(e))?,
        }
        enc.record_end()?;
        Ok(())
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        let mut fields = dec.record()?;
        let mut outcome = None;
        while let Some((key, mut val)) = fields.next()? {
            match key {
                "value" => outcome = Some(Ok(val.bytes()?.to_vec())),
                "error" => outcome = Some(Err(Fault::decode(&mut val)?)),
                _ => val.skip()?,
            }
        }
        // A procedure without a return value still answers with an empty value.
        Ok(ProcedureResult(outcome.unwrap_or_else(|| Ok(Vec::new()))))
    }
}

/// The answer to a `Request`.
///
/// `error` is set when the request as a whole could not be processed; otherwise
/// `results` holds one entry per call, in call order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub error: Option<Fault>,
    pub results: Vec<ProcedureResult>,
}

impl Response {
    pub fn with_results(results: Vec<ProcedureResult>) -> Self {
        Self { error: None, results }
    }

    pub fn with_error(fault: Fault) -> Self {
        Self { error: Some(fault), results: Vec::new() }
    }

    /// Checks the response answers `calls` calls and no more.
    pub fn expect_results(&self, calls: usize) -> Result<()> {
        if self.error.is_none() && self.results.len() != calls {
            return Err(Error::ProtocolViolation(format!(
                "expected {} results, got {}",
                calls,
                self.results.len()
            )));
        }
        Ok(())
    }
}

impl Message for Response {
    fn encode(&self, enc: &mut Encoder) -> Result<()> {
        enc.record_begin()?;
        if let Some(fault) = &self.error {
            field(enc, "error", |e| fault.encode(e))?;
        }
        list_field(enc, "results", &self.results)?;
        enc.record_end()?;
        Ok(())
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        let mut fields = dec.record()?;
        let mut response = Response::default();
        while let Some((key, mut val)) = fields.next()? {
            match key {
                "error" => response.error = Some(Fault::decode(&mut val)?),
                "results" => response.results = read_list(&mut val)?,
                _ => val.skip()?,
            }
        }
        Ok(response)
    }
}
