//! # Stream Messages
//!
//! Push updates sent on the stream channel, and the identifiers the server hands
//! out when a stream or event is registered.

use kpack::Decoder;
use kpack::Encoder;

use crate::Message;
use crate::call::ProcedureResult;
use crate::error::Result;
use crate::fields::field;
use crate::fields::list_field;
use crate::fields::read_list;
use crate::fields::required;
use crate::fields::u64_field;

/// The latest result of one subscribed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamResult {
    pub id: u64,
    pub result: ProcedureResult,
}

impl Message for StreamResult {
    fn encode(&self, enc: &mut Encoder) -> Result<()> {
        enc.record_begin()?;
        u64_field(enc, "id", self.id)?;
        field(enc, "result", |e| self.result.encode(e))?;
        enc.record_end()?;
        Ok(())
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        let mut fields = dec.record()?;
        let mut id = None;
        let mut result = None;
        while let Some((key, mut val)) = fields.next()? {
            match key {
                "id" => id = Some(val.u64()?),
                "result" => result = Some(ProcedureResult::decode(&mut val)?),
                _ => val.skip()?,
            }
        }
        Ok(StreamResult {
            id: required(id, "id")?,
            result: required(result, "result")?,
        })
    }
}

/// One push message on the stream channel.
///
/// Results for different ids carry no ordering guarantee relative to each other.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamUpdate {
    pub results: Vec<StreamResult>,
}

impl StreamUpdate {
    /// Decodes an update frame result by result.
    ///
    /// The frame envelope must be well formed, but a malformed result only
    /// poisons its own entry, so the other subscriptions still get their values.
    pub fn decode_each(bytes: &[u8]) -> Result<Vec<Result<StreamResult>>> {
        let mut dec = Decoder::new(bytes);
        let mut fields = dec.record()?;
        let mut out = Vec::new();
        while let Some((key, mut val)) = fields.next()? {
            match key {
                "results" => {
                    let mut list = val.list()?;
                    while let Some(mut item) = list.next()? {
                        out.push(StreamResult::decode(&mut item));
                    }
                }
                _ => val.skip()?,
            }
        }
        dec.finish()?;
        Ok(out)
    }
}

impl Message for StreamUpdate {
    fn encode(&self, enc: &mut Encoder) -> Result<()> {
        enc.record_begin()?;
        list_field(enc, "results", &self.results)?;
        enc.record_end()?;
        Ok(())
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        let mut fields = dec.record()?;
        let mut results = Vec::new();
        while let Some((key, mut val)) = fields.next()? {
            match key {
                "results" => results = read_list(&mut val)?,
                _ => val.skip()?,
            }
        }
        Ok(StreamUpdate { results })
    }
}

/// The server's handle for a registered stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamInfo {
    pub id: u64,
}

impl Message for StreamInfo {
    fn encode(&self, enc: &mut Encoder) -> Result<()> {
        enc.record_begin()?;
        u64_field(enc, "id", self.id)?;
        enc.record_end()?;
        Ok(())
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        let mut fields = dec.record()?;
        let mut id = None;
        while let Some((key, mut val)) = fields.next()? {
            match key {
                "id" => id = Some(val.u64()?),
                _ => val.skip()?,
            }
        }
        Ok(StreamInfo { id: required(id, "id")? })
    }
}

/// The server's handle for an event: a boolean stream that fires when true.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventInfo {
    pub stream: StreamInfo,
}

impl Message for EventInfo {
    fn encode(&self, enc: &mut Encoder) -> Result<()> {
        enc.record_begin()?;
        field(enc, "stream", |e| self.stream.encode(e))?;
        enc.record_end()?;
        Ok(())
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        let mut fields = dec.record()?;
        let mut stream = None;
        while let Some((key, mut val)) = fields.next()? {
            match key {
                "stream" => stream = Some(StreamInfo::decode(&mut val)?),
                _ => val.skip()?,
            }
        }
        Ok(EventInfo { stream: required(stream, "stream")? })
    }
}
