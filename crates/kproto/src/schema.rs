//! # Server Metadata
//!
//! What `KRPC.GetStatus` and `KRPC.GetServices` return. Service descriptions are
//! what proxy generators consume; the runtime itself only carries them.

use kpack::Decoder;
use kpack::Encoder;

use crate::Message;
use crate::error::Result;
use crate::fields::bytes_field;
use crate::fields::field;
use crate::fields::list_field;
use crate::fields::read_list;
use crate::fields::read_strings;
use crate::fields::required;
use crate::fields::str_field;
use crate::fields::strings_field;
use crate::fields::u64_field;

/// Server statistics and version.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Status {
    pub version: String,
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub rpcs_executed: u64,
    pub rpc_rate: f32,
    pub stream_rpcs: u64,
    pub stream_rpc_rate: f32,
    pub time_per_rpc_update: f32,
}

impl Message for Status {
    fn encode(&self, enc: &mut Encoder) -> Result<()> {
        enc.record_begin()?;
        str_field(enc, "version", &self.version)?;
        u64_field(enc, "bytes_read", self.bytes_read)?;
        u64_field(enc, "bytes_written", self.bytes_written)?;
        u64_field(enc, "rpcs_executed", self.rpcs_executed)?;
        field(enc, "rpc_rate", |e| Ok(e.f32(self.rpc_rate)?))?;
        u64_field(enc, "stream_rpcs", self.stream_rpcs)?;
        field(enc, "stream_rpc_rate", |e| Ok(e.f32(self.stream_rpc_rate)?))?;
        field(enc, "time_per_rpc_update", |e| Ok(e.f32(self.time_per_rpc_update)?))?;
        enc.record_end()?;
        Ok(())
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        let mut fields = dec.record()?;
        let mut status = Status::default();
        while let Some((key, mut val)) = fields.next()? {
            match key {
                "version" => status.version = val.str()?.to_owned(),
                "bytes_read" => status.bytes_read = val.u64()?,
                "bytes_written" => status.bytes_written = val.u64()?,
                "rpcs_executed" => status.rpcs_executed = val.u64()?,
                "rpc_rate" => status.rpc_rate = val.f32()?,
                "stream_rpcs" => status.stream_rpcs = val.u64()?,
                "stream_rpc_rate" => status.stream_rpc_rate = val.f32()?,
                "time_per_rpc_update" => status.time_per_rpc_update = val.f32()?,
                _ => val.skip()?,
            }
        }
        Ok(status)
    }
}

/// Every service the server exposes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Services {
    pub services: Vec<ServiceInfo>,
}

impl Services {
    pub fn find(&self, name: &str) -> Option<&ServiceInfo> {
        self.services.iter().find(|s| s.name == name)
    }
}

impl Message for Services {
    fn encode(&self, enc: &mut Encoder) -> Result<()> {
        enc.record_begin()?;
        list_field(enc, "services", &self.services)?;
        enc.record_end()?;
        Ok(())
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        let mut fields = dec.record()?;
        let mut services = Vec::new();
        while let Some((key, mut val)) = fields.next()? {
            match key {
                "services" => services = read_list(&mut val)?,
                _ => val.skip()?,
            }
        }
        Ok(Services { services })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceInfo {
    pub name: String,
    pub procedures: Vec<ProcedureInfo>,
    pub classes: Vec<String>,
    pub enumerations: Vec<EnumerationInfo>,
    pub exceptions: Vec<String>,
    pub documentation: String,
}

impl ServiceInfo {
    pub fn procedure(&self, name: &str) -> Option<&ProcedureInfo> {
        self.procedures.iter().find(|p| p.name == name)
    }
}

impl Message for ServiceInfo {
    fn encode(&self, enc: &mut Encoder) -> Result<()> {
        enc.record_begin()?;
        str_field(enc, "name", &self.name)?;
        list_field(enc, "procedures", &self.procedures)?;
        strings_field(enc, "classes", &self.classes)?;
        list_field(enc, "enumerations", &self.enumerations)?;
        strings_field(enc, "exceptions", &self.exceptions)?;
        str_field(enc, "documentation", &self.documentation)?;
        enc.record_end()?;
        Ok(())
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        let mut fields = dec.record()?;
        let mut name = None;
        let mut info = ServiceInfo::default();
        while let Some((key, mut val)) = fields.next()? {
            match key {
                "name" => name = Some(val.str()?.to_owned()),
                "procedures" => info.procedures = read_list(&mut val)?,
                "classes" => info.classes = read_strings(&mut val)?,
                "enumerations" => info.enumerations = read_list(&mut val)?,
                "exceptions" => info.exceptions = read_strings(&mut val)?,
                "documentation" => info.documentation = val.str()?.to_owned(),
                _ => val.skip()?,
            }
        }
        info.name = required(name, "name")?;
        Ok(info)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcedureInfo {
    pub name: String,
    pub parameters: Vec<ParameterInfo>,
    /// `None` for procedures without a return value.
    pub return_type: Option<String>,
    pub documentation: String,
}

impl Message for ProcedureInfo {
    fn encode(&self, enc: &mut Encoder) -> Result<()> {
        enc.record_begin()?;
        str_field(enc, "name", &self.name)?;
        list_field(enc, "parameters", &self.parameters)?;
        if let Some(ty) = &self.return_type {
            str_field(enc, "return_type", ty)?;
        }
        str_field(enc, "documentation", &self.documentation)?;
        enc.record_end()?;
        Ok(())
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        let mut fields = dec.record()?;
        let mut name = None;
        let mut info = ProcedureInfo::default();
        while let Some((key, mut val)) = fields.next()? {
            match key {
                "name" => name = Some(val.str()?.to_owned()),
                "parameters" => info.parameters = read_list(&mut val)?,
                "return_type" => info.return_type = Some(val.str()?.to_owned()),
                "documentation" => info.documentation = val.str()?.to_owned(),
                _ => val.skip()?,
            }
        }
        info.name = required(name, "name")?;
        Ok(info)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterInfo {
    pub name: String,
    pub type_name: String,
    /// Encoded default value, for optional parameters.
    pub default_value: Option<Vec<u8>>,
}

impl Message for ParameterInfo {
    fn encode(&self, enc: &mut Encoder) -> Result<()> {
        enc.record_begin()?;
        str_field(enc, "name", &self.name)?;
        str_field(enc, "type", &self.type_name)?;
        if let Some(default) = &self.default_value {
            bytes_field(enc, "default_value", default)?;
        }
        enc.record_end()?;
        Ok(())
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        let mut fields = dec.record()?;
        let mut info = ParameterInfo::default();
        while let Some((key, mut val)) = fields.next()? {
            match key {
                "name" => info.name = val.str()?.to_owned(),
                "type" => info.type_name = val.str()?.to_owned(),
                "default_value" => info.default_value = Some(val.bytes()?.to_vec()),
                _ => val.skip()?,
            }
        }
        Ok(info)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnumerationInfo {
    pub name: String,
    pub values: Vec<(String, i32)>,
}

impl Message for EnumerationInfo {
    fn encode(&self, enc: &mut Encoder) -> Result<()> {
        enc.record_begin()?;
        str_field(enc, "name", &self.name)?;
        field(enc, "values", |e| {
            e.dict_begin()?;
            for (name, value) in &self.values {
                e.str(name)?;
                e.s32(*value)?;
            }
            e.dict_end()?;
            Ok(())
        })?;
        enc.record_end()?;
        Ok(())
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        let mut fields = dec.record()?;
        let mut info = EnumerationInfo::default();
        while let Some((key, mut val)) = fields.next()? {
            match key {
                "name" => info.name = val.str()?.to_owned(),
                "values" => {
                    let mut dict = val.dict()?;
                    while let Some((mut k, mut v)) = dict.next()? {
                        info.values.push((k.str()?.to_owned(), v.s32()?));
                    }
                }
                _ => val.skip()?,
            }
        }
        Ok(info)
    }
}
