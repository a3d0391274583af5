//! Helpers for reading and writing Record fields.

use kpack::Decoder;
use kpack::Encoder;

use crate::Message;
use crate::error::Error;
use crate::error::Result;

/// Writes one named field whose payload is produced by `write`.
pub(crate) fn field<F>(enc: &mut Encoder, name: &str, write: F) -> Result<()>
where
    F: FnOnce(&mut Encoder) -> Result<()>,
{
    enc.variant_begin(name)?;
    write(enc)?;
    enc.variant_end()?;
    Ok(())
}

pub(crate) fn str_field(enc: &mut Encoder, name: &str, v: &str) -> Result<()> {
    field(enc, name, |e| Ok(e.str(v)?))
}

pub(crate) fn u64_field(enc: &mut Encoder, name: &str, v: u64) -> Result<()> {
    field(enc, name, |e| Ok(e.u64(v)?))
}

pub(crate) fn bytes_field(enc: &mut Encoder, name: &str, v: &[u8]) -> Result<()> {
    field(enc, name, |e| Ok(e.bytes(v)?))
}

/// Writes `items` as a List of messages.
pub(crate) fn list_field<T: Message>(enc: &mut Encoder, name: &str, items: &[T]) -> Result<()> {
    field(enc, name, |e| {
        e.list_begin()?;
        for item in items {
            item.encode(e)?;
        }
        e.list_end()?;
        Ok(())
    })
}

pub(crate) fn strings_field(enc: &mut Encoder, name: &str, items: &[String]) -> Result<()> {
    field(enc, name, |e| {
        e.list_begin()?;
        for item in items {
            e.str(item)?;
        }
        e.list_end()?;
        Ok(())
    })
}

pub(crate) fn read_list<T: Message>(dec: &mut Decoder<'_>) -> Result<Vec<T>> {
    let mut list = dec.list()?;
    let mut out = Vec::new();
    while let Some(mut item) = list.next()? {
        out.push(T::decode(&mut item)?);
    }
    Ok(out)
}

pub(crate) fn read_strings(dec: &mut Decoder<'_>) -> Result<Vec<String>> {
    let mut list = dec.list()?;
    let mut out = Vec::new();
    while let Some(mut item) = list.next()? {
        out.push(item.str()?.to_owned());
    }
    Ok(out)
}

/// Unwraps a required field, naming it in the error.
pub(crate) fn required<T>(v: Option<T>, name: &'static str) -> Result<T> {
    v.ok_or(Error::MissingField(name))
}
