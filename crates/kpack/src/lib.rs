//! # kpack
//!
//! The bounded, schema-agnostic wire format carried inside every RPC frame.
//!
//! ## Philosophy
//!
//! - **Explicit State**: Encoders track open containers on a stack. There are no hidden buffers.
//! - **TLV Architecture**: `[Tag][Length?][Value]` so unknown items can be skipped safely.
//! - **Bounded**: Decoders are zero-copy, bounds-checked views. Nothing panics on bad input.
//!
//! ## Format
//!
//! - **Scalars**: `[Tag: 1b][Data: N]`
//! - **Object references**: `[Tag: 1b][Id: 8b]`, id `0` is the null reference
//! - **Blobs**: `[Tag: 1b][Len: 4b][Data: Len]`
//! - **Containers**: `[Tag: 1b][Len: 4b][Body: Len]`
//!
//! All integers are Little-Endian.

#[cfg(test)]
mod tests;

/// Wire format serialization and deserialization errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Byte does not correspond to a valid `Tag`.
    InvalidTag(u8),
    /// A valid tag was read, but not the one the caller asked for.
    TagMismatch { expected: Tag, found: Tag },
    /// String data is not valid UTF-8.
    InvalidUtf8,
    /// Closing a scope that does not match the active scope stack.
    ScopeMismatch { expected: Scope, actual: Scope },
    /// Attempted to close a scope when only the Root remains.
    ScopeUnderflow,
    /// Attempted to finalize the buffer with open scopes.
    ScopeStillOpen,
    /// Buffer exhausted while reading.
    UnexpectedEnd,
    /// Bytes were left over after the value was fully read.
    TrailingBytes(usize),
    /// Blob or container length exceeds `u32::MAX`.
    BlobTooLarge(usize),
    /// Attempted to write more than one item into an Option or Variant.
    TooManyItems(Scope),
    /// Attempted to close an Option or Variant without its payload.
    EmptyAdt(Scope),
    /// Attempted to write something other than a named field into a Record.
    InvalidRecordEntry,
    /// A Dict was closed (or read) with a key that has no value.
    UnpairedDictEntry,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidTag(b) => write!(f, "invalid tag byte {:#04x}", b),
            Error::TagMismatch { expected, found } => {
                write!(f, "expected {:?}, found {:?}", expected, found)
            }
            Error::ScopeMismatch { expected, actual } => {
                write!(f, "scope mismatch: expected {:?}, found {:?}", expected, actual)
            }
            Error::TrailingBytes(n) => write!(f, "{} trailing bytes after value", n),
            Error::TooManyItems(s) => write!(f, "too many items in scope {:?}; expected exactly 1", s),
            Error::EmptyAdt(s) => write!(f, "empty scope {:?}; expected exactly 1 item", s),
            _ => write!(f, "{:?}", self),
        }
    }
}

impl std::error::Error for Error {}

/// Specialized `Result` for wire operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Identifies the type of the encoded value.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    /// Padding (Skip).
    Pad = 0x00,

    // Fixed-width scalars
    BoolTrue = 0x01,
    BoolFalse = 0x02,
    U8 = 0x03,
    U16 = 0x04,
    U32 = 0x05,
    U64 = 0x06,
    S8 = 0x07,
    S16 = 0x08,
    S32 = 0x09,
    S64 = 0x0A,
    F32 = 0x0B,
    F64 = 0x0C,

    // Unit / Void
    Unit = 0x0E,
    OptionNone = 0x0F,

    // Blobs (Tag + u32 Len + Bytes)
    String = 0x10,
    Bytes = 0x11,

    // Remote object id (Tag + u64)
    Object = 0x12,

    // Containers (Tag + u32 Len + Body)
    List = 0x20,
    Dict = 0x21,
    Set = 0x22,
    Record = 0x23,

    // ADTs (Tag + u32 Len + Body)
    OptionSome = 0x30,
    Variant = 0x33,
}

impl Tag {
    /// Returns the Tag variant for a given byte, or `None` if invalid.
    pub fn from_u8(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(Tag::Pad),
            0x01 => Some(Tag::BoolTrue),
            0x02 => Some(Tag::BoolFalse),
            0x03 => Some(Tag::U8),
            0x04 => Some(Tag::U16),
            0x05 => Some(Tag::U32),
            0x06 => Some(Tag::U64),
            0x07 => Some(Tag::S8),
            0x08 => Some(Tag::S16),
            0x09 => Some(Tag::S32),
            0x0A => Some(Tag::S64),
            0x0B => Some(Tag::F32),
            0x0C => Some(Tag::F64),
            0x0E => Some(Tag::Unit),
            0x0F => Some(Tag::OptionNone),
            0x10 => Some(Tag::String),
            0x11 => Some(Tag::Bytes),
            0x12 => Some(Tag::Object),
            0x20 => Some(Tag::List),
            0x21 => Some(Tag::Dict),
            0x22 => Some(Tag::Set),
            0x23 => Some(Tag::Record),
            0x30 => Some(Tag::OptionSome),
            0x33 => Some(Tag::Variant),
            _ => None,
        }
    }
}

/// Internal state tracking for the `Encoder` stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// The virtual root; allows any item.
    Root,
    /// Ordered sequence; allows any number of items.
    List,
    /// Ordered set of unique items; allows any number of items.
    Set,
    /// Alternating key and value items; must hold an even count when closed.
    Dict,
    /// Named fields; strictly allows only `Tag::Variant` items.
    Record,
    /// Strict container; allows exactly one item.
    Option,
    /// Strict container; allows exactly one item (the payload) after the name.
    Variant,
}

/// An active container scope on the `Encoder` stack.
struct Frame {
    start: usize,
    scope: Scope,
    count: usize,
}

/// A state-machine driven encoder.
///
/// The Encoder maintains a stack of open scopes to enforce structural strictness
/// and back-patch length headers when a scope closes.
///
/// # Structural Invariants
///
/// 1.  **Record Scopes**: Only `Tag::Variant` items (named fields) may be written.
/// 2.  **Dict Scopes**: Keys and values alternate; an odd count fails on close.
/// 3.  **Option, Variant**: Exactly one item must be written.
/// 4.  **Root Scope**: The encoder must end in the Root scope to finalize bytes.
pub struct Encoder {
    buf: Vec<u8>,
    /// Bottom is always `Scope::Root`.
    stack: Vec<Frame>,
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder {
    /// Creates a new encoder.
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(64),
            stack: vec![Frame { start: 0, scope: Scope::Root, count: 0 }],
        }
    }

    /// Consumes the encoder and returns the final byte vector.
    ///
    /// # Errors
    /// Returns `Error::ScopeStillOpen` if any container is still open.
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        if self.stack.len() > 1 {
            return Err(Error::ScopeStillOpen);
        }
        Ok(self.buf)
    }

    /// Appends bytes that already hold one complete encoded item.
    ///
    /// Used to splice pre-encoded procedure arguments into a container without
    /// decoding them first. The caller guarantees `item` is a single value.
    pub fn raw(&mut self, item: &[u8]) -> Result<()> {
        let tag = match item.first() {
            Some(b) => Tag::from_u8(*b).ok_or(Error::InvalidTag(*b))?,
            None => return Err(Error::UnexpectedEnd),
        };
        self.check_write(tag)?;
        self.buf.extend_from_slice(item);
        self.on_item_written();
        Ok(())
    }

    fn current_frame(&mut self) -> &mut Frame {
        // The root frame is pushed in `new` and never popped.
        let last = self.stack.len() - 1;
        &mut self.stack[last]
    }

    fn check_write(&mut self, tag: Tag) -> Result<()> {
        let frame = self.current_frame();
        match frame.scope {
            Scope::Root | Scope::List | Scope::Set | Scope::Dict => Ok(()),
            Scope::Record => {
                if tag != Tag::Variant {
                    Err(Error::InvalidRecordEntry)
                } else {
                    Ok(())
                }
            }
            Scope::Option | Scope::Variant => {
                if frame.count >= 1 {
                    Err(Error::TooManyItems(frame.scope))
                } else {
                    Ok(())
                }
            }
        }
    }

    fn on_item_written(&mut self) {
        self.current_frame().count += 1;
    }

    fn write_tag(&mut self, tag: Tag) -> Result<()> {
        self.check_write(tag)?;
        self.buf.push(tag as u8);
        Ok(())
    }

    fn scalar(&mut self, tag: Tag, data: &[u8]) -> Result<()> {
        self.write_tag(tag)?;
        self.buf.extend_from_slice(data);
        self.on_item_written();
        Ok(())
    }

    fn blob(&mut self, tag: Tag, data: &[u8]) -> Result<()> {
        let len = data.len();
        if len > u32::MAX as usize {
            return Err(Error::BlobTooLarge(len));
        }
        self.write_tag(tag)?;
        self.buf.extend_from_slice(&(len as u32).to_le_bytes());
        self.buf.extend_from_slice(data);
        self.on_item_written();
        Ok(())
    }

    fn begin_scope(&mut self, tag: Tag, scope: Scope) -> Result<()> {
        self.check_write(tag)?;

        self.buf.push(tag as u8);
        self.buf.extend_from_slice(&[0, 0, 0, 0]); // length placeholder

        self.stack.push(Frame {
            start: self.buf.len(),
            scope,
            count: 0,
        });
        Ok(())
    }

    fn end_scope(&mut self, expected: Scope) -> Result<()> {
        if self.stack.len() <= 1 {
            return Err(Error::ScopeUnderflow);
        }

        {
            let frame = self.current_frame();
            if frame.scope != expected {
                return Err(Error::ScopeMismatch { expected, actual: frame.scope });
            }
            match frame.scope {
                Scope::Option | Scope::Variant if frame.count == 0 => {
                    return Err(Error::EmptyAdt(frame.scope));
                }
                Scope::Dict if frame.count % 2 != 0 => {
                    return Err(Error::UnpairedDictEntry);
                }
                _ => {}
            }
        }

        let Some(frame) = self.stack.pop() else {
            return Err(Error::ScopeUnderflow);
        };
        let body_len = self.buf.len() - frame.start;
        if body_len > u32::MAX as usize {
            return Err(Error::BlobTooLarge(body_len));
        }

        let len_pos = frame.start - 4;
        self.buf[len_pos..frame.start].copy_from_slice(&(body_len as u32).to_le_bytes());

        self.on_item_written();
        Ok(())
    }

    /// Encodes a boolean value.
    pub fn bool(&mut self, v: bool) -> Result<()> {
        self.scalar(if v { Tag::BoolTrue } else { Tag::BoolFalse }, &[])
    }

    pub fn u8(&mut self, v: u8) -> Result<()> { self.scalar(Tag::U8, &[v]) }
    pub fn s8(&mut self, v: i8) -> Result<()> { self.scalar(Tag::S8, &v.to_le_bytes()) }
    pub fn u16(&mut self, v: u16) -> Result<()> { self.scalar(Tag::U16, &v.to_le_bytes()) }
    pub fn s16(&mut self, v: i16) -> Result<()> { self.scalar(Tag::S16, &v.to_le_bytes()) }
    pub fn u32(&mut self, v: u32) -> Result<()> { self.scalar(Tag::U32, &v.to_le_bytes()) }
    pub fn s32(&mut self, v: i32) -> Result<()> { self.scalar(Tag::S32, &v.to_le_bytes()) }
    pub fn u64(&mut self, v: u64) -> Result<()> { self.scalar(Tag::U64, &v.to_le_bytes()) }
    pub fn s64(&mut self, v: i64) -> Result<()> { self.scalar(Tag::S64, &v.to_le_bytes()) }
    pub fn f32(&mut self, v: f32) -> Result<()> { self.scalar(Tag::F32, &v.to_le_bytes()) }
    pub fn f64(&mut self, v: f64) -> Result<()> { self.scalar(Tag::F64, &v.to_le_bytes()) }

    /// Encodes Unit `()`.
    pub fn unit(&mut self) -> Result<()> { self.scalar(Tag::Unit, &[]) }
    /// Encodes `Option::None`.
    pub fn option_none(&mut self) -> Result<()> { self.scalar(Tag::OptionNone, &[]) }

    /// Encodes a remote object id. `0` is the null reference.
    pub fn object(&mut self, id: u64) -> Result<()> { self.scalar(Tag::Object, &id.to_le_bytes()) }

    /// Encodes a UTF-8 string blob.
    pub fn str(&mut self, v: &str) -> Result<()> { self.blob(Tag::String, v.as_bytes()) }

    /// Encodes a raw byte blob.
    pub fn bytes(&mut self, v: &[u8]) -> Result<()> { self.blob(Tag::Bytes, v) }

    /// Begins a List container. Closed via `list_end()`.
    pub fn list_begin(&mut self) -> Result<()> { self.begin_scope(Tag::List, Scope::List) }
    /// Ends a List container.
    pub fn list_end(&mut self) -> Result<()> { self.end_scope(Scope::List) }

    /// Begins a Set container. Closed via `set_end()`.
    ///
    /// Uniqueness and ordering of the items are the caller's responsibility.
    pub fn set_begin(&mut self) -> Result<()> { self.begin_scope(Tag::Set, Scope::Set) }
    /// Ends a Set container.
    pub fn set_end(&mut self) -> Result<()> { self.end_scope(Scope::Set) }

    /// Begins a Dict container.
    ///
    /// # Invariants
    /// - Items alternate key, value, key, value.
    /// - **Strict:** closing with an odd number of items fails.
    pub fn dict_begin(&mut self) -> Result<()> { self.begin_scope(Tag::Dict, Scope::Dict) }
    /// Ends a Dict container.
    pub fn dict_end(&mut self) -> Result<()> { self.end_scope(Scope::Dict) }

    /// Begins a Record container.
    ///
    /// # Invariants
    /// - **Strict:** Only `variant_begin()` (a named field) is allowed as a direct child.
    pub fn record_begin(&mut self) -> Result<()> { self.begin_scope(Tag::Record, Scope::Record) }
    /// Ends a Record container.
    pub fn record_end(&mut self) -> Result<()> { self.end_scope(Scope::Record) }

    /// Begins an `Option::Some` container. Requires exactly one item.
    pub fn option_some_begin(&mut self) -> Result<()> { self.begin_scope(Tag::OptionSome, Scope::Option) }
    /// Ends an `Option::Some` container.
    pub fn option_some_end(&mut self) -> Result<()> { self.end_scope(Scope::Option) }

    /// Begins a Variant (Named Payload).
    ///
    /// Encodes the name string immediately.
    ///
    /// # Invariants
    /// - Must be closed via `variant_end()`.
    /// - **Strict:** Requires exactly one item (the payload) to be written after this call.
    pub fn variant_begin(&mut self, name: &str) -> Result<()> {
        self.begin_scope(Tag::Variant, Scope::Variant)?;
        self.str(name)?;
        // the name is metadata, not payload
        self.current_frame().count = 0;
        Ok(())
    }
    /// Ends a Variant.
    pub fn variant_end(&mut self) -> Result<()> { self.end_scope(Scope::Variant) }
}

/// A zero-copy, bounds-checked cursor over a byte slice.
///
/// Reading advances the internal cursor.
/// Container reads return new `Decoder` instances restricted to the container's body.
///
/// # Errors
/// All read operations return `Error::UnexpectedEnd` if the buffer is exhausted.
#[derive(Debug, Clone)]
pub struct Decoder<'a> {
    buf: &'a [u8],
}

impl<'a> Decoder<'a> {
    /// Creates a decoder over the slice.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Returns the remaining bytes in the view.
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    /// Returns the unread bytes without advancing.
    pub fn rest(&self) -> &'a [u8] {
        self.buf
    }

    /// Fails with `Error::TrailingBytes` unless the view is exhausted.
    pub fn finish(&self) -> Result<()> {
        match self.buf.len() {
            0 => Ok(()),
            n => Err(Error::TrailingBytes(n)),
        }
    }

    /// Peeks the next Tag without advancing.
    pub fn peek_tag(&self) -> Result<Tag> {
        let Some(&b) = self.buf.first() else {
            return Err(Error::UnexpectedEnd);
        };
        Tag::from_u8(b).ok_or(Error::InvalidTag(b))
    }

    fn consume(&mut self, n: usize) -> Result<()> {
        self.read_bytes(n).map(|_| ())
    }

    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.buf.len() {
            return Err(Error::UnexpectedEnd);
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    fn read_len(&mut self) -> Result<usize> {
        Ok(u32::from_le_bytes(self.read_array()?) as usize)
    }

    fn check_tag(&mut self, expected: Tag) -> Result<()> {
        let found = self.peek_tag()?;
        if found != expected {
            return Err(Error::TagMismatch { expected, found });
        }
        self.consume(1)
    }

    /// Reads the next complete item as raw bytes (tag included).
    pub fn raw(&mut self) -> Result<&'a [u8]> {
        let mut probe = self.clone();
        probe.skip()?;
        let len = self.remaining() - probe.remaining();
        self.read_bytes(len)
    }

    /// Skips the next item and its nested children.
    pub fn skip(&mut self) -> Result<()> {
        let tag = self.peek_tag()?;
        self.consume(1)?;

        match tag {
            Tag::Pad | Tag::BoolTrue | Tag::BoolFalse | Tag::Unit | Tag::OptionNone => {}

            Tag::U8 | Tag::S8 => self.consume(1)?,
            Tag::U16 | Tag::S16 => self.consume(2)?,
            Tag::U32 | Tag::S32 | Tag::F32 => self.consume(4)?,
            Tag::U64 | Tag::S64 | Tag::F64 | Tag::Object => self.consume(8)?,

            // [Length: u32] [Body: Length]
            Tag::String | Tag::Bytes |
            Tag::List | Tag::Dict | Tag::Set | Tag::Record |
            Tag::OptionSome | Tag::Variant => {
                let len = self.read_len()?;
                self.consume(len)?;
            }
        }
        Ok(())
    }

    /// Decodes a bool.
    pub fn bool(&mut self) -> Result<bool> {
        let tag = self.peek_tag()?;
        let v = match tag {
            Tag::BoolTrue => true,
            Tag::BoolFalse => false,
            found => return Err(Error::TagMismatch { expected: Tag::BoolTrue, found }),
        };
        self.consume(1)?;
        Ok(v)
    }

    pub fn u8(&mut self) -> Result<u8> { self.check_tag(Tag::U8)?; Ok(u8::from_le_bytes(self.read_array()?)) }
    pub fn s8(&mut self) -> Result<i8> { self.check_tag(Tag::S8)?; Ok(i8::from_le_bytes(self.read_array()?)) }
    pub fn u16(&mut self) -> Result<u16> { self.check_tag(Tag::U16)?; Ok(u16::from_le_bytes(self.read_array()?)) }
    pub fn s16(&mut self) -> Result<i16> { self.check_tag(Tag::S16)?; Ok(i16::from_le_bytes(self.read_array()?)) }
    pub fn u32(&mut self) -> Result<u32> { self.check_tag(Tag::U32)?; Ok(u32::from_le_bytes(self.read_array()?)) }
    pub fn s32(&mut self) -> Result<i32> { self.check_tag(Tag::S32)?; Ok(i32::from_le_bytes(self.read_array()?)) }
    pub fn u64(&mut self) -> Result<u64> { self.check_tag(Tag::U64)?; Ok(u64::from_le_bytes(self.read_array()?)) }
    pub fn s64(&mut self) -> Result<i64> { self.check_tag(Tag::S64)?; Ok(i64::from_le_bytes(self.read_array()?)) }
    pub fn f32(&mut self) -> Result<f32> { self.check_tag(Tag::F32)?; Ok(f32::from_le_bytes(self.read_array()?)) }
    pub fn f64(&mut self) -> Result<f64> { self.check_tag(Tag::F64)?; Ok(f64::from_le_bytes(self.read_array()?)) }

    /// Decodes Unit `()`.
    pub fn unit(&mut self) -> Result<()> { self.check_tag(Tag::Unit) }
    /// Decodes `Option::None`.
    pub fn option_none(&mut self) -> Result<()> { self.check_tag(Tag::OptionNone) }

    /// Decodes a remote object id. `0` is the null reference.
    pub fn object(&mut self) -> Result<u64> {
        self.check_tag(Tag::Object)?;
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    /// Decodes a string slice (UTF-8).
    pub fn str(&mut self) -> Result<&'a str> {
        self.check_tag(Tag::String)?;
        let len = self.read_len()?;
        let bytes = self.read_bytes(len)?;
        std::str::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)
    }

    /// Decodes a byte slice.
    pub fn bytes(&mut self) -> Result<&'a [u8]> {
        self.check_tag(Tag::Bytes)?;
        let len = self.read_len()?;
        self.read_bytes(len)
    }

    fn enter_container(&mut self, expected: Tag) -> Result<Decoder<'a>> {
        self.check_tag(expected)?;
        let len = self.read_len()?;
        Ok(Decoder::new(self.read_bytes(len)?))
    }

    /// Decodes a List into an iterator.
    pub fn list(&mut self) -> Result<ListIter<'a>> {
        Ok(ListIter { dec: self.enter_container(Tag::List)? })
    }

    /// Decodes a Set into an iterator.
    pub fn set(&mut self) -> Result<ListIter<'a>> {
        Ok(ListIter { dec: self.enter_container(Tag::Set)? })
    }

    /// Decodes a Dict into a key/value iterator.
    pub fn dict(&mut self) -> Result<DictIter<'a>> {
        Ok(DictIter { dec: self.enter_container(Tag::Dict)? })
    }

    /// Decodes a Record into a field iterator.
    pub fn record(&mut self) -> Result<RecordIter<'a>> {
        Ok(RecordIter { dec: self.enter_container(Tag::Record)? })
    }

    /// Decodes an Option.
    ///
    /// Returns `Some(Decoder)` for the payload if present, or `None`.
    pub fn option(&mut self) -> Result<Option<Decoder<'a>>> {
        match self.peek_tag()? {
            Tag::OptionNone => {
                self.consume(1)?;
                Ok(None)
            }
            Tag::OptionSome => Ok(Some(self.enter_container(Tag::OptionSome)?)),
            found => Err(Error::TagMismatch { expected: Tag::OptionSome, found }),
        }
    }

    /// Decodes a Variant.
    ///
    /// Returns `(Name, PayloadDecoder)`.
    pub fn variant(&mut self) -> Result<(&'a str, Decoder<'a>)> {
        let mut inner = self.enter_container(Tag::Variant)?;
        let name = inner.str()?;
        Ok((name, inner))
    }
}

/// Iterator for items within a List or Set.
#[derive(Debug)]
pub struct ListIter<'a> {
    dec: Decoder<'a>,
}

impl<'a> ListIter<'a> {
    /// Returns a Decoder for the next item, or `None` at the end.
    ///
    /// A truncated item is an error, not the end of the list.
    pub fn next(&mut self) -> Result<Option<Decoder<'a>>> {
        if self.dec.remaining() == 0 {
            return Ok(None);
        }
        let item = self.dec.raw()?;
        Ok(Some(Decoder::new(item)))
    }
}

/// Iterator for key/value pairs within a Dict.
#[derive(Debug)]
pub struct DictIter<'a> {
    dec: Decoder<'a>,
}

impl<'a> DictIter<'a> {
    /// Returns `(KeyDecoder, ValueDecoder)` for the next entry, or `None`.
    pub fn next(&mut self) -> Result<Option<(Decoder<'a>, Decoder<'a>)>> {
        if self.dec.remaining() == 0 {
            return Ok(None);
        }
        let key = self.dec.raw()?;
        if self.dec.remaining() == 0 {
            return Err(Error::UnpairedDictEntry);
        }
        let value = self.dec.raw()?;
        Ok(Some((Decoder::new(key), Decoder::new(value))))
    }
}

/// Iterator for named fields within a Record.
#[derive(Debug)]
pub struct RecordIter<'a> {
    dec: Decoder<'a>,
}

impl<'a> RecordIter<'a> {
    /// Returns `(FieldName, ValueDecoder)` for the next field, or `None`.
    pub fn next(&mut self) -> Result<Option<(&'a str, Decoder<'a>)>> {
        if self.dec.remaining() == 0 {
            return Ok(None);
        }
        let (name, val) = self.dec.variant()?;
        Ok(Some((name, val)))
    }
}
