//! # Value Codec
//!
//! Typed conversion between Rust values and `kpack` items.
//!
//! ## Mapping
//!
//! | Rust                       | Wire                         |
//! |----------------------------|------------------------------|
//! | `bool`, integers, floats   | matching scalar tag          |
//! | `String` / `&str`          | String                       |
//! | `Bytes`                    | Bytes                        |
//! | `()`                       | Unit                         |
//! | `Vec<T>`                   | List                         |
//! | tuples (up to 6)           | List of fixed length         |
//! | `BTreeSet<T>`              | Set                          |
//! | `BTreeMap<K, V>`           | Dict                         |
//! | `Option<T>`                | OptionNone / OptionSome      |
//! | remote objects             | Object, id 0 meaning `None`  |
//! | remote enums               | S32                          |
//! | protocol messages          | their Record                 |
//!
//! Decoding needs the `Client` because object references are bound to the
//! connection that produced them.

use std::any::type_name;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::ops::Deref;

use kpack::Decoder;
use kpack::Encoder;
use kproto::Message;

use crate::client::Client;
use crate::error::EncodingError;
use crate::error::EncodingErrorKind;
use crate::error::Error;
use crate::error::Result;

pub trait Encode {
    /// Writes `self` as exactly one item.
    fn encode(&self, enc: &mut Encoder) -> Result<()>;

    /// How `Option<Self>` is written. Objects override this to use id 0.
    #[doc(hidden)]
    fn encode_option(value: Option<&Self>, enc: &mut Encoder) -> Result<()>
    where
        Self: Sized,
    {
        match value {
            Some(v) => {
                enc.option_some_begin()?;
                v.encode(enc)?;
                enc.option_some_end()?;
            }
            None => enc.option_none()?,
        }
        Ok(())
    }
}

pub trait Decode: Sized {
    /// Reads exactly one item.
    fn decode(dec: &mut Decoder<'_>, client: &Client) -> Result<Self>;

    /// How `Option<Self>` is read. Objects override this to map id 0 to `None`.
    #[doc(hidden)]
    fn decode_option(dec: &mut Decoder<'_>, client: &Client) -> Result<Option<Self>> {
        match dec.option()? {
            Some(inner) => Ok(Some(decode_item(inner, client)?)),
            None => Ok(None),
        }
    }
}

/// Encodes a value into a standalone argument buffer.
pub fn encode<T: Encode + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let mut enc = Encoder::new();
    value.encode(&mut enc)?;
    Ok(enc.into_bytes()?)
}

/// Decodes a complete buffer as a `T`. Trailing bytes are an error.
pub fn decode<T: Decode>(bytes: &[u8], client: &Client) -> Result<T> {
    let mut dec = Decoder::new(bytes);
    T::decode(&mut dec, client)
        .and_then(|v| {
            dec.finish()?;
            Ok(v)
        })
        .map_err(|e| e.expecting(type_name::<T>()))
}

/// Decodes the single item held by a sub-decoder.
fn decode_item<T: Decode>(mut dec: Decoder<'_>, client: &Client) -> Result<T> {
    let value = T::decode(&mut dec, client)?;
    dec.finish()?;
    Ok(value)
}

/// Raw bytes, encoded as a Bytes item rather than a list of `u8`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Bytes(pub Vec<u8>);

impl Deref for Bytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(v: Vec<u8>) -> Self {
        Self(v)
    }
}

impl From<&[u8]> for Bytes {
    fn from(v: &[u8]) -> Self {
        Self(v.to_vec())
    }
}

// ============================================================================
//  SCALARS
// ============================================================================

macro_rules! scalar_codec {
    ($($ty:ty => $method:ident),* $(,)?) => {
        $(
            impl Encode for $ty {
                fn encode(&self, enc: &mut Encoder) -> Result<()> {
                    Ok(enc.$method(*self)?)
                }
            }

            impl Decode for $ty {
                fn decode(dec: &mut Decoder<'_>, _client: &Client) -> Result<Self> {
                    Ok(dec.$method()?)
                }
            }
        )*
    };
}

scalar_codec! {
    bool => bool,
    u8 => u8,
    u16 => u16,
    u32 => u32,
    u64 => u64,
    i8 => s8,
    i16 => s16,
    i32 => s32,
    i64 => s64,
    f32 => f32,
    f64 => f64,
}

impl Encode for () {
    fn encode(&self, enc: &mut Encoder) -> Result<()> {
        Ok(enc.unit()?)
    }
}

impl Decode for () {
    fn decode(dec: &mut Decoder<'_>, _client: &Client) -> Result<Self> {
        Ok(dec.unit()?)
    }
}

impl Encode for str {
    fn encode(&self, enc: &mut Encoder) -> Result<()> {
        Ok(enc.str(self)?)
    }
}

impl Encode for String {
    fn encode(&self, enc: &mut Encoder) -> Result<()> {
        Ok(enc.str(self)?)
    }
}

impl Decode for String {
    fn decode(dec: &mut Decoder<'_>, _client: &Client) -> Result<Self> {
        Ok(dec.str()?.to_owned())
    }
}

impl Encode for Bytes {
    fn encode(&self, enc: &mut Encoder) -> Result<()> {
        Ok(enc.bytes(&self.0)?)
    }
}

impl Decode for Bytes {
    fn decode(dec: &mut Decoder<'_>, _client: &Client) -> Result<Self> {
        Ok(Bytes(dec.bytes()?.to_vec()))
    }
}

impl<T: Encode + ?Sized> Encode for &T {
    fn encode(&self, enc: &mut Encoder) -> Result<()> {
        (**self).encode(enc)
    }
}

// ============================================================================
//  CONTAINERS
// ============================================================================

impl<T: Encode> Encode for Option<T> {
    fn encode(&self, enc: &mut Encoder) -> Result<()> {
        T::encode_option(self.as_ref(), enc)
    }
}

impl<T: Decode> Decode for Option<T> {
    fn decode(dec: &mut Decoder<'_>, client: &Client) -> Result<Self> {
        T::decode_option(dec, client)
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode(&self, enc: &mut Encoder) -> Result<()> {
        self.as_slice().encode(enc)
    }
}

impl<T: Encode> Encode for [T] {
    fn encode(&self, enc: &mut Encoder) -> Result<()> {
        enc.list_begin()?;
        for item in self {
            item.encode(enc)?;
        }
        enc.list_end()?;
        Ok(())
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode(dec: &mut Decoder<'_>, client: &Client) -> Result<Self> {
        let mut list = dec.list()?;
        let mut out = Vec::new();
        while let Some(item) = list.next()? {
            out.push(decode_item(item, client)?);
        }
        Ok(out)
    }
}

impl<T: Encode> Encode for BTreeSet<T> {
    fn encode(&self, enc: &mut Encoder) -> Result<()> {
        enc.set_begin()?;
        for item in self {
            item.encode(enc)?;
        }
        enc.set_end()?;
        Ok(())
    }
}

impl<T: Decode + Ord> Decode for BTreeSet<T> {
    fn decode(dec: &mut Decoder<'_>, client: &Client) -> Result<Self> {
        let mut set = dec.set()?;
        let mut out = BTreeSet::new();
        while let Some(item) = set.next()? {
            if !out.insert(decode_item(item, client)?) {
                return Err(EncodingError::new(EncodingErrorKind::DuplicateEntry).into());
            }
        }
        Ok(out)
    }
}

impl<K: Encode, V: Encode> Encode for BTreeMap<K, V> {
    fn encode(&self, enc: &mut Encoder) -> Result<()> {
        enc.dict_begin()?;
        for (k, v) in self {
            k.encode(enc)?;
            v.encode(enc)?;
        }
        enc.dict_end()?;
        Ok(())
    }
}

impl<K: Decode + Ord, V: Decode> Decode for BTreeMap<K, V> {
    fn decode(dec: &mut Decoder<'_>, client: &Client) -> Result<Self> {
        let mut dict = dec.dict()?;
        let mut out = BTreeMap::new();
        while let Some((k, v)) = dict.next()? {
            let key = decode_item(k, client)?;
            if out.contains_key(&key) {
                return Err(EncodingError::new(EncodingErrorKind::DuplicateEntry).into());
            }
            out.insert(key, decode_item(v, client)?);
        }
        Ok(out)
    }
}

macro_rules! tuple_codec {
    ($len:expr; $($name:ident : $idx:tt),+) => {
        impl<$($name: Encode),+> Encode for ($($name,)+) {
            fn encode(&self, enc: &mut Encoder) -> Result<()> {
                enc.list_begin()?;
                $(self.$idx.encode(enc)?;)+
                enc.list_end()?;
                Ok(())
            }
        }

        impl<$($name: Decode),+> Decode for ($($name,)+) {
            fn decode(dec: &mut Decoder<'_>, client: &Client) -> Result<Self> {
                let mut list = dec.list()?;
                let mut found = 0;
                let value = ($(
                    {
                        match list.next()? {
                            Some(item) => {
                                found += 1;
                                decode_item::<$name>(item, client)?
                            }
                            None => return Err(arity($len, found)),
                        }
                    },
                )+);
                if list.next()?.is_some() {
                    return Err(arity($len, $len + 1));
                }
                Ok(value)
            }
        }
    };
}

fn arity(expected: usize, found: usize) -> Error {
    EncodingError::new(EncodingErrorKind::Arity { expected, found }).into()
}

tuple_codec!(1; A: 0);
tuple_codec!(2; A: 0, B: 1);
tuple_codec!(3; A: 0, B: 1, C: 2);
tuple_codec!(4; A: 0, B: 1, C: 2, D: 3);
tuple_codec!(5; A: 0, B: 1, C: 2, D: 3, E: 4);
tuple_codec!(6; A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);

// ============================================================================
//  PROTOCOL MESSAGES
// ============================================================================

macro_rules! message_codec {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Encode for $ty {
                fn encode(&self, enc: &mut Encoder) -> Result<()> {
                    Message::encode(self, enc).map_err(message_error)
                }
            }

            impl Decode for $ty {
                fn decode(dec: &mut Decoder<'_>, _client: &Client) -> Result<Self> {
                    <$ty as Message>::decode(dec).map_err(message_error)
                }
            }
        )*
    };
}

fn message_error(e: kproto::Error) -> Error {
    match e {
        kproto::Error::Wire(e) => e.into(),
        other => EncodingError::new(EncodingErrorKind::Message(other)).into(),
    }
}

message_codec! {
    kproto::ProcedureCall,
    kproto::StreamInfo,
    kproto::EventInfo,
    kproto::Status,
    kproto::Services,
}
