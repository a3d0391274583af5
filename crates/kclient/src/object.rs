//! # Remote Objects
//!
//! Handles to objects that live on the server.
//!
//! ## Invariants
//! - An `ObjectRef` is bound to the connection that produced it; two references
//!   are equal only when both the connection and the server id match.
//! - Id 0 is the null reference. It never becomes an `ObjectRef`: it decodes to
//!   `None` for `Option<T>` and is an error everywhere else.

use std::cmp::Ordering as CmpOrdering;
use std::fmt;
use std::hash::Hash;
use std::hash::Hasher;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use kpack::Decoder;
use kpack::Encoder;

use crate::client::Client;
use crate::error::EncodingError;
use crate::error::EncodingErrorKind;
use crate::error::Result;

/// Identifies one client connection within this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// A non-null server object id plus the connection it belongs to.
#[derive(Clone)]
pub struct ObjectRef {
    client: Client,
    id: u64,
}

impl ObjectRef {
    /// Binds `id` to `client`. Returns `None` for the null id.
    pub fn new(client: &Client, id: u64) -> Option<Self> {
        (id != 0).then(|| Self { client: client.clone(), id })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn key(&self) -> (ConnectionId, u64) {
        (self.client.connection_id(), self.id)
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for ObjectRef {}

impl Hash for ObjectRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for ObjectRef {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for ObjectRef {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({}, {})", self.client.connection_id(), self.id)
    }
}

/// A typed proxy for a server-side class.
///
/// Implemented by `remote_class!`.
pub trait RemoteObject: Sized {
    /// Fully qualified class name, `Service.Class`.
    const CLASS: &'static str;

    fn from_ref(object: ObjectRef) -> Self;

    fn object_ref(&self) -> &ObjectRef;

    fn id(&self) -> u64 {
        self.object_ref().id()
    }

    fn client(&self) -> &Client {
        self.object_ref().client()
    }
}

#[doc(hidden)]
pub fn encode_object<T: RemoteObject>(object: &T, enc: &mut Encoder) -> Result<()> {
    Ok(enc.object(object.id())?)
}

#[doc(hidden)]
pub fn encode_optional_object<T: RemoteObject>(object: Option<&T>, enc: &mut Encoder) -> Result<()> {
    Ok(enc.object(object.map_or(0, |o| o.id()))?)
}

#[doc(hidden)]
pub fn decode_object<T: RemoteObject>(dec: &mut Decoder<'_>, client: &Client) -> Result<T> {
    decode_optional_object(dec, client)?
        .ok_or_else(|| EncodingError::of(T::CLASS, EncodingErrorKind::NullObject).into())
}

#[doc(hidden)]
pub fn decode_optional_object<T: RemoteObject>(
    dec: &mut Decoder<'_>,
    client: &Client,
) -> Result<Option<T>> {
    let id = dec.object()?;
    Ok(ObjectRef::new(client, id).map(T::from_ref))
}

/// Declares a typed proxy for a server class.
///
/// ```ignore
/// kclient::remote_class! {
///     /// A vessel in flight.
///     pub struct Vessel = "SpaceCenter.Vessel";
/// }
/// ```
#[macro_export]
macro_rules! remote_class {
    ($(#[$meta:meta])* $vis:vis struct $name:ident = $class:literal;) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        $vis struct $name($crate::ObjectRef);

        impl $crate::RemoteObject for $name {
            const CLASS: &'static str = $class;

            fn from_ref(object: $crate::ObjectRef) -> Self {
                Self(object)
            }

            fn object_ref(&self) -> &$crate::ObjectRef {
                &self.0
            }
        }

        impl $crate::Encode for $name {
            fn encode(&self, enc: &mut $crate::kpack::Encoder) -> $crate::Result<()> {
                $crate::object::encode_object(self, enc)
            }

            fn encode_option(
                value: Option<&Self>,
                enc: &mut $crate::kpack::Encoder,
            ) -> $crate::Result<()> {
                $crate::object::encode_optional_object(value, enc)
            }
        }

        impl $crate::Decode for $name {
            fn decode(
                dec: &mut $crate::kpack::Decoder<'_>,
                client: &$crate::Client,
            ) -> $crate::Result<Self> {
                $crate::object::decode_object(dec, client)
            }

            fn decode_option(
                dec: &mut $crate::kpack::Decoder<'_>,
                client: &$crate::Client,
            ) -> $crate::Result<Option<Self>> {
                $crate::object::decode_optional_object(dec, client)
            }
        }
    };
}

/// Declares a server enumeration, carried on the wire as its `i32` value.
#[macro_export]
macro_rules! remote_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident = $value:literal),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(i32)]
        $vis enum $name {
            $($(#[$vmeta])* $variant = $value),*
        }

        impl $name {
            pub fn from_i32(value: i32) -> Option<Self> {
                match value {
                    $($value => Some(Self::$variant),)*
                    _ => None,
                }
            }
        }

        impl $crate::Encode for $name {
            fn encode(&self, enc: &mut $crate::kpack::Encoder) -> $crate::Result<()> {
                Ok(enc.s32(*self as i32)?)
            }
        }

        impl $crate::Decode for $name {
            fn decode(
                dec: &mut $crate::kpack::Decoder<'_>,
                _client: &$crate::Client,
            ) -> $crate::Result<Self> {
                let value = dec.s32()?;
                Self::from_i32(value).ok_or_else(|| {
                    $crate::EncodingError::of(
                        stringify!($name),
                        $crate::EncodingErrorKind::UnknownEnumValue(value),
                    )
                    .into()
                })
            }
        }
    };
}
