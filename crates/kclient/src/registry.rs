//! # Exception Registry
//!
//! Per-connection table mapping `(service, exception name)` to a factory that
//! builds a typed error from the fault message. Service proxies register their
//! exception types when they are first obtained from a client; faults whose type
//! has no entry still surface as an untyped `RpcError`.

use std::error::Error as StdError;
use std::sync::Arc;

use dashmap::DashMap;
use kproto::Fault;
use tracing::trace;

use crate::error::RpcError;

pub type ExceptionFactory = Arc<dyn Fn(String) -> Arc<dyn StdError + Send + Sync> + Send + Sync>;

#[derive(Clone, Default)]
pub struct ExceptionRegistry {
    factories: Arc<DashMap<(String, String), ExceptionFactory>>,
}

impl ExceptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` for faults named `service.name`.
    ///
    /// Registering the same pair again replaces the earlier factory.
    pub fn register<F, E>(&self, service: &str, name: &str, factory: F)
    where
        F: Fn(String) -> E + Send + Sync + 'static,
        E: StdError + Send + Sync + 'static,
    {
        trace!(service, name, "registering exception type");
        let factory: ExceptionFactory = Arc::new(move |message| Arc::new(factory(message)));
        self.factories.insert((service.to_owned(), name.to_owned()), factory);
    }

    pub fn contains(&self, service: &str, name: &str) -> bool {
        self.factories.contains_key(&(service.to_owned(), name.to_owned()))
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Builds the typed error for `service.name`, if one is registered.
    pub fn raise(
        &self,
        service: &str,
        name: &str,
        message: &str,
    ) -> Option<Arc<dyn StdError + Send + Sync>> {
        if name.is_empty() {
            return None;
        }
        // clone the factory out so user code never runs under a shard lock
        let factory = self
            .factories
            .get(&(service.to_owned(), name.to_owned()))
            .map(|entry| entry.value().clone())?;
        Some(factory(message.to_owned()))
    }

    /// Converts a server fault into the error callers see.
    pub fn to_error(&self, fault: Fault) -> RpcError {
        let typed = self.raise(&fault.service, &fault.name, &fault.description);
        RpcError::new(fault, typed)
    }
}

/// Declares an error type that `ExceptionRegistry` can build from a fault
/// message.
///
/// ```ignore
/// kclient::define_exception! {
///     /// An argument was out of range.
///     pub struct ArgumentOutOfRangeException;
/// }
/// registry.register("KRPC", "ArgumentOutOfRangeException", ArgumentOutOfRangeException::new);
/// ```
#[macro_export]
macro_rules! define_exception {
    ($(#[$meta:meta])* $vis:vis struct $name:ident;) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        $vis struct $name {
            message: String,
        }

        impl $name {
            pub fn new(message: impl Into<String>) -> Self {
                Self { message: message.into() }
            }

            pub fn message(&self) -> &str {
                &self.message
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, "{}: {}", stringify!($name), self.message)
            }
        }

        impl ::std::error::Error for $name {}
    };
}
