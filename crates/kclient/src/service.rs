//! # Service Proxies
//!
//! A service proxy is a thin typed wrapper over `Client::invoke`. Each service
//! declares the exception types its procedures can raise, and the client
//! registers them the first time the proxy is obtained.

use crate::client::Client;
use crate::registry::ExceptionRegistry;

pub trait Service: Sized {
    /// The service name used in every call.
    const NAME: &'static str;

    fn new(client: Client) -> Self;

    /// Registers the service's exception types on a connection.
    fn register_exceptions(_registry: &ExceptionRegistry) {}
}
